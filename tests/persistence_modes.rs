use dynaquery::fragment::{FragmentDraft, FragmentKind, FragmentStore};
use dynaquery::persist::{PersistenceMode, Persistor};

#[test]
fn in_memory_mode_starts_empty() {
    let db = Persistor::new(PersistenceMode::from_location(":memory:")).expect("db");
    assert!(db.list(FragmentKind::Base).expect("list").is_empty());
    db.seed().expect("seed");
    // seeding twice changes nothing
    db.seed().expect("seed again");
    assert_eq!(db.list(FragmentKind::Filter).expect("list").len(), 4);
}

#[test]
fn file_mode_keeps_fragments_across_reopen() {
    let path = "test_dynaquery_temp.db".to_string();
    let _ = std::fs::remove_file(&path);
    {
        let db = Persistor::new(PersistenceMode::File(path.clone())).expect("db");
        db.save(
            FragmentKind::Order,
            None,
            &FragmentDraft::new("cnpj_asc", "CUSTOMER", "ORDER BY c.cnpj"),
        )
        .expect("save");
    }
    let db = Persistor::new(PersistenceMode::from_location(&path)).expect("reopen");
    let order = db
        .find_active_by_name(FragmentKind::Order, "cnpj_asc")
        .expect("lookup")
        .expect("order survives");
    assert_eq!(order.text.as_str(), "ORDER BY c.cnpj");
    drop(db);
    let _ = std::fs::remove_file(&path);
}
