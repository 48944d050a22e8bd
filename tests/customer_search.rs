use dynaquery::customer::{Customer, CustomerFilter, PageRequest};
use dynaquery::error::DynaqueryError;
use dynaquery::persist::{PersistenceMode, Persistor};
use dynaquery::server::AppState;
use dynaquery::settings::Settings;
use serde_json::json;

fn seeded() -> (Persistor, AppState) {
    let persistor = Persistor::new(PersistenceMode::InMemory).expect("db");
    persistor.seed().expect("seed");
    let settings = Settings::from_toml_str("").expect("settings");
    let state = AppState::new(&persistor, &settings);
    (persistor, state)
}

fn filter(filters: &[&str], order: Option<&str>, parameters: serde_json::Value) -> CustomerFilter {
    CustomerFilter {
        filters: filters.iter().map(|f| f.to_string()).collect(),
        order: order.map(str::to_owned),
        parameters: serde_json::from_value(parameters).expect("parameters"),
    }
}

fn names(page: &dynaquery::customer::Page<dynaquery::customer::CustomerView>) -> Vec<&str> {
    page.content.iter().map(|v| v.customer.name.as_str()).collect()
}

#[test]
fn search_without_filters_returns_every_live_customer() {
    let (_db, state) = seeded();
    let page = state
        .customers
        .execute(&filter(&[], Some("name_asc"), json!({})), PageRequest::default())
        .expect("search");
    assert_eq!(
        names(&page),
        vec!["Acme Industria Ltda", "Beta Comercio SA", "Gamma Servicos ME"]
    );
    assert_eq!(page.total_elements, 3);
    assert_eq!(page.total_pages, 1);
    assert_eq!(page.size, 20);
}

#[test]
fn deleted_customers_are_never_returned() {
    let (db, state) = seeded();
    let mut gone = Customer::new("Delta Deleted", "44555666000154");
    gone.deleted_at = Some(gone.created_at);
    gone.insert(&db).expect("insert");
    let page = state
        .customers
        .execute(&CustomerFilter::default(), PageRequest::default())
        .expect("search");
    assert_eq!(page.total_elements, 3);
    assert!(!names(&page).contains(&"Delta Deleted"));
}

#[test]
fn filters_combine_and_count_ignores_paging() {
    let (db, state) = seeded();
    for i in 0..4 {
        Customer::new(&format!("Acme Filial {i}"), &format!("5566677700010{i}"))
            .insert(&db)
            .expect("insert");
    }
    let request = filter(&["active_only", "name_contains"], Some("name_asc"), json!({"name": "ACME"}));
    let first = state
        .customers
        .execute(&request, PageRequest { page: 0, size: 2 })
        .expect("first page");
    assert_eq!(names(&first), vec!["Acme Filial 0", "Acme Filial 1"]);
    assert_eq!(first.total_elements, 5);
    assert_eq!(first.total_pages, 3);
    let last = state
        .customers
        .execute(&request, PageRequest { page: 2, size: 2 })
        .expect("last page");
    assert_eq!(names(&last), vec!["Acme Industria Ltda"]);
    assert_eq!(last.page, 2);
}

#[test]
fn indicators_follow_display_order() {
    let (_db, state) = seeded();
    let page = state
        .customers
        .execute(
            &filter(&["by_id"], None, json!({"id": "5f1d2c3b-0000-4000-8000-000000000002"})),
            PageRequest::default(),
        )
        .expect("search");
    assert_eq!(names(&page), vec!["Beta Comercio SA"]);
    let indicators: Vec<(&str, bool)> = page.content[0]
        .indicators
        .iter()
        .map(|i| (i.key.as_str(), i.value))
        .collect();
    assert_eq!(
        indicators,
        vec![("is_active", true), ("is_blocked", true), ("no_trade_name", true)]
    );
}

#[test]
fn malformed_id_is_rejected_before_execution() {
    let (_db, state) = seeded();
    let err = state
        .customers
        .execute(&filter(&["by_id"], None, json!({"id": "42"})), PageRequest::default())
        .unwrap_err();
    match err {
        DynaqueryError::InvalidParameterFormat { name, value } => {
            assert_eq!(name, "id");
            assert_eq!(value, "42");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn unknown_filter_names_are_reported() {
    let (_db, state) = seeded();
    let err = state
        .customers
        .execute(&filter(&["vip_only"], None, json!({})), PageRequest::default())
        .unwrap_err();
    assert!(matches!(err, DynaqueryError::FragmentNotFound { ref name, .. } if name == "vip_only"));
}

#[test]
fn response_lists_the_available_options() {
    let (_db, state) = seeded();
    let response = state
        .customers
        .execute_with_options(&CustomerFilter::default(), PageRequest::default())
        .expect("search");
    let filters: Vec<&str> = response
        .available_queries
        .filters
        .iter()
        .map(|f| f.name_unique.as_str())
        .collect();
    assert_eq!(filters, vec!["active_only", "blocked_only", "by_id", "name_contains"]);
    assert_eq!(response.available_queries.orders.len(), 2);

    let body = serde_json::to_value(&response).expect("json");
    assert_eq!(body["customers"]["totalElements"], json!(3));
    let first = &body["customers"]["content"][0];
    assert!(first["indicators"].is_array());
    assert!(first.get("tradeName").is_some());
    assert!(first.get("trade_name").is_none());
}
