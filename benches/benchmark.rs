use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use dynaquery::compose::{join, to_count_form};
use dynaquery::customer::{Customer, CustomerFilter, PageRequest, CUSTOMER_CONTEXT};
use dynaquery::fragment::RawQueryText;
use dynaquery::indicator::evaluate_rules;
use dynaquery::persist::{PersistenceMode, Persistor};
use dynaquery::rule::{ConditionOperator, RuleDraft, RuleStore};
use dynaquery::server::AppState;
use dynaquery::settings::Settings;

fn composition(c: &mut Criterion) {
    let base = RawQueryText::new("SELECT c.* FROM customer c WHERE c.deleted_at IS NULL");
    let filters: Vec<RawQueryText> = (0..8)
        .map(|i| RawQueryText::new(format!("AND c.score_{i} > :min_{i}")))
        .collect();
    let orders = vec![RawQueryText::new("ORDER BY c.name ASC")];
    c.bench_function("join eight filters", |b| {
        b.iter(|| join(black_box(&base), black_box(&filters), black_box(&orders)))
    });
    let composed = join(&base, &filters, &orders);
    c.bench_function("count form", |b| b.iter(|| to_count_form(black_box(&composed))));
}

fn rule_evaluation(c: &mut Criterion) {
    let persistor = Persistor::new(PersistenceMode::InMemory).expect("db");
    let operators = [
        ("active", ConditionOperator::IsTrue, None),
        ("blocked", ConditionOperator::IsFalse, None),
        ("tradeName", ConditionOperator::IsNull, None),
        ("name", ConditionOperator::Contains, Some("acme")),
        ("cnpj", ConditionOperator::Equals, Some("11222333000181")),
        ("cnpj", ConditionOperator::GreaterThan, Some("10000000000000")),
    ];
    for (i, (field, op, value)) in operators.into_iter().enumerate() {
        let mut draft = RuleDraft::new(&format!("rule_{i}"), CUSTOMER_CONTEXT, field, op).order(i as i32);
        if let Some(value) = value {
            draft = draft.value(value);
        }
        persistor.save(None, &draft).expect("rule");
    }
    let rules = persistor.find_active_by_context(CUSTOMER_CONTEXT).expect("rules");
    let customer = Customer::new("Acme Industria Ltda", "11222333000181");
    c.bench_function("evaluate six rules", |b| {
        b.iter(|| evaluate_rules(black_box(&customer), black_box(&rules), CUSTOMER_CONTEXT))
    });
}

fn customer_search(c: &mut Criterion) {
    let persistor = Persistor::new(PersistenceMode::InMemory).expect("db");
    persistor.seed().expect("seed");
    for i in 0..500 {
        Customer::new(&format!("Customer {i:04}"), &format!("{:014}", i))
            .insert(&persistor)
            .expect("insert");
    }
    let state = AppState::new(&persistor, &Settings::from_toml_str("").expect("settings"));
    let customers = Arc::clone(&state.customers);
    let filter = CustomerFilter {
        filters: vec!["active_only".into()],
        order: Some("name_asc".into()),
        ..CustomerFilter::default()
    };
    c.bench_function("search one page of customers", |b| {
        b.iter(|| customers.execute(black_box(&filter), PageRequest::default()).expect("search"))
    });
}

criterion_group!(benches, composition, rule_evaluation, customer_search);
criterion_main!(benches);
