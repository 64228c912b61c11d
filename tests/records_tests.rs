use std::sync::Arc;

use stackorm::{
    Condition, Environment, FieldSpec, ModelKind, Operator, OrmError, Registry, RegistryBuilder, SqliteDatabase,
    Value, field_map,
};

fn setup() -> (SqliteDatabase, Arc<Registry>) {
    let db = SqliteDatabase::memory().unwrap();
    let mut builder = RegistryBuilder::new();
    builder
        .declare_model("User", ModelKind::Regular)
        .unwrap()
        .fields([
            FieldSpec::char("Name").required(),
            FieldSpec::integer("Age"),
            FieldSpec::boolean("Active").default_value(true),
            FieldSpec::integer("Owner").default(|env: &Environment| Value::Integer(env.uid())),
            FieldSpec::char("Code").no_copy(),
        ])
        .unwrap();
    builder.declare_model("Counter", ModelKind::Regular).unwrap();
    let registry = builder.bootstrap(&db).unwrap();
    (db, registry)
}

fn seed(env: &Arc<Environment>) {
    let users = env.pool("User").unwrap();
    for (name, age) in [("Ann", 30), ("Bob", 17), ("Cid", 70), ("Dee", 45)] {
        users.create(field_map! { "Name" => name, "Age" => age }).unwrap();
    }
}

#[test]
fn test_create_and_search() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    let users = env.pool("User").unwrap();

    let ann = users.create(field_map! { "Name" => "Ann", "Age" => 30 }).unwrap();
    assert_eq!(ann.len().unwrap(), 1);
    assert_eq!(ann.get("Name").unwrap(), Value::from("Ann"));
    assert_eq!(ann.get_typed::<i64>("Age").unwrap(), 30);

    let found = users.search(Condition::leaf("Name", Operator::Equals, "Ann"));
    assert_eq!(found.ids().unwrap(), ann.ids().unwrap());
    assert!(
        users
            .search(Condition::leaf("Name", Operator::Equals, "Nobody"))
            .is_empty()
            .unwrap()
    );
}

#[test]
fn test_defaults_and_timestamps() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 42).unwrap();
    let ann = env
        .pool("User")
        .unwrap()
        .create(field_map! { "Name" => "Ann" })
        .unwrap();
    env.invalidate_cache().unwrap();

    assert_eq!(ann.get("Active").unwrap(), Value::Boolean(true));
    assert_eq!(ann.get("Owner").unwrap(), Value::Integer(42));
    assert!(matches!(ann.get("CreateDate").unwrap(), Value::DateTime(_)));
    assert_eq!(ann.get("CreateDate").unwrap(), ann.get("WriteDate").unwrap());
}

#[test]
fn test_required_fields() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    let result = env.pool("User").unwrap().create(field_map! { "Age" => 3 });
    assert!(matches!(result, Err(OrmError::ConstraintViolation(_))));
}

#[test]
fn test_models_without_fields() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    let counters = env.pool("Counter").unwrap();
    let first = counters.create(field_map! {}).unwrap();
    let second = counters.create(field_map! {}).unwrap();
    assert_eq!(counters.search_all().len().unwrap(), 2);
    assert_ne!(first, second);
}

#[test]
fn test_empty_filter_selects_nothing() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    seed(&env);
    let users = env.pool("User").unwrap();

    assert!(users.is_empty().unwrap());
    assert_eq!(users.search_count().unwrap(), 0);
    assert_eq!(users.search_all().search_count().unwrap(), 4);
}

#[test]
fn test_filters_compose() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    seed(&env);
    let users = env.pool("User").unwrap();

    let adults = users.filter(Condition::leaf("Age", Operator::GreaterOrEqual, 18));
    assert_eq!(adults.search_count().unwrap(), 3);

    let younger = adults.filter(Condition::leaf("Age", Operator::Lower, 50));
    assert_eq!(younger.search_count().unwrap(), 2);
    // The receiver keeps its own condition.
    assert_eq!(adults.search_count().unwrap(), 3);

    let not_ann = adults.exclude(Condition::leaf("Name", Operator::Equals, "Ann"));
    let names: Vec<Value> = not_ann
        .records()
        .unwrap()
        .iter()
        .map(|r| r.get("Name").unwrap())
        .collect();
    assert_eq!(names, vec![Value::from("Cid"), Value::from("Dee")]);
}

#[test]
fn test_order_limit_offset() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    seed(&env);
    let users = env.pool("User").unwrap().search_all();

    let oldest = users.order_by(&["Age desc"]).limit(2);
    let names: Vec<Value> = oldest
        .records()
        .unwrap()
        .iter()
        .map(|r| r.get("Name").unwrap())
        .collect();
    assert_eq!(names, vec![Value::from("Cid"), Value::from("Dee")]);

    let second = users.order_by(&["Age"]).offset(1).limit(1);
    assert_eq!(second.get("Name").unwrap(), Value::from("Ann"));

    assert!(matches!(
        users.order_by(&["Age sideways"]).ids(),
        Err(OrmError::InvalidCondition(_))
    ));
}

#[test]
fn test_refining_a_page_keeps_its_records() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    seed(&env);

    let page = env
        .pool("User")
        .unwrap()
        .search_all()
        .order_by(&["Age"])
        .offset(2)
        .fetch()
        .unwrap();
    assert_eq!(page.len().unwrap(), 2);

    let adults = page.filter(Condition::leaf("Age", Operator::Greater, 18));
    assert_eq!(adults.ids().unwrap(), page.ids().unwrap());
    let names: Vec<Value> = adults
        .records()
        .unwrap()
        .iter()
        .map(|r| r.get("Name").unwrap())
        .collect();
    assert_eq!(names, vec![Value::from("Dee"), Value::from("Cid")]);

    assert_eq!(page.limit(1).get("Name").unwrap(), Value::from("Dee"));
    assert_eq!(page.offset(1).get("Name").unwrap(), Value::from("Cid"));
}

#[test]
fn test_loaded_values_are_served_from_cache() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    seed(&env);
    env.invalidate_cache().unwrap();

    let users = env.pool("User").unwrap().search_all().load(&["Name", "Age"]).unwrap();
    assert!(users.is_resolved());
    let before = env.query_count();
    for user in users.records().unwrap() {
        user.get("Name").unwrap();
        user.get("Age").unwrap();
    }
    assert_eq!(env.query_count(), before);
}

#[test]
fn test_cache_miss_loads_the_whole_collection() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    seed(&env);
    env.invalidate_cache().unwrap();

    let users = env.pool("User").unwrap().search_all().fetch().unwrap();
    let before = env.query_count();
    assert_eq!(users.get("Name").unwrap(), Value::from("Ann"));
    assert_eq!(env.query_count(), before + 1);

    let last = users.records().unwrap().pop().unwrap();
    assert_eq!(last.get("Name").unwrap(), Value::from("Dee"));
    assert_eq!(env.query_count(), before + 1);
}

#[test]
fn test_fetch_is_idempotent() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    seed(&env);

    let adults = env
        .pool("User")
        .unwrap()
        .filter(Condition::leaf("Age", Operator::Greater, 18));
    let first = adults.fetch().unwrap();
    let count = env.query_count();
    let second = first.fetch().unwrap();
    assert_eq!(first, second);
    assert_eq!(env.query_count(), count);
    assert_eq!(first.len().unwrap(), 3);
}

#[test]
fn test_writes_replace_cached_values() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    seed(&env);
    let users = env.pool("User").unwrap();
    let ann = users
        .search(Condition::leaf("Name", Operator::Equals, "Ann"))
        .fetch()
        .unwrap();

    assert_eq!(ann.get("Age").unwrap(), Value::Integer(30));
    assert!(ann.write(field_map! { "Age" => 31 }).unwrap());
    assert_eq!(ann.get("Age").unwrap(), Value::Integer(31));

    ann.set("Name", "Anne").unwrap();
    env.invalidate_cache().unwrap();
    let renamed = users.search(Condition::leaf("Name", Operator::Equals, "Anne"));
    assert_eq!(renamed.ids().unwrap(), ann.ids().unwrap());
    assert_eq!(renamed.get("Age").unwrap(), Value::Integer(31));
}

#[test]
fn test_failed_write_leaves_no_stale_values() {
    let db = SqliteDatabase::memory().unwrap();
    let mut builder = RegistryBuilder::new();
    builder
        .declare_model("Account", ModelKind::Regular)
        .unwrap()
        .fields([FieldSpec::char("Login").unique(), FieldSpec::integer("Quota")])
        .unwrap();
    let registry = builder.bootstrap(&db).unwrap();
    let env = Environment::new(registry, &db, 1).unwrap();
    let accounts = env.pool("Account").unwrap();
    let ann = accounts
        .create(field_map! { "Login" => "ann", "Quota" => 5 })
        .unwrap();
    accounts
        .create(field_map! { "Login" => "bob", "Quota" => 7 })
        .unwrap();

    let ann = ann.load(&["Login", "Quota"]).unwrap();
    assert_eq!(ann.get("Quota").unwrap(), Value::Integer(5));

    assert!(
        ann.write(field_map! { "Login" => "bob", "Quota" => 9 })
            .is_err()
    );
    let before = env.query_count();
    assert_eq!(ann.get("Login").unwrap(), Value::from("ann"));
    assert_eq!(ann.get("Quota").unwrap(), Value::Integer(5));
    // The cached values were dropped before the update ran.
    assert_eq!(env.query_count(), before + 1);
}

#[test]
fn test_set_on_empty_collection() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    let nobody = env.pool("User").unwrap().browse(&[]);
    assert!(matches!(
        nobody.set("Name", "x"),
        Err(OrmError::EmptyRecordCollection(_))
    ));
    assert_eq!(nobody.get("Name").unwrap(), Value::from(""));
    assert_eq!(nobody.get("Active").unwrap(), Value::Boolean(false));
}

#[test]
fn test_unlink() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    seed(&env);
    let users = env.pool("User").unwrap();

    let minors = users.filter(Condition::leaf("Age", Operator::Lower, 18));
    assert_eq!(minors.unlink().unwrap(), 1);
    assert_eq!(users.search_all().len().unwrap(), 3);
    assert_eq!(users.browse(&[]).unlink().unwrap(), 0);
}

#[test]
fn test_copy_and_names() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    let users = env.pool("User").unwrap();
    let ann = users
        .create(field_map! { "Name" => "Ann", "Age" => 30, "Code" => "A-1" })
        .unwrap();

    let copy = ann.copy(field_map! { "Age" => 5 }).unwrap();
    assert_ne!(copy.ids().unwrap(), ann.ids().unwrap());
    assert_eq!(copy.get("Name").unwrap(), Value::from("Ann"));
    assert_eq!(copy.get("Age").unwrap(), Value::Integer(5));
    assert_eq!(copy.get("Code").unwrap(), Value::Null);

    assert_eq!(ann.name_get().unwrap(), "Ann");
    assert_eq!(ann.get("DisplayName").unwrap(), Value::from("Ann"));

    let both = ann.union(&copy).unwrap();
    assert!(matches!(both.copy(field_map! {}), Err(OrmError::ExpectedSingleton { count: 2, .. })));
    assert_eq!(both.subtract(&ann).unwrap(), copy);
}

#[test]
fn test_counter_names_fall_back_to_model_and_id() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    let counter = env.pool("Counter").unwrap().create(field_map! {}).unwrap();
    let id = counter.ids().unwrap()[0];
    assert_eq!(counter.name_get().unwrap(), format!("Counter,{}", id));
}

#[test]
fn test_mixed_models_cannot_be_combined() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    let users = env.pool("User").unwrap().browse(&[1]);
    let counters = env.pool("Counter").unwrap().browse(&[1]);
    assert!(matches!(users.union(&counters), Err(OrmError::TypeMismatch(_))));
    assert!(matches!(env.pool("BaseMixin"), Err(OrmError::UnsupportedOperation(_))));
}

#[test]
fn test_context_follows_records() {
    let (db, registry) = setup();
    let env = Environment::new(registry, &db, 1).unwrap();
    let users = env.pool("User").unwrap();
    let french = users.with_context("lang", "fr");
    assert_eq!(french.env().context_value("lang"), Some(&Value::from("fr")));
    assert!(users.env().context_value("lang").is_none());
}

#[test]
fn test_commit_and_rollback() {
    let (db, registry) = setup();

    let env = Environment::new(Arc::clone(&registry), &db, 1).unwrap();
    seed(&env);
    env.commit().unwrap();
    assert!(matches!(
        env.pool("User").unwrap().search_all().ids(),
        Err(OrmError::TransactionClosed)
    ));
    drop(env);

    let env = Environment::new(Arc::clone(&registry), &db, 1).unwrap();
    let users = env.pool("User").unwrap().search_all();
    assert_eq!(users.len().unwrap(), 4);
    users.unlink().unwrap();
    env.rollback().unwrap();
    drop(env);

    let env = Environment::new(registry, &db, 1).unwrap();
    assert_eq!(env.pool("User").unwrap().search_all().len().unwrap(), 4);
}
