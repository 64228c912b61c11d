use stackorm::{Environment, FieldSpec, ModelKind, OrmError, Registry, RegistryBuilder, SqliteDatabase, Value, field_map};

fn builder() -> RegistryBuilder {
    let mut builder = RegistryBuilder::new();
    builder
        .declare_model("Partner", ModelKind::Regular)
        .unwrap()
        .fields([FieldSpec::char("Name")])
        .unwrap();
    builder
}

// The process-wide registry can only be installed once, so the whole
// lifecycle lives in a single test.
#[test]
fn test_global_registry_lifecycle() {
    let db = SqliteDatabase::memory().unwrap();
    assert!(Registry::global().is_err());
    assert!(Environment::global(&db, 1).is_err());

    let registry = builder().bootstrap_global(&db).unwrap();
    assert!(registry.contains("Partner"));
    assert!(matches!(
        builder().bootstrap_global(&db),
        Err(OrmError::AlreadyBootstrapped)
    ));
    assert!(matches!(
        Registry::install(registry.clone()),
        Err(OrmError::AlreadyBootstrapped)
    ));

    let env = Environment::global(&db, 1).unwrap();
    let partner = env
        .pool("Partner")
        .unwrap()
        .create(field_map! { "Name" => "Acme" })
        .unwrap();
    assert_eq!(partner.get("Name").unwrap(), Value::from("Acme"));
    assert!(std::sync::Arc::ptr_eq(&Registry::global().unwrap(), &registry));
    env.commit().unwrap();
}
