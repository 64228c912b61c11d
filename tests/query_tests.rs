use std::sync::Arc;

use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use stackorm::{
    Condition, Domain, FieldSpec, ModelKind, Operator, Query, Registry, RegistryBuilder, SqlBuilder, Value,
    adapter_for,
};

fn registry() -> Arc<Registry> {
    let mut builder = RegistryBuilder::new();
    builder
        .declare_model("Company", ModelKind::Regular)
        .unwrap()
        .fields([
            FieldSpec::char("Name"),
            FieldSpec::many2one("Parent", "Company"),
            FieldSpec::one2many("Users", "User", "Company"),
        ])
        .unwrap();
    builder
        .declare_model("Tag", ModelKind::Regular)
        .unwrap()
        .fields([FieldSpec::char("Name")])
        .unwrap();
    builder
        .declare_model("User", ModelKind::Regular)
        .unwrap()
        .fields([
            FieldSpec::char("Name"),
            FieldSpec::integer("Age"),
            FieldSpec::date("Birthday"),
            FieldSpec::many2one("Company", "Company"),
            FieldSpec::many2many("Tags", "Tag"),
            FieldSpec::related("CompanyName", "Company.Name"),
        ])
        .unwrap();
    builder.bootstrap_offline().unwrap()
}

fn where_sql(registry: &Registry, model: &str, condition: &Condition) -> (String, Vec<Value>) {
    let adapter = adapter_for("sqlite").unwrap();
    let model = registry.model(model).unwrap();
    let statement = SqlBuilder::new(registry, adapter.as_ref(), model)
        .condition_sql(condition)
        .unwrap();
    (statement.sql, statement.params)
}

fn assert_parses(sql: &str) {
    if let Err(e) = Parser::parse_sql(&SQLiteDialect {}, sql) {
        panic!("Generated SQL does not parse: {}\n{}", e, sql);
    }
}

#[test]
fn test_or_domain() {
    let registry = registry();
    let domain = Domain::parse(r#"["|", ["Age", "<", 18], ["Age", ">", 65]]"#).unwrap();
    let condition = domain.to_condition().unwrap();

    let (sql, params) = where_sql(&registry, "User", &condition);
    assert_eq!(sql, r#""user"."age" < ? OR "user"."age" > ?"#);
    assert_eq!(params, vec![Value::Integer(18), Value::Integer(65)]);
}

#[test]
fn test_negated_and_nested_terms() {
    let registry = registry();
    let condition = Condition::leaf("Name", Operator::Equals, "Ann")
        .and_not("Age", Operator::Lower, 18)
        .or_cond(Condition::leaf("Age", Operator::Greater, 65).and("Name", Operator::NotEquals, "Bob"));

    let (sql, params) = where_sql(&registry, "User", &condition);
    assert_eq!(
        sql,
        r#""user"."name" = ? AND NOT ("user"."age" < ?) OR ("user"."age" > ? AND ("user"."name" != ? OR "user"."name" IS NULL))"#
    );
    assert_eq!(params.len(), 4);
}

#[test]
fn test_null_comparisons() {
    let registry = registry();
    let (sql, params) = where_sql(
        &registry,
        "User",
        &Condition::leaf("Company", Operator::Equals, Value::Null),
    );
    assert_eq!(sql, r#""user"."company_id" IS NULL"#);
    assert!(params.is_empty());

    let (sql, _) = where_sql(
        &registry,
        "User",
        &Condition::leaf("Company", Operator::NotEquals, false),
    );
    assert_eq!(sql, r#""user"."company_id" IS NOT NULL"#);

    let adapter = adapter_for("sqlite").unwrap();
    let user = registry.model("User").unwrap();
    let result = SqlBuilder::new(&registry, adapter.as_ref(), user)
        .condition_sql(&Condition::leaf("Age", Operator::Greater, Value::Null));
    assert!(result.is_err());
}

#[test]
fn test_empty_lists_and_unset_values() {
    let registry = registry();
    let empty: Vec<Value> = Vec::new();

    let (sql, _) = where_sql(&registry, "User", &Condition::leaf("id", Operator::In, empty.clone()));
    assert_eq!(sql, "1 = 0");
    let (sql, _) = where_sql(&registry, "User", &Condition::leaf("id", Operator::NotIn, empty));
    assert_eq!(sql, "1 = 1");

    let (sql, params) = where_sql(&registry, "User", &Condition::leaf("Name", Operator::EqualsOrUnset, ""));
    assert_eq!(sql, "1 = 1");
    assert!(params.is_empty());

    let (sql, params) = where_sql(&registry, "User", &Condition::leaf("Name", Operator::EqualsOrUnset, "Ann"));
    assert_eq!(sql, r#""user"."name" = ?"#);
    assert_eq!(params, vec![Value::from("Ann")]);
}

#[test]
fn test_patterns() {
    let registry = registry();
    let (sql, params) = where_sql(&registry, "User", &Condition::leaf("Name", Operator::Like, "nn"));
    assert_eq!(sql, r#""user"."name" LIKE ?"#);
    assert_eq!(params, vec![Value::from("%nn%")]);

    let (sql, params) = where_sql(&registry, "User", &Condition::leaf("Name", Operator::ILikePattern, "a%"));
    assert_eq!(sql, r#"LOWER("user"."name") LIKE LOWER(?)"#);
    assert_eq!(params, vec![Value::from("a%")]);
}

#[test]
fn test_dates_are_parsed_from_text() {
    let registry = registry();
    let (_, params) = where_sql(
        &registry,
        "User",
        &Condition::leaf("Birthday", Operator::GreaterOrEqual, "2000-01-31"),
    );
    let expected = chrono::NaiveDate::from_ymd_opt(2000, 1, 31).unwrap();
    assert_eq!(params, vec![Value::Date(expected)]);
}

#[test]
fn test_paths_join_related_tables() {
    let registry = registry();
    let adapter = adapter_for("sqlite").unwrap();
    let user = registry.model("User").unwrap();

    let query = Query::with_condition(Condition::leaf("Company.Parent.Name", Operator::Equals, "Holding"));
    let statement = SqlBuilder::new(&registry, adapter.as_ref(), user)
        .select_ids(&query)
        .unwrap();
    assert!(statement.sql.contains(r#"LEFT JOIN "company" AS "user__company_id""#), "{}", statement.sql);
    assert!(statement.sql.contains(r#""user__company_id__parent_id"."name" = ?"#), "{}", statement.sql);
    assert_eq!(statement.params, vec![Value::from("Holding")]);
    assert_parses(&statement.sql);
}

#[test]
fn test_related_fields_expand_to_their_path() {
    let registry = registry();
    let (direct, _) = where_sql(&registry, "User", &Condition::leaf("Company.Name", Operator::Equals, "Acme"));
    let (related, _) = where_sql(&registry, "User", &Condition::leaf("CompanyName", Operator::Equals, "Acme"));
    assert_eq!(direct, related);
}

#[test]
fn test_x2many_paths_select_distinct() {
    let registry = registry();
    let adapter = adapter_for("sqlite").unwrap();

    let user = registry.model("User").unwrap();
    let query = Query::with_condition(Condition::leaf("Tags.Name", Operator::Equals, "vip"));
    let statement = SqlBuilder::new(&registry, adapter.as_ref(), user)
        .select_ids(&query)
        .unwrap();
    assert!(statement.sql.starts_with("SELECT DISTINCT"), "{}", statement.sql);
    assert!(statement.sql.contains(r#""tag_user_rel""#), "{}", statement.sql);
    assert_parses(&statement.sql);

    let company = registry.model("Company").unwrap();
    let query = Query::with_condition(Condition::leaf("Users", Operator::In, vec![1i64, 2]));
    let statement = SqlBuilder::new(&registry, adapter.as_ref(), company)
        .select_ids(&query)
        .unwrap();
    assert!(statement.sql.contains(r#""company__users_ids"."id" IN (?, ?)"#), "{}", statement.sql);
    assert_parses(&statement.sql);
}

#[test]
fn test_child_of_uses_recursive_tree() {
    let registry = registry();
    let (sql, params) = where_sql(&registry, "Company", &Condition::leaf("Parent", Operator::ChildOf, 1i64));
    assert!(sql.starts_with(r#""company"."parent_id" IN (WITH RECURSIVE child_of_tree"#), "{}", sql);
    assert_eq!(params, vec![Value::Integer(1)]);

    let result = SqlBuilder::new(
        &registry,
        adapter_for("sqlite").unwrap().as_ref(),
        registry.model("User").unwrap(),
    )
    .condition_sql(&Condition::leaf("Name", Operator::ChildOf, 1i64));
    assert!(result.is_err());
}

#[test]
fn test_generated_statements_parse() {
    let registry = registry();
    let adapter = adapter_for("sqlite").unwrap();
    let user = registry.model("User").unwrap();
    let query = Query::with_condition(
        Condition::leaf("Age", Operator::GreaterOrEqual, 18).and("Company.Name", Operator::ILike, "ac"),
    );

    let select = SqlBuilder::new(&registry, adapter.as_ref(), user)
        .select_ids(&query)
        .unwrap();
    assert_parses(&select.sql);

    let (load, fields) = SqlBuilder::new(&registry, adapter.as_ref(), user)
        .select(&query, &["Name".to_string(), "Company.Name".to_string()])
        .unwrap();
    assert_eq!(fields.len(), 2);
    assert_parses(&load.sql);

    let count = SqlBuilder::new(&registry, adapter.as_ref(), user)
        .count(&query)
        .unwrap();
    assert!(count.sql.starts_with("SELECT COUNT(*) FROM ("));
    assert_parses(&count.sql);

    let (grouped, groups, sums) = SqlBuilder::new(&registry, adapter.as_ref(), user)
        .group_by(&query, &["Company".to_string()], &["Age".to_string(), "Name".to_string()])
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(sums.len(), 1);
    assert!(grouped.sql.contains("GROUP BY"));
    assert_parses(&grouped.sql);

    let values = vec![("name".to_string(), Value::from("Ann")), ("age".to_string(), Value::from(3))];
    let insert = SqlBuilder::insert(adapter.as_ref(), user, &values);
    assert_eq!(
        insert.sql,
        r#"INSERT INTO "user" ("name", "age") VALUES (?, ?) RETURNING "id""#
    );
    assert_parses(&insert.sql);
    assert_parses(&SqlBuilder::insert(adapter.as_ref(), user, &[]).sql);

    let update = SqlBuilder::update(adapter.as_ref(), user, &values, &[1, 2]);
    assert_eq!(update.params.len(), 4);
    assert_parses(&update.sql);

    let delete = SqlBuilder::delete(adapter.as_ref(), user, &[1, 2, 3]);
    assert_eq!(delete.sql, r#"DELETE FROM "user" WHERE "id" IN (?, ?, ?)"#);
    assert_parses(&delete.sql);
}

#[test]
fn test_postgres_placeholders() {
    let adapter = adapter_for("postgres").unwrap();
    assert_eq!(adapter.rebind("a = ? AND b IN (?, ?)"), "a = $1 AND b IN ($2, $3)");
}

#[test]
fn test_relation_and_reference_statements() {
    let registry = registry();
    let adapter = adapter_for("sqlite").unwrap();
    let user = registry.model("User").unwrap();
    let tags = user.field("Tags").unwrap();
    let relation = tags.relation().unwrap();

    let targets = SqlBuilder::relation_targets(adapter.as_ref(), relation, 4);
    assert_eq!(targets.sql, r#"SELECT "tag_id" FROM "tag_user_rel" WHERE "user_id" = ?"#);
    assert_eq!(targets.params, vec![Value::Integer(4)]);

    let link = SqlBuilder::link_relation(adapter.as_ref(), relation, 4, 9);
    assert_eq!(link.sql, r#"INSERT INTO "tag_user_rel" ("user_id", "tag_id") VALUES (?, ?)"#);
    assert_eq!(link.params, vec![Value::Integer(4), Value::Integer(9)]);

    let unlink = SqlBuilder::unlink_relation(adapter.as_ref(), relation, 4);
    assert_eq!(unlink.sql, r#"DELETE FROM "tag_user_rel" WHERE "user_id" = ?"#);

    let company = user.field("Company").unwrap();
    let clear = SqlBuilder::clear_references(adapter.as_ref(), user, company, &[1, 2]);
    assert_eq!(
        clear.sql,
        r#"UPDATE "user" SET "company_id" = NULL WHERE "company_id" IN (?, ?)"#
    );
    assert_eq!(clear.params.len(), 2);

    for statement in [targets, link, unlink, clear] {
        assert_parses(&statement.sql);
    }
}
