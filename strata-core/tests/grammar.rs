use strata_core::grammar::substitute;
use strata_core::{
    metadata, DataError, Dialect, Entity, Grammar, Paging, Predicate, QueryState, SelectSpec, Value,
};

#[derive(Entity, Default)]
#[entity(table = "person")]
struct Person {
    #[entity(pk, auto)]
    id: i64,
    name: String,
    age: i32,
}

fn ann() -> Person {
    Person {
        id: 7,
        name: "ann".into(),
        age: 30,
    }
}

#[test]
fn test_insert_skips_auto_increment() {
    let meta = metadata::<Person>().unwrap();
    let stmt = Grammar::new(Dialect::Sqlite, &meta).insert(&ann()).unwrap();
    assert_eq!(stmt.sql, r#"INSERT INTO "person" ("name", "age") VALUES (?, ?)"#);
    assert_eq!(stmt.args, vec![Value::Text("ann".into()), Value::Int(30)]);
}

#[test]
fn test_postgres_insert_returns_identity() {
    let meta = metadata::<Person>().unwrap();
    let stmt = Grammar::new(Dialect::Postgres, &meta).insert(&ann()).unwrap();
    assert_eq!(
        stmt.sql,
        r#"INSERT INTO "person" ("name", "age") VALUES ($1, $2) RETURNING "id""#
    );
}

#[test]
fn test_mysql_quoting() {
    let meta = metadata::<Person>().unwrap();
    let stmt = Grammar::new(Dialect::MySql, &meta).insert(&ann()).unwrap();
    assert_eq!(stmt.sql, "INSERT INTO `person` (`name`, `age`) VALUES (?, ?)");
}

#[test]
fn test_update_selected_fields_renumbers_filter() {
    let meta = metadata::<Person>().unwrap();
    let stmt = Grammar::new(Dialect::Postgres, &meta)
        .update(&ann(), &["AGE".into()], &Predicate::new("name = $1").arg("ann"))
        .unwrap();
    assert_eq!(stmt.sql, r#"UPDATE "person" SET "age" = $1 WHERE name = $2"#);
    assert_eq!(stmt.args, vec![Value::Int(30), Value::Text("ann".into())]);
}

#[test]
fn test_update_all_mutable_by_identity() {
    let meta = metadata::<Person>().unwrap();
    let grammar = Grammar::new(Dialect::Sqlite, &meta);
    let by_id = grammar.identity(Value::Int(7)).unwrap();
    let stmt = grammar.update(&ann(), &[], &by_id).unwrap();
    assert_eq!(stmt.sql, r#"UPDATE "person" SET "name" = ?, "age" = ? WHERE "id" = ?"#);
    assert_eq!(
        stmt.args,
        vec![Value::Text("ann".into()), Value::Int(30), Value::Int(7)]
    );
}

#[test]
fn test_update_never_writes_primary_key() {
    let meta = metadata::<Person>().unwrap();
    let err = Grammar::new(Dialect::Sqlite, &meta)
        .update(&ann(), &["id".into()], &Predicate::new("1 = 1"))
        .unwrap_err();
    assert!(matches!(err, DataError::Grammar(_)));
}

#[test]
fn test_unfiltered_writes_rejected() {
    let meta = metadata::<Person>().unwrap();
    let grammar = Grammar::new(Dialect::Sqlite, &meta);
    assert!(matches!(
        grammar.delete(&Predicate::new("  ")),
        Err(DataError::Grammar(_))
    ));
    assert!(matches!(
        grammar.update(&ann(), &[], &Predicate::default()),
        Err(DataError::Grammar(_))
    ));
}

#[test]
fn test_delete() {
    let meta = metadata::<Person>().unwrap();
    let stmt = Grammar::new(Dialect::Sqlite, &meta)
        .delete(&Predicate::new("age < ?").arg(18))
        .unwrap();
    assert_eq!(stmt.sql, r#"DELETE FROM "person" WHERE age < ?"#);
    assert_eq!(stmt.args, vec![Value::Int(18)]);
}

#[test]
fn test_select_full_spec() {
    let meta = metadata::<Person>().unwrap();
    let fields = vec!["name".to_string()];
    let filter = Predicate::new("age > ?").arg(20);
    let asc = vec!["NAME".to_string()];
    let desc = vec!["age".to_string()];
    let spec = SelectSpec {
        fields: &fields,
        filter: Some(&filter),
        asc: &asc,
        desc: &desc,
        paging: Some(Paging::new(2, 10, 20)),
    };
    let stmt = Grammar::new(Dialect::Sqlite, &meta).select(&spec).unwrap();
    assert_eq!(
        stmt.sql,
        r#"SELECT "name" FROM "person" WHERE age > ? ORDER BY "name" ASC, "age" DESC LIMIT 10 OFFSET 10"#
    );
    assert_eq!(stmt.args, vec![Value::Int(20)]);
}

#[test]
fn test_select_unknown_fields_project_everything() {
    let meta = metadata::<Person>().unwrap();
    let fields = vec!["nope".to_string()];
    let spec = SelectSpec {
        fields: &fields,
        ..Default::default()
    };
    let stmt = Grammar::new(Dialect::Sqlite, &meta).select(&spec).unwrap();
    assert_eq!(stmt.sql, r#"SELECT "id", "name", "age" FROM "person""#);
}

#[test]
fn test_select_rejects_injected_order() {
    let meta = metadata::<Person>().unwrap();
    let asc = vec!["age; DROP TABLE person".to_string()];
    let spec = SelectSpec {
        asc: &asc,
        ..Default::default()
    };
    let err = Grammar::new(Dialect::Sqlite, &meta).select(&spec).unwrap_err();
    assert!(matches!(err, DataError::Grammar(_)));
}

#[test]
fn test_select_from_query_state() {
    let meta = metadata::<Person>().unwrap();
    let mut state: QueryState<Predicate> = QueryState::default();
    state.page = Some(3);
    let stmt = Grammar::new(Dialect::Sqlite, &meta)
        .select(&state.select_spec(20))
        .unwrap();
    assert!(stmt.sql.ends_with(" LIMIT 20 OFFSET 40"));
}

#[test]
fn test_count_ignores_blank_filter() {
    let meta = metadata::<Person>().unwrap();
    let grammar = Grammar::new(Dialect::Postgres, &meta);
    assert_eq!(
        grammar.count(Some(&Predicate::new(""))).unwrap().sql,
        r#"SELECT count(1) FROM "person""#
    );
    let stmt = grammar
        .count(Some(&Predicate::new("age > $1").arg(3)))
        .unwrap();
    assert_eq!(stmt.sql, r#"SELECT count(1) FROM "person" WHERE age > $1"#);
}

#[test]
fn test_table_override() {
    let meta = metadata::<Person>().unwrap();
    let grammar = Grammar::new(Dialect::Sqlite, &meta).with_table(Some("person_2024"));
    assert_eq!(grammar.table(), "person_2024");
    assert!(grammar
        .insert(&ann())
        .unwrap()
        .sql
        .starts_with(r#"INSERT INTO "person_2024""#));

    let bad = Grammar::new(Dialect::Sqlite, &meta).with_table(Some("x; --"));
    assert!(matches!(bad.insert(&ann()), Err(DataError::Grammar(_))));
}

#[test]
fn test_substitute_named_markers() {
    let meta = metadata::<Person>().unwrap();
    let person = Person {
        id: 1,
        name: "o'neil".into(),
        age: 30,
    };
    let sql = substitute(
        "UPDATE person SET age = @age WHERE name = @name AND note <> '@name' AND x = @unknown",
        &meta,
        &person,
    );
    assert_eq!(
        sql,
        "UPDATE person SET age = 30 WHERE name = 'o''neil' AND note <> '@name' AND x = @unknown"
    );
}
