use chrono::{TimeZone, Utc};
use strata_core::prelude::*;
use strata_core::{BackendUnitOfWork, UowState};
use strata_sqlx::{SqlxResource, SqlxUnitOfWork};

#[derive(Entity, Default, Debug, Clone, PartialEq)]
#[entity(table = "person")]
struct Person {
    #[entity(pk, auto)]
    id: i64,
    name: String,
    age: i32,
    active: bool,
    score: Option<f64>,
    #[entity(name = "joined_at")]
    joined: Option<chrono::DateTime<Utc>>,
}

fn person(name: &str, age: i32) -> Person {
    Person {
        name: name.into(),
        age,
        active: true,
        ..Default::default()
    }
}

const SCHEMA: &str = "CREATE TABLE person (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    age INTEGER NOT NULL,
    active BOOLEAN NOT NULL,
    score REAL,
    joined_at TEXT
)";

async fn setup(name: &str) -> SqlxResource {
    let config = ResourceConfig::new(name, BackendKind::Sqlite, "sqlite::memory:");
    let resource = SqlxResource::connect(&config).await.unwrap();
    sqlx::query(SCHEMA).execute(resource.pool()).await.unwrap();
    resource
}

async fn seed(resource: &SqlxResource) -> Vec<Person> {
    let repo = resource.db(&Context::background());
    let mut people = vec![
        person("ann", 31),
        person("bob", 17),
        person("cid", 45),
        person("dee", 22),
        person("eve", 17),
    ];
    for p in people.iter_mut() {
        repo.create(p).await.unwrap();
    }
    people
}

async fn all(resource: &SqlxResource) -> Vec<Person> {
    let mut out = Vec::new();
    resource
        .db(&Context::background())
        .query()
        .asc(["id"])
        .find(&mut out)
        .await
        .unwrap();
    out
}

#[tokio::test]
async fn test_create_writes_back_identity() {
    let resource = setup("main").await;
    let people = seed(&resource).await;
    let ids: Vec<i64> = people.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(all(&resource).await, people);
}

#[tokio::test]
async fn test_find_filter_order_and_paging() {
    let resource = setup("main").await;
    seed(&resource).await;
    let mut query = resource.db(&Context::background()).query();

    let mut adults: Vec<Person> = Vec::new();
    query
        .filter(Predicate::new("age >= ?").arg(18))
        .desc(["age"])
        .page(1)
        .page_size(2);
    query.find(&mut adults).await.unwrap();
    let names: Vec<&str> = adults.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["cid", "ann"]);

    // State was reset: no filter, no paging.
    assert_eq!(query.count::<Person>().await.unwrap(), 5);

    let mut second: Vec<Person> = Vec::new();
    query
        .filter(Predicate::new("age >= ?").arg(18))
        .desc(["age"])
        .page(2)
        .page_size(2);
    query.to_array(&mut second).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].name, "dee");
}

#[tokio::test]
async fn test_ascending_keys_sort_before_descending() {
    let resource = setup("main").await;
    seed(&resource).await;
    let mut out: Vec<Person> = Vec::new();
    resource
        .db(&Context::background())
        .query()
        .asc(["age"])
        .desc(["name"])
        .find(&mut out)
        .await
        .unwrap();
    let names: Vec<&str> = out.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["eve", "bob", "dee", "ann", "cid"]);
}

#[tokio::test]
async fn test_projection_leaves_other_fields_default() {
    let resource = setup("main").await;
    seed(&resource).await;
    let mut out: Vec<Person> = Vec::new();
    resource
        .db(&Context::background())
        .query()
        .fields(["name", "bogus"])
        .asc(["name"])
        .find(&mut out)
        .await
        .unwrap();
    assert_eq!(out.len(), 5);
    assert_eq!(out[0].name, "ann");
    assert_eq!(out[0].age, 0);
    assert_eq!(out[0].id, 0);
}

#[tokio::test]
async fn test_first_by_identity_and_no_match() {
    let resource = setup("main").await;
    seed(&resource).await;
    let repo = resource.db(&Context::background());

    let mut found = Person {
        id: 3,
        ..Default::default()
    };
    repo.query().first(&mut found).await.unwrap();
    assert_eq!(found.name, "cid");
    assert_eq!(found.age, 45);

    let mut missing = person("zed", 99);
    missing.id = 0;
    let before = missing.clone();
    repo.query()
        .filter(Predicate::new("name = ?").arg("nobody"))
        .first(&mut missing)
        .await
        .unwrap();
    assert_eq!(missing, before);
}

#[tokio::test]
async fn test_update_named_fields_only() {
    let resource = setup("main").await;
    let mut people = seed(&resource).await;
    let repo = resource.db(&Context::background());

    let ann = &mut people[0];
    ann.age = 32;
    ann.name = "not saved".into();
    repo.update(&*ann, UpdateRequest::fields(vec!["age".to_string()]))
        .await
        .unwrap();

    let mut stored = Person {
        id: ann.id,
        ..Default::default()
    };
    repo.query().first(&mut stored).await.unwrap();
    assert_eq!(stored.age, 32);
    assert_eq!(stored.name, "ann");
}

#[tokio::test]
async fn test_full_update_round_trips() {
    let resource = setup("main").await;
    let mut people = seed(&resource).await;
    let repo = resource.db(&Context::background());

    let bob = &mut people[1];
    bob.name = "robert".into();
    bob.age = 18;
    bob.active = false;
    bob.score = Some(9.5);
    bob.joined = Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap());
    repo.update(&*bob, UpdateRequest::all()).await.unwrap();

    let mut stored = Person {
        id: bob.id,
        ..Default::default()
    };
    repo.query().first(&mut stored).await.unwrap();
    assert_eq!(&stored, &*bob);
}

#[tokio::test]
async fn test_update_by_filter() {
    let resource = setup("main").await;
    seed(&resource).await;
    let repo = resource.db(&Context::background());

    let template = Person {
        active: false,
        ..Default::default()
    };
    repo.update(
        &template,
        UpdateRequest::fields(vec!["active".to_string()])
            .with_filter(Predicate::new("age < ?").arg(18)),
    )
    .await
    .unwrap();

    let inactive = repo
        .query()
        .filter("active = 0")
        .count::<Person>()
        .await
        .unwrap();
    assert_eq!(inactive, 2);
}

#[tokio::test]
async fn test_blanket_writes_rejected() {
    let resource = setup("main").await;
    seed(&resource).await;
    let repo = resource.db(&Context::background());
    let nobody = Person::default();

    let err = repo
        .update(&nobody, UpdateRequest::fields(vec!["age".to_string()]))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::UpdateFullNotAllowed));

    let err = repo.delete(&nobody, Some(Predicate::new(" "))).await.unwrap_err();
    assert!(matches!(err, DataError::DeleteFullNotAllowed));

    assert_eq!(repo.query().count::<Person>().await.unwrap(), 5);
}

#[tokio::test]
async fn test_delete_by_identity_and_filter() {
    let resource = setup("main").await;
    let people = seed(&resource).await;
    let repo = resource.db(&Context::background());

    repo.delete(&people[0], None).await.unwrap();
    repo.delete(&Person::default(), Some(Predicate::new("age = ?").arg(17)))
        .await
        .unwrap();

    let names: Vec<String> = all(&resource).await.into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["cid", "dee"]);
}

#[tokio::test]
async fn test_unit_of_work_replays_creates_deletes_updates() {
    let resource = setup("main").await;
    let people = seed(&resource).await;
    let ctx = Context::background();
    let uow = resource.uow();
    let repo = resource.db_in(&ctx, &uow);

    let mut cid = people[2].clone();
    cid.age = 46;
    repo.update(&cid, UpdateRequest::all()).await.unwrap();
    repo.delete(&people[1], None).await.unwrap();
    let mut fay = person("fay", 28);
    repo.create(&mut fay).await.unwrap();
    // Queued creates are not assigned database identities.
    assert_eq!(fay.id, 0);

    assert_eq!(uow.pending(), 3);
    assert_eq!(all(&resource).await.len(), 5);

    uow.commit(&ctx).await.unwrap();
    assert_eq!(uow.state(), UowState::Closed);

    let names: Vec<String> = all(&resource).await.into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["ann", "cid", "dee", "eve", "fay"]);
    let mut stored = Person {
        id: cid.id,
        ..Default::default()
    };
    resource.db(&ctx).query().first(&mut stored).await.unwrap();
    assert_eq!(stored.age, 46);

    let err = repo.create(&mut person("gus", 1)).await.unwrap_err();
    assert!(matches!(err, DataError::UnitOfWorkClosed));
}

#[tokio::test]
async fn test_failed_commit_rolls_back_batch() {
    let resource = setup("main").await;
    let ctx = Context::background();
    let uow: SqlxUnitOfWork = resource.uow();

    resource
        .db_in(&ctx, &uow)
        .create(&mut person("ann", 30))
        .await
        .unwrap();
    resource
        .db_in(&ctx, &uow)
        .in_table("ghost")
        .create(&mut person("bob", 30))
        .await
        .unwrap();

    let err = uow.commit(&ctx).await.unwrap_err();
    match err {
        DataError::Database { context, .. } => {
            assert_eq!(context.as_deref(), Some("insert into ghost"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(all(&resource).await.is_empty());
}

#[tokio::test]
async fn test_composite_commit_across_resources() {
    let main = setup("main").await;
    let archive = setup("archive").await;
    let ctx = Context::background();
    let uow = UnitOfWork::new();

    main.db_with(&ctx, &uow)
        .unwrap()
        .create(&mut person("ann", 30))
        .await
        .unwrap();
    archive
        .db_with(&ctx, &uow)
        .unwrap()
        .create(&mut person("old", 80))
        .await
        .unwrap();
    main.db_with(&ctx, &uow)
        .unwrap()
        .create(&mut person("bob", 20))
        .await
        .unwrap();
    assert_eq!(uow.members().len(), 2);
    assert_eq!(uow.pending(), 3);

    uow.commit(&ctx).await.unwrap();
    assert_eq!(all(&main).await.len(), 2);
    assert_eq!(all(&archive).await[0].name, "old");
}

#[tokio::test]
async fn test_exec_raw_statement() {
    let resource = setup("main").await;
    seed(&resource).await;
    let mut query = resource.db(&Context::background()).query();

    let mut teens: Vec<Person> = Vec::new();
    query
        .exec(
            &mut teens,
            Statement::new("SELECT id, NAME, age FROM person WHERE age < ? ORDER BY id").arg(18),
        )
        .await
        .unwrap();
    let names: Vec<&str> = teens.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["bob", "eve"]);

    let err = query
        .exec(&mut teens, Statement::new("SELECT * FROM person WHERE age < ?"))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::QueryArgs(_)));

    let err = query.exec(&mut teens, Statement::new("")).await.unwrap_err();
    assert!(matches!(err, DataError::EmptyStatement));
}

#[tokio::test]
async fn test_find_page() {
    let resource = setup("main").await;
    seed(&resource).await;
    let mut query = resource.db(&Context::background()).query();
    query.filter("age > 18").asc(["age"]).page_size(2);
    let page = query.find_page::<Person>().await.unwrap();
    assert_eq!(page.total_elements, 3);
    assert_eq!(page.total_pages, 2);
    let names: Vec<&str> = page.content.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["dee", "ann"]);
}

#[tokio::test]
async fn test_table_override_on_query() {
    let resource = setup("main").await;
    seed(&resource).await;
    sqlx::query("CREATE TABLE person_archive AS SELECT * FROM person WHERE age > 40")
        .execute(resource.pool())
        .await
        .unwrap();

    let mut query = resource.db(&Context::background()).query();
    let archived = query.table("person_archive").count::<Person>().await.unwrap();
    assert_eq!(archived, 1);
    assert_eq!(query.count::<Person>().await.unwrap(), 5);
}

#[tokio::test]
async fn test_cancelled_context_fails_fast() {
    let resource = setup("main").await;
    let ctx = Context::background();
    ctx.cancel();
    let err = resource
        .db(&ctx)
        .create(&mut person("ann", 30))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Cancelled));
    assert!(all(&resource).await.is_empty());
}

#[tokio::test]
async fn test_count_and_descending_ties() {
    let resource = setup("main").await;
    let repo = resource.db(&Context::background());
    for (name, age) in [("ann", 21), ("bob", 11), ("cid", 11)] {
        repo.create(&mut person(name, age)).await.unwrap();
    }
    let mut query = repo.query();
    let young = query
        .filter(Predicate::new("age = ?").arg(11))
        .count::<Person>()
        .await
        .unwrap();
    assert_eq!(young, 2);

    let mut out: Vec<Person> = Vec::new();
    query.desc(["age"]).find(&mut out).await.unwrap();
    let ages: Vec<i32> = out.iter().map(|p| p.age).collect();
    assert_eq!(ages, vec![21, 11, 11]);
    assert_eq!(out[0].name, "ann");
    let mut tied: Vec<&str> = out[1..].iter().map(|p| p.name.as_str()).collect();
    tied.sort();
    assert_eq!(tied, vec!["bob", "cid"]);
}

#[tokio::test]
async fn test_page_past_the_end_is_empty() {
    let resource = setup("main").await;
    seed(&resource).await;
    let mut out: Vec<Person> = Vec::new();
    resource
        .db(&Context::background())
        .query()
        .page(u64::MAX)
        .page_size(2)
        .find(&mut out)
        .await
        .unwrap();
    assert!(out.is_empty());
}
