//! Runs the conformance suite against SQLite.

use proptest::prelude::*;
use stowage_core::{Manager, Value};
use stowage_sql::{Connection, SqlAdapter, SqlConfig, SqliteConnection, Statement};
use stowage_testkit::conformance;
use stowage_testkit::fixtures::{Tag, User};
use stowage_testkit::generators::{edit_strategy, user_strategy};

fn adapter() -> SqlAdapter {
    stowage_testkit::init_tracing();
    SqlAdapter::sqlite_in_memory().expect("Failed to open sqlite")
}

fn manager() -> Manager {
    Manager::new(adapter())
}

#[test]
fn round_trip() {
    conformance::round_trip(&manager());
}

#[test]
fn idempotent_insert() {
    conformance::idempotent_insert(&manager());
}

#[test]
fn mutation_guard() {
    conformance::mutation_guard(&manager());
}

#[test]
fn unknown_removal() {
    conformance::unknown_removal(&manager());
}

#[test]
fn removal() {
    conformance::removal(&manager());
}

#[test]
fn rollback() {
    conformance::rollback(&manager());
}

#[test]
fn specification_semantics() {
    conformance::specification_semantics(&manager());
}

#[test]
fn null_semantics() {
    conformance::null_semantics(&manager());
}

#[test]
fn scoped_specifications() {
    conformance::scoped_specifications(&manager());
}

#[test]
fn optional_transitions() {
    conformance::optional_transitions(&manager());
}

#[test]
fn collection_updates() {
    conformance::collection_updates(&manager());
}

#[test]
fn sorting() {
    conformance::sorting(&manager());
}

#[test]
fn pagination() {
    conformance::pagination(&manager());
}

#[test]
fn sub_queries() {
    conformance::sub_queries(&manager());
}

fn count(connection: &dyn Connection, table: &str) -> i64 {
    let rows = connection
        .query(&Statement::new(format!("SELECT COUNT(*) FROM `{table}`")))
        .unwrap();
    rows[0][0].as_integer().unwrap()
}

#[test]
fn removal_leaves_no_child_rows() {
    let adapter = adapter();
    let connection = adapter.connection().clone();
    let manager = Manager::new(adapter);

    let user = User::sample().with_phone("+4712345678");
    conformance::store(&manager, std::slice::from_ref(&user));
    assert_eq!(count(connection.as_ref(), "user_phone"), 1);
    assert_eq!(count(connection.as_ref(), "user_tags"), 2);

    let users = conformance::users(&manager);
    manager.transactional(|| users.remove(&user.id)).unwrap();
    for table in ["user", "user_address", "user_phone", "user_tags"] {
        assert_eq!(count(connection.as_ref(), table), 0, "{table}");
    }
}

#[test]
fn collection_updates_touch_only_changed_rows() {
    let adapter = adapter();
    let connection = adapter.connection().clone();
    let manager = Manager::new(adapter);

    let mut user = User::sample();
    user.tags = vec![Tag::new("a", 1), Tag::new("b", 2)];
    conformance::store(&manager, std::slice::from_ref(&user));
    let reference_of = |label: &str| -> Value {
        connection
            .query(&Statement::with(
                "SELECT `reference` FROM `user_tags` WHERE `label` = ?",
                vec![Value::from(label)],
            ))
            .unwrap()[0][0]
            .clone()
    };
    let kept = reference_of("a");

    user.tags[1] = Tag::new("c", 3);
    conformance::store(&manager, std::slice::from_ref(&user));
    assert_eq!(reference_of("a"), kept);
    assert_eq!(count(connection.as_ref(), "user_tags"), 2);
}

#[test]
fn tables_are_left_alone_when_not_created() {
    let connection = SqliteConnection::open_in_memory().unwrap();
    let adapter = SqlAdapter::with_config(connection, SqlConfig::new().create_tables(false));
    let manager = Manager::new(adapter);

    let users = conformance::users(&manager);
    let err = users.size(None).unwrap_err();
    assert!(matches!(err, stowage_core::CoreError::Adapter { adapter: "sql", .. }));
}

#[test]
fn data_survives_reopening_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stowage.sqlite");
    let user = User::sample().with_phone("+4799999999");

    {
        let manager = Manager::new(SqlAdapter::new(SqliteConnection::open(&path).unwrap()));
        conformance::store(&manager, std::slice::from_ref(&user));
    }

    let manager = Manager::new(SqlAdapter::new(SqliteConnection::open(&path).unwrap()));
    let loaded = conformance::users(&manager).get(&user.id).unwrap();
    assert_eq!(loaded, Some(user));
}

/// More aggregates than SQLite allows bound variables in one statement.
#[test]
fn large_fetches_load_every_collection() {
    let manager = manager();
    let stored: Vec<User> = (0..33_000)
        .map(|i| User::named(&format!("user-{i}"), Some(i)))
        .collect();
    conformance::store(&manager, &stored);

    let users = conformance::users(&manager);
    let loaded = users.all().fetch().unwrap();
    assert_eq!(loaded.len(), users.size(None).unwrap());
    assert_eq!(loaded.len(), stored.len());
    assert!(loaded.iter().all(|u| u.tags.len() == 2));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn generated_users_round_trip(user in user_strategy()) {
        let manager = manager();
        conformance::store(&manager, std::slice::from_ref(&user));
        let loaded = conformance::users(&manager).get(&user.id).unwrap();
        prop_assert_eq!(loaded, Some(user));
    }

    #[test]
    fn generated_edits_persist((then, now) in edit_strategy()) {
        let manager = manager();
        conformance::store(&manager, std::slice::from_ref(&then));
        conformance::store(&manager, std::slice::from_ref(&now));
        let loaded = conformance::users(&manager).get(&now.id).unwrap().unwrap();
        prop_assert_eq!(&loaded.name, &now.name);
        prop_assert_eq!(loaded.age, now.age);
        prop_assert_eq!(&loaded.address, &now.address);
        prop_assert_eq!(&loaded.phone, &now.phone);
        prop_assert_eq!(loaded.tags.len(), now.tags.len());
    }
}
