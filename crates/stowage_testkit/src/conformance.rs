//! Behaviour every adapter must show.
//!
//! Each scenario takes a fresh [`Manager`] over the adapter under test and
//! panics on the first deviation. Adapter crates call them from their
//! `tests/conformance.rs`, usually through [`run_all`].

use stowage_core::specification::{Direction, Property, Specification};
use stowage_core::{CoreError, CoreResult, Fetch, Id, Manager, Repository};

use crate::fixtures::{Purchase, Tag, User};

/// The user repository of `manager`.
pub fn users(manager: &Manager) -> Repository<User> {
    manager.repository::<User>().expect("Failed to open user repository")
}

/// Stores `aggregates` in one transaction.
pub fn store(manager: &Manager, aggregates: &[User]) {
    let repo = users(manager);
    manager
        .transactional(|| aggregates.iter().try_for_each(|u| repo.put(u)))
        .expect("Failed to store users");
}

fn names(found: &[User]) -> Vec<String> {
    let mut names: Vec<String> = found.iter().map(|u| u.name.clone()).collect();
    names.sort();
    names
}

fn matching(manager: &Manager, spec: Specification) -> Vec<String> {
    names(&users(manager).matching(spec).fetch().expect("Failed to fetch"))
}

fn labels(user: &User) -> Vec<(String, i64)> {
    let mut labels: Vec<(String, i64)> = user
        .tags
        .iter()
        .map(|t| (t.label.clone(), t.weight))
        .collect();
    labels.sort();
    labels
}

fn reload(manager: &Manager, user: &User) -> User {
    users(manager)
        .get(&user.id)
        .expect("Failed to get user")
        .expect("User is missing")
}

/// A stored aggregate loads back equal.
pub fn round_trip(manager: &Manager) {
    let user = User::sample().with_phone("+4712345678");
    store(manager, std::slice::from_ref(&user));

    let loaded = reload(manager, &user);
    assert_eq!(loaded, user);
    assert!(users(manager).contains(&user.id).expect("Failed to check"));
}

/// Putting the same aggregate twice in one transaction stores it once.
pub fn idempotent_insert(manager: &Manager) {
    let user = User::sample();
    store(manager, &[user.clone(), user.clone()]);

    let repo = users(manager);
    assert_eq!(repo.size(None).expect("Failed to count"), 1);
    assert_eq!(reload(manager, &user), user);
}

/// Mutations outside a transaction fail and change nothing.
pub fn mutation_guard(manager: &Manager) {
    let kept = User::sample();
    store(manager, std::slice::from_ref(&kept));
    let repo = users(manager);

    let err = repo.put(&User::sample()).expect_err("put outside a transaction");
    assert!(matches!(err, CoreError::IllegalMutation { .. }), "{err}");
    let err = repo.remove(&kept.id).expect_err("remove outside a transaction");
    assert!(matches!(err, CoreError::IllegalMutation { .. }), "{err}");

    assert_eq!(repo.size(None).expect("Failed to count"), 1);
    assert!(repo.contains(&kept.id).expect("Failed to check"));
}

/// Removing an unknown id is a no-op.
pub fn unknown_removal(manager: &Manager) {
    store(manager, &[User::sample()]);
    let repo = users(manager);

    manager
        .transactional(|| repo.remove(&Id::new()))
        .expect("Removing an unknown id failed");
    assert_eq!(repo.size(None).expect("Failed to count"), 1);
}

/// Removing an aggregate removes its children with it.
pub fn removal(manager: &Manager) {
    let user = User::sample().with_phone("+4700000000");
    store(manager, std::slice::from_ref(&user));
    let repo = users(manager);

    manager
        .transactional(|| repo.remove(&user.id))
        .expect("Failed to remove");
    assert!(!repo.contains(&user.id).expect("Failed to check"));
    assert!(repo.none(None).expect("Failed to check"));

    let reborn = User {
        phone: None,
        tags: vec![Tag::new("fresh", 1)],
        ..user
    };
    store(manager, std::slice::from_ref(&reborn));
    assert_eq!(reload(manager, &reborn), reborn);
}

#[derive(Debug)]
enum Abort {
    Core(CoreError),
    Requested,
}

impl From<CoreError> for Abort {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

/// A failed transaction leaves no trace.
pub fn rollback(manager: &Manager) {
    store(manager, &[User::named("kept", None)]);
    let repo = users(manager);
    let before = repo.size(None).expect("Failed to count");

    let user = User::sample();
    let result = manager.transactional(|| {
        repo.put(&user)?;
        Err::<(), _>(Abort::Requested)
    });
    match result {
        Err(Abort::Requested) => {}
        Err(Abort::Core(err)) => panic!("transaction failed: {err}"),
        Ok(()) => panic!("transaction committed"),
    }

    assert!(!repo.contains(&user.id).expect("Failed to check"));
    assert_eq!(repo.size(None).expect("Failed to count"), before);
    assert!(!manager.in_transaction());
}

/// The `starts-with` and `equals` scenario over names.
pub fn specification_semantics(manager: &Manager) {
    store(
        manager,
        &[
            User::named("alice", Some(30)),
            User::named("bob", Some(40)),
            User::named("alice-prefix", Some(50)),
        ],
    );

    assert_eq!(
        matching(manager, Property::of("name").starts_with("alice")),
        ["alice", "alice-prefix"]
    );
    assert_eq!(matching(manager, Property::of("name").equals("alice")), ["alice"]);
    assert_eq!(
        matching(manager, Property::of("name").ends_with("prefix")),
        ["alice-prefix"]
    );
    assert_eq!(
        matching(manager, Property::of("name").contains("ce-p")),
        ["alice-prefix"]
    );
    assert_eq!(
        matching(manager, Property::of("age").greater_than_or_equal(40_i64)),
        ["alice-prefix", "bob"]
    );
    assert_eq!(
        matching(
            manager,
            Property::of("name")
                .equals("bob")
                .or(Property::of("age").less_than(35_i64))
        ),
        ["alice", "bob"]
    );
    assert_eq!(
        matching(manager, Property::of("name").in_list(["bob", "carol"])),
        ["bob"]
    );
    let nobody: [&str; 0] = [];
    assert!(matching(manager, Property::of("name").in_list(nobody)).is_empty());
}

/// Nulls only satisfy `is-null`, and negation is two-valued.
pub fn null_semantics(manager: &Manager) {
    store(
        manager,
        &[User::named("known", Some(30)), User::named("unknown", None)],
    );

    assert_eq!(matching(manager, Property::of("age").is_null()), ["unknown"]);
    assert_eq!(matching(manager, Property::of("age").is_not_null()), ["known"]);
    assert!(matching(manager, Property::of("age").not_equals(30_i64)).is_empty());
    assert_eq!(matching(manager, Property::of("age").less_than(99_i64)), ["known"]);
    assert_eq!(matching(manager, !Property::of("age").equals(30_i64)), ["unknown"]);
}

/// Entity, optional and collection scopes.
pub fn scoped_specifications(manager: &Manager) {
    let mut mixed = User::named("mixed", None).in_city("Bergen");
    mixed.tags = vec![Tag::new("admin", 1), Tag::new("heavy", 10)];
    store(
        manager,
        &[
            User::named("oslo", None).with_phone("+4711111111"),
            User::named("abroad", None).with_phone("+4622222222"),
            mixed,
        ],
    );

    assert_eq!(
        matching(
            manager,
            Specification::entity("address", Property::of("city").equals("Bergen"))
        ),
        ["mixed"]
    );
    assert_eq!(matching(manager, Specification::has("phone")), ["abroad", "oslo"]);
    assert_eq!(matching(manager, !Specification::has("phone")), ["mixed"]);
    assert_eq!(
        matching(
            manager,
            Specification::just("phone", Property::of("number").starts_with("+47"))
        ),
        ["oslo"]
    );
    assert_eq!(
        matching(
            manager,
            Specification::child("tags", Property::of("label").equals("admin"))
        ),
        ["abroad", "mixed", "oslo"]
    );
    // Both comparators must hold for the same element.
    assert_eq!(
        matching(
            manager,
            Specification::child(
                "tags",
                Property::of("label")
                    .equals("admin")
                    .and(Property::of("weight").greater_than(5_i64))
            )
        ),
        ["abroad", "oslo"]
    );
}

/// An optional can appear, change, disappear and reappear.
pub fn optional_transitions(manager: &Manager) {
    let mut user = User::sample();
    store(manager, std::slice::from_ref(&user));
    let repo = users(manager);
    assert!(reload(manager, &user).phone.is_none());

    user = user.with_phone("+4711111111");
    store(manager, std::slice::from_ref(&user));
    assert_eq!(reload(manager, &user), user);
    assert!(repo.any(Some(Specification::has("phone"))).expect("Failed to check"));

    if let Some(phone) = user.phone.as_mut() {
        phone.number = "+4722222222".into();
        phone.verified = true;
    }
    store(manager, std::slice::from_ref(&user));
    assert_eq!(reload(manager, &user), user);

    user.phone = None;
    store(manager, std::slice::from_ref(&user));
    assert_eq!(reload(manager, &user).phone, None);
    assert!(repo.none(Some(Specification::has("phone"))).expect("Failed to check"));

    user = user.with_phone("+4733333333");
    store(manager, std::slice::from_ref(&user));
    let phone = reload(manager, &user).phone.expect("Phone is missing");
    assert_eq!(phone.number, "+4733333333");
    assert!(!phone.verified);
}

/// Collection elements can be added, changed and removed.
pub fn collection_updates(manager: &Manager) {
    let mut user = User::sample();
    user.tags = vec![Tag::new("a", 1), Tag::new("b", 2)];
    store(manager, std::slice::from_ref(&user));

    user.tags = vec![Tag::new("a", 1), Tag::new("c", 3)];
    store(manager, std::slice::from_ref(&user));
    assert_eq!(labels(&reload(manager, &user)), labels(&user));

    user.tags[0].weight = 5;
    user.tags.push(Tag::new("d", 4));
    store(manager, std::slice::from_ref(&user));
    assert_eq!(labels(&reload(manager, &user)), labels(&user));

    user.tags.clear();
    store(manager, std::slice::from_ref(&user));
    assert!(reload(manager, &user).tags.is_empty());
}

/// Sorting by root and entity properties.
pub fn sorting(manager: &Manager) {
    store(
        manager,
        &[
            User::named("carol", Some(20)).in_city("Aalborg"),
            User::named("alice", Some(40)).in_city("Copenhagen"),
            User::named("bob", Some(30)).in_city("Bergen"),
        ],
    );
    let repo = users(manager);
    let order = |path: &str, direction: Direction| -> Vec<String> {
        repo.all()
            .sort(path, direction)
            .fetch()
            .expect("Failed to fetch")
            .into_iter()
            .map(|u| u.name)
            .collect()
    };

    assert_eq!(order("name", Direction::Ascending), ["alice", "bob", "carol"]);
    assert_eq!(order("age", Direction::Descending), ["alice", "bob", "carol"]);
    assert_eq!(
        order("address.city", Direction::Ascending),
        ["carol", "bob", "alice"]
    );
}

/// `drop` and `take` page through the matches.
pub fn pagination(manager: &Manager) {
    store(
        manager,
        &[
            User::named("a", None),
            User::named("b", None),
            User::named("c", None),
            User::named("other", None).in_city("Bergen"),
        ],
    );
    let repo = users(manager);
    let oslo = || Specification::entity("address", Property::of("city").equals("Oslo"));
    let page = |drop: usize, take: usize| -> Vec<String> {
        repo.fetch(
            Fetch::matching(oslo())
                .sort(stowage_core::specification::Sort::ascending("name"))
                .drop(drop)
                .take(take),
        )
        .expect("Failed to fetch")
        .into_iter()
        .map(|u| u.name)
        .collect()
    };

    assert_eq!(page(2, 1), ["c"]);
    assert_eq!(page(0, 2), ["a", "b"]);
    assert!(page(3, 2).is_empty());
    assert!(page(7, 1).is_empty());
    assert_eq!(repo.size(Some(oslo())).expect("Failed to count"), 3);
}

/// Ids selected in one repository filter another.
pub fn sub_queries(manager: &Manager) {
    let alice = User::named("alice", None);
    let bob = User::named("bob", None).in_city("Bergen");
    store(manager, &[alice.clone(), bob.clone()]);

    let purchases = manager
        .repository::<Purchase>()
        .expect("Failed to open purchase repository");
    manager
        .transactional(|| -> CoreResult<()> {
            purchases.put(&Purchase::new(alice.id, 100))?;
            purchases.put(&Purchase::new(bob.id, 50))?;
            purchases.put(&Purchase::new(alice.id, 20))
        })
        .expect("Failed to store purchases");

    let in_oslo = users(manager)
        .matching(Specification::entity(
            "address",
            Property::of("city").equals("Oslo"),
        ))
        .ids();
    let mut amounts: Vec<i64> = purchases
        .matching(Property::of("buyer").matching(in_oslo))
        .fetch()
        .expect("Failed to fetch")
        .into_iter()
        .map(|p| p.amount)
        .collect();
    amounts.sort_unstable();
    assert_eq!(amounts, [20, 100]);
}

/// Runs every scenario, each against a fresh manager.
pub fn run_all(manager: impl Fn() -> Manager) {
    let scenarios: [(&str, fn(&Manager)); 14] = [
        ("round_trip", round_trip),
        ("idempotent_insert", idempotent_insert),
        ("mutation_guard", mutation_guard),
        ("unknown_removal", unknown_removal),
        ("removal", removal),
        ("rollback", rollback),
        ("specification_semantics", specification_semantics),
        ("null_semantics", null_semantics),
        ("scoped_specifications", scoped_specifications),
        ("optional_transitions", optional_transitions),
        ("collection_updates", collection_updates),
        ("sorting", sorting),
        ("pagination", pagination),
        ("sub_queries", sub_queries),
    ];
    for (name, scenario) in scenarios {
        tracing::info!(scenario = name, "running");
        scenario(&manager());
    }
}
