//! Property-based test generators using proptest.
//!
//! Generated values stay inside what every backend stores losslessly:
//! finite floats and short printable text.

use proptest::prelude::*;
use stowage_core::Id;

use crate::fixtures::{Address, Phone, Status, Tag, User};

/// Strategy for names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9 _%-]{0,15}").expect("Invalid regex")
}

/// Strategy for statuses.
pub fn status_strategy() -> impl Strategy<Value = Status> {
    prop_oneof![Just(Status::Active), Just(Status::Suspended)]
}

/// Strategy for addresses.
pub fn address_strategy() -> impl Strategy<Value = Address> {
    (name_strategy(), name_strategy()).prop_map(|(city, street)| Address { city, street })
}

/// Strategy for phones.
pub fn phone_strategy() -> impl Strategy<Value = Phone> {
    (
        prop::string::string_regex("\\+[0-9]{6,12}").expect("Invalid regex"),
        any::<bool>(),
    )
        .prop_map(|(number, verified)| Phone { number, verified })
}

/// Strategy for tags.
pub fn tag_strategy() -> impl Strategy<Value = Tag> {
    (name_strategy(), -1000_i64..1000).prop_map(|(label, weight)| Tag { label, weight })
}

/// Strategy for users with a fresh id.
pub fn user_strategy() -> impl Strategy<Value = User> {
    (
        name_strategy(),
        prop::option::of(0_i64..130),
        -1.0e6_f64..1.0e6,
        status_strategy(),
        address_strategy(),
        prop::option::of(phone_strategy()),
        prop::collection::vec(tag_strategy(), 0..4),
    )
        .prop_map(|(name, age, score, status, address, phone, tags)| User {
            id: Id::new(),
            name,
            age,
            score,
            status,
            address,
            phone,
            tags,
            session: None,
        })
}

/// Strategy for a user and an edited copy of it with the same id.
pub fn edit_strategy() -> impl Strategy<Value = (User, User)> {
    (user_strategy(), user_strategy()).prop_map(|(then, mut now)| {
        now.id = then.id;
        (then, now)
    })
}
