//! Simulated users and rooms for driving a live server in tests and demos.
//!
//! Both collections work through an injected, admin-capable [`Socket`]
//! (logged in with the default credentials) and remember what they create,
//! so it can be cleaned up with `delete_all`.
//!
//! [`Socket`]: crate::websocket::Socket

pub mod room;
pub mod user;

pub use room::{NewRoom, RoomRecord, RoomSims};
pub use user::{NewUser, UserAccount, UserRecord, UserSims};

use rand::distr::Alphanumeric;
use rand::seq::IndexedRandom;
use rand::Rng;

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bruno", "Carla", "Dmitri", "Elena", "Farid", "Grace", "Hiro", "Ines", "Jonas",
    "Kira", "Liam", "Maya", "Nils", "Olga", "Pedro", "Quinn", "Rosa", "Sven", "Tara",
];

const WORDS: &[&str] = &[
    "alpha", "harbor", "copper", "meadow", "signal", "orbit", "lantern", "summit", "delta",
    "falcon", "granite", "willow", "ember", "tundra", "quartz", "canyon", "voyage", "pixel",
];

pub(crate) fn random_first_name() -> String {
    let mut rng = rand::rng();
    FIRST_NAMES.choose(&mut rng).copied().unwrap_or("Sim").to_string()
}

/// A random word with a short suffix, unlikely to collide with existing rooms.
pub(crate) fn random_word() -> String {
    let mut rng = rand::rng();
    let word = WORDS.choose(&mut rng).copied().unwrap_or("room");
    format!("{}-{}", word, rng.random_range(100..1000))
}

pub(crate) fn random_password() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}
