//! Shared error definitions, the preference-store seam, and small helpers
//! used across all skillsyoga crates.

pub mod error;
pub mod prefs;
pub mod slug;

pub use {
    error::{Error, FromMessage, Result},
    prefs::{MemoryPreferences, PreferenceStore, PreferenceStoreExt},
    slug::slugify,
};
