pub mod application;
pub mod candidate;
pub mod generation;
pub mod job;
pub mod resume;

use serde::{Deserialize, Deserializer};

/// The backend serializes blank text columns as `""`; treat those as absent.
pub(crate) fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
