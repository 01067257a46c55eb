//! Fail-open field decoders. A malformed field decodes to its "no
//! constraint" default and is logged; it never fails the whole record.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use crate::task::Priority;

pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() || value.as_str().is_some_and(|s| s.trim().is_empty()) {
        return Ok(T::default());
    }

    match serde_json::from_value::<T>(value.clone()) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            warn!(
                %value,
                error = %err,
                target_type = std::any::type_name::<T>(),
                "ignoring malformed field"
            );
            Ok(T::default())
        }
    }
}

/// Id sets accept numbers or numeric strings; anything else is dropped.
pub fn id_set<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        if !value.is_null() {
            warn!(%value, "id set was not an array; ignoring");
        }
        return Ok(vec![]);
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let parsed = match &item {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        match parsed {
            Some(id) if !out.contains(&id) => out.push(id),
            Some(_) => {}
            None => warn!(%item, "dropping malformed id"),
        }
    }
    Ok(out)
}

pub fn priority_set<'de, D>(deserializer: D) -> Result<Vec<Priority>, D::Error>
where
    D: Deserializer<'de>,
{
    let ids = id_set(deserializer)?;
    let mut out = Vec::with_capacity(ids.len());
    for raw in ids {
        match u8::try_from(raw).ok().and_then(Priority::new) {
            Some(priority) => out.push(priority),
            None => warn!(value = raw, "dropping out-of-range priority"),
        }
    }
    Ok(out)
}
