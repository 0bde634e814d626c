use serde::{Deserialize, Deserializer, de::Error};
use std::time::Duration;

/// Reads an optional humantime duration such as `"30s"` or `"1m 30s"`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = Option::<String>::deserialize(deserializer)?;
    text.map(|text| humantime::parse_duration(&text).map_err(D::Error::custom))
        .transpose()
}
