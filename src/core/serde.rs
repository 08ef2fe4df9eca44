use serde::{Serialize, Deserialize, Serializer, Deserializer};
use std::time::Duration;

/// Serializes Duration as whole milliseconds
pub fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    (duration.as_millis() as u64).serialize(serializer)
}

/// Deserializes Duration from milliseconds
pub fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// Serializes an optional Duration as milliseconds, 0 meaning unbounded
pub fn serialize_opt_millis<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    duration
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
        .serialize(serializer)
}

/// Deserializes an optional Duration from milliseconds, 0 meaning unbounded
pub fn deserialize_opt_millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok((millis > 0).then(|| Duration::from_millis(millis)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Timing {
        #[serde(serialize_with = "serialize_millis", deserialize_with = "deserialize_millis")]
        delay: Duration,
        #[serde(serialize_with = "serialize_opt_millis", deserialize_with = "deserialize_opt_millis")]
        limit: Option<Duration>,
    }

    #[test]
    fn test_millis_from_toml() {
        let timing: Timing = toml::from_str("delay = 250\nlimit = 0\n").unwrap();
        assert_eq!(timing.delay, Duration::from_millis(250));
        assert_eq!(timing.limit, None);

        let text = toml::to_string(&Timing {
            delay: Duration::from_millis(5),
            limit: Some(Duration::from_secs(2)),
        })
        .unwrap();
        assert!(text.contains("delay = 5"));
        assert!(text.contains("limit = 2000"));
    }
}
