//! Durations in config files: `"5s"`, `"250ms"`, `"1m 30s"` or bare seconds.
//!
//! Use with `#[serde(with = "duration_serde::duration")]`.

pub mod duration {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(u64),
        Human(String),
    }

    /// Always written back in humantime form
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Seconds(seconds) => Ok(Duration::from_secs(seconds)),
            RawDuration::Human(text) => humantime::parse_duration(text.trim())
                .map_err(|e| D::Error::custom(format!("invalid duration '{}': {}", text, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super::duration")]
        grace: Duration,
    }

    #[test]
    fn test_parses_human_readable_and_numeric() {
        let human: Wrapper = toml::from_str("grace = \"1500ms\"").unwrap();
        assert_eq!(human.grace, Duration::from_millis(1500));

        let numeric: Wrapper = toml::from_str("grace = 7").unwrap();
        assert_eq!(numeric.grace, Duration::from_secs(7));
    }

    #[test]
    fn test_rejects_garbage() {
        let result: Result<Wrapper, _> = toml::from_str("grace = \"soon\"");
        assert!(result.is_err());

        let negative: Result<Wrapper, _> = toml::from_str("grace = -3");
        assert!(negative.is_err());
    }

    #[test]
    fn test_serializes_as_string() {
        let out = toml::to_string(&Wrapper { grace: Duration::from_secs(5) }).unwrap();
        assert_eq!(out.trim(), "grace = \"5s\"");
    }
}
