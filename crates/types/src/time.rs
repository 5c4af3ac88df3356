//! Serde helpers for simulated time.
//!
//! Configuration files express time in fractional time-units; one unit maps
//! to one second of [`Duration`].

use serde::{Deserialize, Deserializer};
use std::time::Duration;

fn from_units<E: serde::de::Error>(units: f64) -> Result<Duration, E> {
    Duration::try_from_secs_f64(units)
        .map_err(|_| E::custom(format!("invalid simulated time {units}")))
}

/// Deserialize a [`Duration`] from a number of time-units.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    from_units(f64::deserialize(deserializer)?)
}

/// `Option<Duration>` variant; use with `#[serde(default, with = "...")]`.
pub mod option {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<f64>::deserialize(deserializer)? {
            Some(units) => from_units(units).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Deserialize)]
    struct Window {
        #[serde(deserialize_with = "crate::time::deserialize")]
        start: Duration,
        #[serde(default, deserialize_with = "crate::time::option::deserialize")]
        stop: Option<Duration>,
    }

    #[test]
    fn test_fractional_units() {
        let w: Window = toml::from_str("start = 0.5\nstop = 2").unwrap();
        assert_eq!(w.start, Duration::from_millis(500));
        assert_eq!(w.stop, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_negative_time_rejected() {
        assert!(toml::from_str::<Window>("start = -1.0").is_err());
    }

    #[test]
    fn test_stop_defaults_to_none() {
        let w: Window = toml::from_str("start = 3").unwrap();
        assert_eq!(w.stop, None);
    }
}
