use std::env;
use std::str::FromStr;

use thiserror::Error;

use crate::risk::{AlertThresholds, MAX_STREAK_WINDOW_DAYS};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVariable(String),
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
    pub thresholds: AlertThresholds,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVariable("DATABASE_URL".to_string()))?;

        if !database_url.starts_with("postgres://") && !database_url.starts_with("postgresql://") {
            return Err(ConfigError::InvalidValue {
                name: "DATABASE_URL".to_string(),
                value: database_url,
            });
        }

        let defaults = AlertThresholds::default();
        let thresholds = AlertThresholds {
            low_rate: parse_or(&lookup, "ATTENDANCE_LOW_THRESHOLD", defaults.low_rate)?,
            high_severity_rate: parse_or(
                &lookup,
                "ATTENDANCE_HIGH_SEVERITY_THRESHOLD",
                defaults.high_severity_rate,
            )?,
            absence_streak: parse_or(
                &lookup,
                "ATTENDANCE_STREAK_THRESHOLD",
                defaults.absence_streak,
            )?,
            streak_window_days: parse_or(
                &lookup,
                "ATTENDANCE_STREAK_WINDOW_DAYS",
                defaults.streak_window_days,
            )?,
        };

        if !(0..=MAX_STREAK_WINDOW_DAYS).contains(&thresholds.streak_window_days) {
            return Err(ConfigError::InvalidValue {
                name: "ATTENDANCE_STREAK_WINDOW_DAYS".to_string(),
                value: thresholds.streak_window_days.to_string(),
            });
        }

        if thresholds.high_severity_rate > thresholds.low_rate {
            log::warn!(
                "high severity threshold {} is above the low attendance threshold {}; every alert will be high",
                thresholds.high_severity_rate,
                thresholds.low_rate
            );
        }

        Ok(Settings {
            database_url,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            thresholds,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_url_is_set() {
        let settings =
            Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/school")]))
                .unwrap();
        assert_eq!(settings.max_connections, 5);
        assert_eq!(settings.thresholds, AlertThresholds::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgresql://db/school"),
            ("ATTENDANCE_LOW_THRESHOLD", "80"),
            ("ATTENDANCE_STREAK_THRESHOLD", " 4 "),
            ("DB_MAX_CONNECTIONS", "12"),
        ]))
        .unwrap();
        assert_eq!(settings.thresholds.low_rate, 80.0);
        assert_eq!(settings.thresholds.absence_streak, 4);
        assert_eq!(settings.thresholds.high_severity_rate, 60.0);
        assert_eq!(settings.max_connections, 12);
    }

    #[test]
    fn missing_url_is_reported() {
        let err = Settings::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingVariable("DATABASE_URL".into()));
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let err = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/school"),
            ("ATTENDANCE_STREAK_WINDOW_DAYS", "two weeks"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "ATTENDANCE_STREAK_WINDOW_DAYS"));
    }

    #[test]
    fn streak_window_must_stay_within_a_year() {
        for raw in ["-1", "367", "4611686018427387903"] {
            let err = Settings::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://localhost/school"),
                ("ATTENDANCE_STREAK_WINDOW_DAYS", raw),
            ]))
            .unwrap_err();
            assert_eq!(
                err,
                ConfigError::InvalidValue {
                    name: "ATTENDANCE_STREAK_WINDOW_DAYS".into(),
                    value: raw.into(),
                }
            );
        }

        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/school"),
            ("ATTENDANCE_STREAK_WINDOW_DAYS", "366"),
        ]))
        .unwrap();
        assert_eq!(settings.thresholds.streak_window_days, 366);
    }
}
