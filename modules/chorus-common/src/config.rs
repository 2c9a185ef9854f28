use std::env;
use std::str::FromStr;

use thiserror::Error;
use tracing::info;

use crate::types::ActorIdentity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

/// How the busy indicator treats overlapping commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyMode {
    /// One shared flag: set on issue, cleared by whichever command finishes
    /// first, even if others are still in flight.
    #[default]
    Legacy,
    /// In-flight counter: busy while any command is outstanding.
    Counted,
}

impl FromStr for BusyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "flag" => Ok(BusyMode::Legacy),
            "counted" | "counter" => Ok(BusyMode::Counted),
            _ => Err(ConfigError::Invalid {
                key: "CHORUS_BUSY_MODE",
                value: s.to_string(),
            }),
        }
    }
}

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Posts API
    pub api_url: String,
    pub api_token: String,
    pub timeout_secs: u64,

    // Push channel
    pub group_id: String,

    // Local actor
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
    pub actor_id: Option<String>,

    pub busy_mode: BusyMode,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup. `from_env` is
    /// this over the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout_secs = match optional("CHORUS_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "CHORUS_TIMEOUT_SECS",
                value: raw,
            })?,
            None => 30,
        };

        let busy_mode = match optional("CHORUS_BUSY_MODE") {
            Some(raw) => raw.parse()?,
            None => BusyMode::default(),
        };

        Ok(Self {
            api_url: required("CHORUS_API_URL")?,
            api_token: required("CHORUS_API_TOKEN")?,
            timeout_secs,
            group_id: required("CHORUS_GROUP_ID")?,
            first_name: required("CHORUS_FIRST_NAME")?,
            last_name: required("CHORUS_LAST_NAME")?,
            avatar_url: optional("CHORUS_AVATAR_URL"),
            actor_id: optional("CHORUS_ACTOR_ID"),
            busy_mode,
        })
    }

    /// The local actor as described by this config.
    pub fn identity(&self) -> ActorIdentity {
        let mut identity = ActorIdentity::new(&self.first_name, &self.last_name);
        if let Some(ref id) = self.actor_id {
            identity = identity.with_id(id);
        }
        if let Some(ref url) = self.avatar_url {
            identity = identity.with_avatar(url);
        }
        identity
    }

    /// Log the effective configuration without the API token.
    pub fn log_redacted(&self) {
        info!(
            api_url = %self.api_url,
            api_token = redact(&self.api_token),
            group_id = %self.group_id,
            actor = %self.identity(),
            actor_id = self.actor_id.as_deref().unwrap_or("-"),
            busy_mode = ?self.busy_mode,
            timeout_secs = self.timeout_secs,
            "Loaded config"
        );
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "(empty)"
    } else {
        "****"
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

    const BASE: &[(&str, &str)] = &[
        ("CHORUS_API_URL", "https://feed.example.com/api/posts"),
        ("CHORUS_API_TOKEN", "secret"),
        ("CHORUS_GROUP_ID", "group-1"),
        ("CHORUS_FIRST_NAME", "Ada"),
        ("CHORUS_LAST_NAME", "Byron"),
    ];

    #[test]
    fn loads_required_with_defaults() {
        let config = Config::from_lookup(lookup(BASE)).unwrap();

        assert_eq!(config.group_id, "group-1");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.busy_mode, BusyMode::Legacy);
        assert_eq!(config.identity(), ActorIdentity::new("Ada", "Byron"));
    }

    #[test]
    fn missing_required_is_reported_by_name() {
        let pairs: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "CHORUS_GROUP_ID")
            .collect();
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("CHORUS_GROUP_ID"));
    }

    #[test]
    fn optional_values_are_parsed() {
        let mut pairs = BASE.to_vec();
        pairs.push(("CHORUS_BUSY_MODE", "counted"));
        pairs.push(("CHORUS_TIMEOUT_SECS", "5"));
        pairs.push(("CHORUS_ACTOR_ID", "u-1"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.busy_mode, BusyMode::Counted);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.identity().id.as_deref(), Some("u-1"));
    }

    #[test]
    fn bad_busy_mode_is_invalid() {
        let mut pairs = BASE.to_vec();
        pairs.push(("CHORUS_BUSY_MODE", "sometimes"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { key: "CHORUS_BUSY_MODE", .. })
        ));
    }
}
