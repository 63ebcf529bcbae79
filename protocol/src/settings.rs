//! Settings record and its TOML loader.
//!
//! Splits required keys from defaulted ones and validates the whole
//! record once at construction instead of checking fields ad hoc.

use std::path::Path;

use serde::Deserialize;

use crate::addr::Endpoint;
use crate::error::{GossipError, Result};

/// Raw, unvalidated shape of the TOML settings file.
#[derive(Debug, Deserialize)]
struct RawSettings {
    cache_size: usize,
    degree: usize,
    min_connections: usize,
    max_connections: usize,
    search_cooldown: u64,
    challenge_cooldown: u64,
    bootstrapper: String,
    p2p_address: String,
    api_address: String,
    #[serde(default)]
    known_peers: Vec<String>,
}

/// The validated, immutable settings record.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache_size: usize,
    pub degree: usize,
    pub min_connections: usize,
    pub max_connections: usize,
    pub max_push: usize,
    pub max_pull: usize,
    pub search_cooldown: u64,
    pub challenge_cooldown: u64,
    pub bootstrapper: Endpoint,
    pub p2p_address: Endpoint,
    pub api_address: Endpoint,
    pub known_peers: Vec<Endpoint>,
}

impl Settings {
    /// Loads and validates a settings record from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GossipError::ConfigInvalid(format!("reading {:?}: {e}", path)))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawSettings = toml::from_str(text)
            .map_err(|e| GossipError::ConfigInvalid(format!("parsing toml: {e}")))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self> {
        if raw.cache_size < 1 {
            return Err(GossipError::ConfigInvalid(
                "cache_size must be >= 1".into(),
            ));
        }
        if raw.degree < 1 {
            return Err(GossipError::ConfigInvalid("degree must be >= 1".into()));
        }
        if raw.max_connections < 2 {
            return Err(GossipError::ConfigInvalid(
                "max_connections must be >= 2".into(),
            ));
        }
        if raw.max_connections < raw.min_connections {
            return Err(GossipError::ConfigInvalid(
                "max_connections must be >= min_connections".into(),
            ));
        }
        if raw.search_cooldown == 0 {
            return Err(GossipError::ConfigInvalid(
                "search_cooldown must be > 0".into(),
            ));
        }
        if raw.challenge_cooldown == 0 {
            return Err(GossipError::ConfigInvalid(
                "challenge_cooldown must be > 0".into(),
            ));
        }

        let bootstrapper: Endpoint = raw.bootstrapper.parse().map_err(|e| {
            GossipError::ConfigInvalid(format!("bootstrapper: {e}"))
        })?;
        let p2p_address: Endpoint = raw.p2p_address.parse().map_err(|e| {
            GossipError::ConfigInvalid(format!("p2p_address: {e}"))
        })?;
        let api_address: Endpoint = raw.api_address.parse().map_err(|e| {
            GossipError::ConfigInvalid(format!("api_address: {e}"))
        })?;

        let mut known_peers = Vec::with_capacity(raw.known_peers.len());
        for p in &raw.known_peers {
            let ep: Endpoint = p
                .parse()
                .map_err(|e| GossipError::ConfigInvalid(format!("known_peers: {e}")))?;
            if known_peers.contains(&ep) {
                return Err(GossipError::ConfigInvalid(format!(
                    "known_peers contains duplicate address {p}"
                )));
            }
            known_peers.push(ep);
        }

        let max_push = raw.max_connections / 2;
        let max_pull = raw.max_connections - max_push;

        Ok(Settings {
            cache_size: raw.cache_size,
            degree: raw.degree,
            min_connections: raw.min_connections,
            max_connections: raw.max_connections,
            max_push,
            max_pull,
            search_cooldown: raw.search_cooldown,
            challenge_cooldown: raw.challenge_cooldown,
            bootstrapper,
            p2p_address,
            api_address,
            known_peers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        cache_size = 8
        degree = 2
        min_connections = 2
        max_connections = 4
        search_cooldown = 30
        challenge_cooldown = 10
        bootstrapper = "1.2.3.4:9000"
        p2p_address = "0.0.0.0:9000"
        api_address = "0.0.0.0:9001"
        known_peers = ["5.6.7.8:9000"]
    "#;

    #[test]
    fn loads_valid_settings() {
        let s = Settings::from_toml_str(VALID).unwrap();
        assert_eq!(s.max_push, 2);
        assert_eq!(s.max_pull, 2);
        assert_eq!(s.known_peers.len(), 1);
    }

    #[test]
    fn splits_odd_max_connections_favoring_pull() {
        let s = Settings::from_toml_str(
            &VALID.replace("max_connections = 4", "max_connections = 5"),
        )
        .unwrap();
        assert_eq!(s.max_push, 2);
        assert_eq!(s.max_pull, 3);
    }

    #[test]
    fn rejects_max_below_min() {
        let text = VALID
            .replace("min_connections = 2", "min_connections = 10")
            .replace("max_connections = 4", "max_connections = 4");
        assert!(Settings::from_toml_str(&text).is_err());
    }

    #[test]
    fn rejects_duplicate_known_peers() {
        let text = VALID.replace(
            r#"known_peers = ["5.6.7.8:9000"]"#,
            r#"known_peers = ["5.6.7.8:9000", "5.6.7.8:9000"]"#,
        );
        assert!(Settings::from_toml_str(&text).is_err());
    }

    #[test]
    fn rejects_zero_cache_size() {
        let text = VALID.replace("cache_size = 8", "cache_size = 0");
        assert!(Settings::from_toml_str(&text).is_err());
    }
}
