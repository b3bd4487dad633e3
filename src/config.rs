use serde::Deserialize;
use std::{
    env, fs, io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::{pipeline::TreeParams, store::DEFAULT_MODEL_PATH};

pub const DEFAULT_DATA_PATH: &str = "../data/parking_lot_simulation_data.csv";
pub const DEFAULT_PORT: u16 = 5002;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrainConfig {
    pub data_path: PathBuf,
    pub model_path: PathBuf,
    pub test_fraction: f64,
    pub seed: u64,
    pub max_depth: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            test_fraction: 0.2,
            seed: 42,
            max_depth: 10,
        }
    }
}

impl TrainConfig {
    /// Reads a JSON file; omitted keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `TRAIN_CONFIG` names an optional JSON file; `DATA_PATH` and
    /// `MODEL_PATH` override whatever it says.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = match var("TRAIN_CONFIG") {
            Some(p) => Self::load(Path::new(&p))?,
            None => Self::default(),
        };
        if let Some(p) = var("DATA_PATH") {
            cfg.data_path = p.into();
        }
        if let Some(p) = var("MODEL_PATH") {
            cfg.model_path = p.into();
        }
        Ok(cfg)
    }

    pub fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            seed: self.seed,
            ..TreeParams::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub model_path: PathBuf,
    pub bind_addr: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Reads `MODEL_PATH`, `BIND_ADDR` and `PORT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(p) = var("MODEL_PATH") {
            cfg.model_path = p.into();
        }
        if let Some(v) = var("BIND_ADDR") {
            cfg.bind_addr = v.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "BIND_ADDR",
                value: v.clone(),
            })?;
        }
        if let Some(v) = var("PORT") {
            cfg.port = v.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "PORT",
                value: v.clone(),
            })?;
        }
        Ok(cfg)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_the_reference_service() {
        let s = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s.socket_addr().to_string(), "0.0.0.0:5002");
        assert_eq!(s.model_path, PathBuf::from("models/overstay_model.bin"));

        let t = TrainConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(t, TrainConfig::default());
        assert_eq!(t.tree_params(), TreeParams::default());
    }

    #[test]
    fn env_overrides_apply() {
        let s = ServerConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("BIND_ADDR", "127.0.0.1"),
            ("MODEL_PATH", "/tmp/m.bin"),
        ]))
        .unwrap();
        assert_eq!(s.socket_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(s.model_path, PathBuf::from("/tmp/m.bin"));
    }

    #[test]
    fn bad_port_is_reported() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "PORT", .. }));
    }

    #[test]
    fn train_config_file_with_env_override() {
        let mut f = NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut f,
            br#"{"data_path": "events.csv", "max_depth": 4, "seed": 7}"#,
        )
        .unwrap();
        let path = f.path().to_str().unwrap().to_string();
        let cfg = TrainConfig::from_lookup(lookup(&[
            ("TRAIN_CONFIG", path.as_str()),
            ("MODEL_PATH", "out/model.bin"),
        ]))
        .unwrap();
        assert_eq!(cfg.data_path, PathBuf::from("events.csv"));
        assert_eq!(cfg.model_path, PathBuf::from("out/model.bin"));
        assert_eq!(cfg.test_fraction, 0.2);
        assert_eq!(cfg.tree_params().max_depth, 4);
        assert_eq!(cfg.tree_params().seed, 7);
    }

    #[test]
    fn unreadable_config_file_is_an_error() {
        let err = TrainConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
