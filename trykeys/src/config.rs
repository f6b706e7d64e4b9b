use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG: &str = "trykeys.json";
pub const DEFAULT_PORT: u16 = 23;
pub const DEFAULT_USERNAME: &str = "root";
pub const DEFAULT_PASSWORD: &str = "eevblog";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Key File not specified in configuration file")]
    MissingKeyFile,
    #[error("Key File not found (wrong file specified in configuration file?): {0}")]
    KeyFileNotFound(PathBuf),
    #[error("Invalid telnet IP address specified in configuration file")]
    MissingScopeIp,
    #[error("Invalid telnet port specified in configuration file: {0}")]
    InvalidPort(String),
    #[error("Invalid bandwidth flag specified in configuration file: {0}")]
    InvalidBandwidthFlag(String),
    #[error("Invalid maximum bandwidth specified in configuration file: {0}")]
    InvalidMaxBandwidth(String),
}

/// A scalar that may be written as a JSON string or a bare number/bool.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Scalar {
    fn text(&self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Text(s) => s.trim().to_string(),
        }
    }
}

/// Configuration file as written; every key optional until validated.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct RawConfig {
    pub keyfile: Option<String>,
    pub scopeip: Option<String>,
    pub port: Option<Scalar>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bandwidth: Option<Scalar>,
    pub maxbandwidth: Option<Scalar>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub key_file: PathBuf,
    pub scope_ip: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Target bandwidth in MHz when the bandwidth search is enabled.
    pub max_bandwidth: Option<u32>,
}

/// Load and validate the configuration. Without a path, `./trykeys.json` is used.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let raw = load_config(&path)?;
    raw.validate()
}

pub fn load_config(path: &Path) -> Result<RawConfig, ConfigError> {
    let s = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"));
    let parsed = if is_yaml {
        serde_yaml::from_str(&s).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&s).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| ConfigError::Parse { path: path.to_path_buf(), message })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

impl RawConfig {
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let key_file = PathBuf::from(non_empty(&self.keyfile).ok_or(ConfigError::MissingKeyFile)?);
        if !key_file.is_file() {
            return Err(ConfigError::KeyFileNotFound(key_file));
        }

        let max_bandwidth = if self.bandwidth_enabled()? {
            let text = self.maxbandwidth.as_ref().map(Scalar::text).unwrap_or_default();
            match text.parse::<u32>() {
                Ok(v) if v > 0 => Some(v),
                _ => return Err(ConfigError::InvalidMaxBandwidth(text)),
            }
        } else {
            None
        };

        let scope_ip = non_empty(&self.scopeip).ok_or(ConfigError::MissingScopeIp)?;

        let port = match self.port.as_ref().map(Scalar::text).filter(|s| !s.is_empty()) {
            None => DEFAULT_PORT,
            Some(text) => match text.parse::<u16>() {
                Ok(p) if p > 0 => p,
                _ => return Err(ConfigError::InvalidPort(text)),
            },
        };

        Ok(Settings {
            key_file,
            scope_ip,
            port,
            username: non_empty(&self.username).unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password: non_empty(&self.password).unwrap_or_else(|| DEFAULT_PASSWORD.to_string()),
            max_bandwidth,
        })
    }

    fn bandwidth_enabled(&self) -> Result<bool, ConfigError> {
        match &self.bandwidth {
            None => Ok(false),
            Some(Scalar::Bool(b)) => Ok(*b),
            Some(other) => match other.text().to_lowercase().as_str() {
                "true" => Ok(true),
                "false" | "" => Ok(false),
                _ => Err(ConfigError::InvalidBandwidthFlag(other.text())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn key_file() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "0123456789ABCDEF").unwrap();
        f
    }

    fn raw(keyfile: &Path) -> RawConfig {
        RawConfig {
            keyfile: Some(keyfile.display().to_string()),
            scopeip: Some("192.168.1.50".into()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_fill_in() {
        let keys = key_file();
        let s = raw(keys.path()).validate().unwrap();
        assert_eq!(s.port, 23);
        assert_eq!(s.username, "root");
        assert_eq!(s.password, "eevblog");
        assert_eq!(s.max_bandwidth, None);
    }

    #[test]
    fn quoted_scalar_values() {
        let keys = key_file();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trykeys.json");
        let body = serde_json::json!({
            "keyfile": keys.path().display().to_string(),
            "scopeip": "10.0.0.7",
            "port": "2323",
            "username": "",
            "password": "secret",
            "bandwidth": "true",
            "maxbandwidth": "200"
        });
        fs::write(&path, body.to_string()).unwrap();
        let s = load_settings(Some(&path)).unwrap();
        assert_eq!(s.port, 2323);
        assert_eq!(s.username, "root");
        assert_eq!(s.password, "secret");
        assert_eq!(s.max_bandwidth, Some(200));
    }

    #[test]
    fn yaml_config() {
        let keys = key_file();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trykeys.yaml");
        let body = format!(
            "keyfile: {}\nscopeip: 10.0.0.7\nport: 23\nbandwidth: true\nmaxbandwidth: 100\n",
            keys.path().display()
        );
        fs::write(&path, body).unwrap();
        let s = load_settings(Some(&path)).unwrap();
        assert_eq!(s.max_bandwidth, Some(100));
    }

    #[test]
    fn missing_key_file_is_fatal() {
        let mut cfg = raw(Path::new("/definitely/not/here.txt"));
        assert!(matches!(cfg.validate(), Err(ConfigError::KeyFileNotFound(_))));
        cfg.keyfile = Some("  ".into());
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingKeyFile)));
    }

    #[test]
    fn invalid_fields_are_fatal() {
        let keys = key_file();
        let mut cfg = raw(keys.path());
        cfg.port = Some(Scalar::Text("telnet".into()));
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPort(_))));

        let mut cfg = raw(keys.path());
        cfg.scopeip = Some(String::new());
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingScopeIp)));

        let mut cfg = raw(keys.path());
        cfg.bandwidth = Some(Scalar::Bool(true));
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidMaxBandwidth(_))));
        cfg.maxbandwidth = Some(Scalar::Text("lots".into()));
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidMaxBandwidth(_))));
        cfg.maxbandwidth = Some(Scalar::Int(200));
        assert_eq!(cfg.validate().unwrap().max_bandwidth, Some(200));
    }
}
