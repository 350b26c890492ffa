//! Configuration – reads `~/.adscollect/config.toml` into flat lookup keys.
//!
//! The TOML document is flattened into colon-separated keys: tables by name,
//! arrays by position.  Both of these produce `Keys:0`, `Keys:1`, `Keys:2`:
//!
//! ```toml
//! AmsNetId = "5.12.34.56.1.1"
//! Keys = ["MAIN.counter", "", "MAIN.speed"]
//! ```
//!
//! ```toml
//! [Keys]
//! 0 = "MAIN.counter"
//! 1 = ""
//! 2 = "MAIN.speed"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use adscollect_types::{AmsNetId, CollectorError, ConfigSource};

const NET_ID_KEY: &str = "AmsNetId";
const NET_ID_ENV: &str = "ADSCOLLECT_AMS_NET_ID";
const KEYS_ENV_PREFIX: &str = "ADSCOLLECT_KEYS__";

/// Flattened configuration values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    values: BTreeMap<String, String>,
}

impl ConfigSource for Config {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

impl Config {
    /// Parse and flatten a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, CollectorError> {
        let table: toml::Table = toml::from_str(raw)
            .map_err(|e| CollectorError::Config(format!("Failed to parse config: {e}")))?;
        let mut values = BTreeMap::new();
        for (key, value) in &table {
            flatten(key, value, &mut values);
        }
        Ok(Self { values })
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// The configured device identifier, defaulting to the local device.
    pub fn ams_net_id(&self) -> Result<AmsNetId, CollectorError> {
        AmsNetId::from_config(self.get(NET_ID_KEY).as_deref())
    }
}

fn flatten(prefix: &str, value: &toml::Value, out: &mut BTreeMap<String, String>) {
    match value {
        toml::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        toml::Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten(&format!("{prefix}:{i}"), item, out);
            }
        }
        toml::Value::Table(table) => {
            for (key, item) in table {
                flatten(&format!("{prefix}:{key}"), item, out);
            }
        }
        scalar => {
            out.insert(prefix.to_string(), scalar.to_string());
        }
    }
}

/// Return the config path: `$ADSCOLLECT_CONFIG`, else
/// `~/.adscollect/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(explicit) = std::env::var("ADSCOLLECT_CONFIG") {
        return PathBuf::from(explicit);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".adscollect").join("config.toml")
}

/// Load the config at `path` and apply environment overrides.  A missing
/// file yields an empty configuration.
pub fn load_from(path: &Path) -> Result<Config, CollectorError> {
    let mut cfg = if path.exists() {
        let raw = fs::read_to_string(path).map_err(|e| {
            CollectorError::Config(format!("Failed to read config at {}: {e}", path.display()))
        })?;
        Config::from_toml_str(&raw)?
    } else {
        Config::default()
    };
    apply_overrides(&mut cfg, std::env::vars());
    Ok(cfg)
}

/// Apply `ADSCOLLECT_*` overrides from `vars`.
///
/// | Variable | Config key |
/// |---|---|
/// | `ADSCOLLECT_AMS_NET_ID` | `AmsNetId` |
/// | `ADSCOLLECT_KEYS__<n>` | `Keys:<n>` |
pub fn apply_overrides(cfg: &mut Config, vars: impl IntoIterator<Item = (String, String)>) {
    for (name, value) in vars {
        if name == NET_ID_ENV {
            cfg.set(NET_ID_KEY, value);
        } else if let Some(index) = name.strip_prefix(KEYS_ENV_PREFIX)
            && index.parse::<usize>().is_ok()
        {
            cfg.set(format!("Keys:{index}"), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_keys_flatten_by_position() {
        let cfg = Config::from_toml_str(
            r#"
            AmsNetId = "5.12.34.56.1.1"
            Keys = ["TagA", "", "TagB"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.get("Keys:0").as_deref(), Some("TagA"));
        assert_eq!(cfg.get("Keys:1").as_deref(), Some(""));
        assert_eq!(cfg.get("Keys:2").as_deref(), Some("TagB"));
        assert_eq!(cfg.get("Keys:3"), None);
        assert_eq!(
            cfg.ams_net_id().unwrap(),
            AmsNetId::new([5, 12, 34, 56, 1, 1])
        );
    }

    #[test]
    fn table_keys_flatten_by_name_and_keep_gaps() {
        let cfg = Config::from_toml_str(
            r#"
            [Keys]
            0 = "A"
            1 = "B"
            3 = "D"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.get("Keys:1").as_deref(), Some("B"));
        assert_eq!(cfg.get("Keys:2"), None);
        assert_eq!(cfg.get("Keys:3").as_deref(), Some("D"));
    }

    #[test]
    fn nested_tables_and_scalars() {
        let cfg = Config::from_toml_str(
            r#"
            [Device]
            Port = 851
            Options = { Fast = true }
            "#,
        )
        .unwrap();
        assert_eq!(cfg.get("Device:Port").as_deref(), Some("851"));
        assert_eq!(cfg.get("Device:Options:Fast").as_deref(), Some("true"));
    }

    #[test]
    fn missing_or_empty_net_id_is_local() {
        assert_eq!(Config::default().ams_net_id().unwrap(), AmsNetId::LOCAL);
        let cfg = Config::from_toml_str(r#"AmsNetId = """#).unwrap();
        assert_eq!(cfg.ams_net_id().unwrap(), AmsNetId::LOCAL);
    }

    #[test]
    fn invalid_net_id_is_an_error() {
        let cfg = Config::from_toml_str(r#"AmsNetId = "not-an-id""#).unwrap();
        assert!(matches!(cfg.ams_net_id(), Err(CollectorError::InvalidAddress(_))));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = Config::from_toml_str("Keys = [").unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));
    }

    #[test]
    fn overrides_replace_net_id_and_keys() {
        let mut cfg = Config::from_toml_str(r#"Keys = ["A"]"#).unwrap();
        apply_overrides(
            &mut cfg,
            [
                (NET_ID_ENV.to_string(), "10.1.1.1.1.1".to_string()),
                ("ADSCOLLECT_KEYS__0".to_string(), "Z".to_string()),
                ("ADSCOLLECT_KEYS__1".to_string(), "Y".to_string()),
                ("ADSCOLLECT_KEYS__x".to_string(), "ignored".to_string()),
                ("UNRELATED".to_string(), "ignored".to_string()),
            ],
        );
        assert_eq!(cfg.get("Keys:0").as_deref(), Some("Z"));
        assert_eq!(cfg.get("Keys:1").as_deref(), Some("Y"));
        assert_eq!(cfg.get("Keys:x"), None);
        assert_eq!(
            cfg.ams_net_id().unwrap(),
            AmsNetId::new([10, 1, 1, 1, 1, 1])
        );
    }

    #[test]
    fn load_from_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let cfg = load_from(&path).expect("no error");
        assert_eq!(cfg.get("Keys:0"), None);
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "Keys = [\"MAIN.counter\"]\n").expect("write");
        let cfg = load_from(&path).expect("load");
        assert_eq!(cfg.get("Keys:0").as_deref(), Some("MAIN.counter"));
    }

    #[test]
    fn config_path_points_to_adscollect_dir() {
        let p = config_path_for_home("/home/operator");
        assert_eq!(p, PathBuf::from("/home/operator/.adscollect/config.toml"));
    }
}
