use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct OracleSettings {
    #[serde(default = "default_valgrind_path")]
    pub valgrind_path: String,
    /// Bounded wait per measurement in milliseconds; omit to wait forever.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_valgrind_path() -> String {
    "valgrind".to_string()
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            valgrind_path: default_valgrind_path(),
            timeout_ms: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SearchSettings {
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub charset: u32,
}

pub fn default_max_length() -> usize {
    35
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            charset: 0,
        }
    }
}

/// File-backed defaults for a run; CLI flags override individual fields.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CountcrackConfig {
    #[serde(default)]
    pub oracle: OracleSettings,
    #[serde(default)]
    pub search: SearchSettings,
}

impl CountcrackConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: CountcrackConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config: CountcrackConfig = toml::from_str("").unwrap();
        assert_eq!(config.oracle.valgrind_path, "valgrind");
        assert_eq!(config.oracle.timeout_ms, None);
        assert_eq!(config.search.max_length, 35);
        assert_eq!(config.search.charset, 0);
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let config: CountcrackConfig = toml::from_str(
            "[oracle]\n\
             timeout-ms = 5000\n\
             [search]\n\
             charset = 3\n",
        )
        .unwrap();
        assert_eq!(config.oracle.valgrind_path, "valgrind");
        assert_eq!(config.oracle.timeout_ms, Some(5000));
        assert_eq!(config.search.max_length, 35);
        assert_eq!(config.search.charset, 3);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<CountcrackConfig, _> = toml::from_str("[oracle]\nthreads = 4\n");
        assert!(result.is_err());
    }

    #[test]
    fn load_from_file_round_trips() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[oracle]\nvalgrind-path = \"/opt/valgrind/bin/valgrind\"\n"
        )
        .unwrap();
        let config = CountcrackConfig::load_from_file(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.oracle.valgrind_path, "/opt/valgrind/bin/valgrind");
    }

    #[test]
    fn load_from_missing_file_is_an_error() {
        let missing = PathBuf::from("/definitely/not/a/real/config.toml");
        assert!(CountcrackConfig::load_from_file(&missing).is_err());
    }
}
