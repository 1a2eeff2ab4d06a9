//! INI file configuration adapter.
//!
//! ```ini
//! [strategy]
//! name = dip buyer
//! aggregation = any
//!
//! [indicator.rsi]
//! type = rsi
//! period = 14
//!
//! [rules]
//! rule1 = rsi < 30
//! ```

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn sections(&self) -> Vec<String> {
        let mut sections = self.config.sections();
        sections.sort();
        sections
    }

    fn keys(&self, section: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .config
            .get_map_ref()
            .get(&section.to_lowercase())
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const STRATEGY: &str = r#"
[strategy]
name = Dip Buyer
min_confidence = 0.5

[indicator.rsi]
type = rsi
period = 14

[indicator.Trend]
type = ema
period = 50

[rules]
rule2 = trend != 'NEUTRAL'
rule1 = rsi < 30
"#;

    #[test]
    fn from_string_parses_config() {
        let adapter = FileConfigAdapter::from_string(STRATEGY).unwrap();
        assert_eq!(
            adapter.get_string("strategy", "name"),
            Some("Dip Buyer".to_string())
        );
        assert_eq!(
            adapter.get_string("rules", "rule2"),
            Some("trend != 'NEUTRAL'".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[strategy]\nname =\n").unwrap();
        assert_eq!(adapter.get_string("strategy", "name"), None);
        assert_eq!(adapter.get_string("strategy", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn sections_are_sorted_and_lowercased() {
        let adapter = FileConfigAdapter::from_string(STRATEGY).unwrap();
        assert_eq!(
            adapter.sections(),
            vec!["indicator.rsi", "indicator.trend", "rules", "strategy"]
        );
    }

    #[test]
    fn keys_are_sorted() {
        let adapter = FileConfigAdapter::from_string(STRATEGY).unwrap();
        assert_eq!(adapter.keys("rules"), vec!["rule1", "rule2"]);
        assert_eq!(adapter.keys("INDICATOR.RSI"), vec!["period", "type"]);
        assert!(adapter.keys("absent").is_empty());
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[strategy]\npreset = rsi_macd\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("strategy", "preset"),
            Some("rsi_macd".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/strategy.ini");
        assert!(result.is_err());
    }
}
