use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Line-based `key: value1 value2 …` config file, matching the original
/// tool's `Config::parse` exactly: blank lines and lines starting with `#`
/// are skipped, the rest is whitespace-split with the first token's
/// trailing `:` stripped to get the key.
#[derive(Debug, Default, Clone)]
pub struct Config {
    values: HashMap<String, Vec<String>>,
}

impl Config {
    pub fn parse(path: &Path) -> Config {
        let mut config = Config::default();

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!("could not open config {}: {err}", path.display());
                return config;
            }
        };

        for line in contents.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut tokens: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
            if tokens.is_empty() {
                continue;
            }

            let key = tokens.remove(0).trim_end_matches(':').to_string();
            tracing::debug!("set key {key} to value {:?}", tokens);
            config.values.insert(key, tokens.into_iter().map(String::from).collect());
        }

        config
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .and_then(|tokens| tokens.first())
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_u16(&self, key: &str, default: u16) -> u16 {
        self.values
            .get(key)
            .and_then(|tokens| tokens.first())
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        self.values
            .get(key)
            .and_then(|tokens| tokens.first())
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(|tokens| tokens.first())
            .map(|v| matches!(v.as_str(), "true" | "1" | "yes"))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_keys_and_skips_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# a comment").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "host: example.com").unwrap();
        writeln!(file, "port: 12345").unwrap();
        writeln!(file, "direct: false").unwrap();
        file.flush().unwrap();

        let config = Config::parse(file.path());
        assert_eq!(config.get_string("host", "localhost"), "example.com");
        assert_eq!(config.get_u16("port", 12000), 12345);
        assert!(!config.get_bool("direct", true));
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = Config::parse(Path::new("/nonexistent/path/to/config"));
        assert_eq!(config.get_string("host", "localhost"), "localhost");
        assert_eq!(config.get_u16("port", 12000), 12000);
        assert!(config.get_bool("direct", true));
        assert!(!config.has("output_folder"));
    }
}
