//! YAML config loading. Search order when no path is given: ./config.yaml, then
//! $XDG_CONFIG_HOME/moodle-book-sync/config.yaml (or ~/.config/moodle-book-sync/config.yaml).

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_FILE_NAME: &str = "config.yaml";
const APP_DIR_NAME: &str = "moodle-book-sync";

/// Errors from reading and validating the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No config file found (looked in: {searched}). Pass --config <path>.")]
    NotFound { searched: String },

    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Missing required config value: {0}")]
    MissingValue(String),

    #[error("Duplicate book name '{name}' in config; book names must be unique.")]
    DuplicateBook { name: String },

    #[error("Book '{name}' not found in config.")]
    UnknownBook { name: String },
}

/// Connection settings for the Moodle web-services endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MoodleConfig {
    /// Base URL of the Moodle site, stored without a trailing slash.
    pub url: String,
    /// Web-services token.
    pub token: String,
    /// Request timeout in seconds (default 30).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// HTTP User-Agent header.
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// One book to sync. `name` is the key used by `--book`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookConfig {
    pub book_url: String,
    pub course_url: String,
    pub name: String,
    pub directory: PathBuf,
}

/// Config file contents.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(rename = "Moodle")]
    pub moodle: MoodleConfig,
    #[serde(rename = "Books", default)]
    pub books: Vec<BookConfig>,
}

impl Config {
    /// Load from `path`, or search the default locations when `path` is None.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => find_config()?,
        };
        let s = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
            path: path.clone(),
            source: e,
        })?;
        let config = Self::from_yaml(&s).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.clone(),
                source,
            },
            other => other,
        })?;
        log::debug!(
            "Loaded config from {} ({} book(s))",
            path.display(),
            config.books.len()
        );
        Ok(config)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(s: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(s).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            source: e,
        })?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Look up a book by name.
    pub fn book(&self, name: &str) -> Result<&BookConfig, ConfigError> {
        self.books
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| ConfigError::UnknownBook {
                name: name.to_string(),
            })
    }

    fn normalize(&mut self) {
        self.moodle.url = self.moodle.url.trim().trim_end_matches('/').to_string();
        self.moodle.token = self.moodle.token.trim().to_string();
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.moodle.url.is_empty() {
            return Err(ConfigError::MissingValue("Moodle.url".to_string()));
        }
        if self.moodle.token.is_empty() {
            return Err(ConfigError::MissingValue("Moodle.token".to_string()));
        }
        let mut seen = HashSet::new();
        for (i, book) in self.books.iter().enumerate() {
            let fields = [
                ("name", book.name.trim().is_empty()),
                ("book_url", book.book_url.trim().is_empty()),
                ("course_url", book.course_url.trim().is_empty()),
                ("directory", book.directory.as_os_str().is_empty()),
            ];
            if let Some((field, _)) = fields.iter().find(|(_, empty)| *empty) {
                return Err(ConfigError::MissingValue(format!("Books[{}].{}", i, field)));
            }
            if !seen.insert(book.name.as_str()) {
                return Err(ConfigError::DuplicateBook {
                    name: book.name.clone(),
                });
            }
        }
        Ok(())
    }
}

fn find_config() -> Result<PathBuf, ConfigError> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    if let Some(found) = paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }
    let searched = paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(ConfigError::NotFound { searched })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
Moodle:
  url: https://moodle.example.org/
  token: abc123
Books:
  - name: algebra
    book_url: https://moodle.example.org/mod/book/view.php?id=42
    course_url: https://moodle.example.org/course/view.php?id=7
    directory: books/algebra
  - name: geometry
    book_url: https://moodle.example.org/mod/book/view.php?id=43
    course_url: https://moodle.example.org/course/view.php?id=7
    directory: books/geometry
"#;

    #[test]
    fn parse_full_config() -> Result<(), ConfigError> {
        let c = Config::from_yaml(SAMPLE)?;
        assert_eq!(c.moodle.url, "https://moodle.example.org");
        assert_eq!(c.moodle.token, "abc123");
        assert_eq!(c.moodle.timeout_secs, None);
        assert_eq!(c.books.len(), 2);
        let algebra = c.book("algebra")?;
        assert_eq!(algebra.directory, PathBuf::from("books/algebra"));
        Ok(())
    }

    #[test]
    fn load_twice_yields_equal_config() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        let a = Config::load(Some(f.path())).unwrap();
        let b = Config::load(Some(f.path())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_token_errors() {
        let s = "Moodle:\n  url: https://moodle.example.org\nBooks: []\n";
        assert!(matches!(
            Config::from_yaml(s),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn empty_token_errors() {
        let s = "Moodle:\n  url: https://moodle.example.org\n  token: '  '\n";
        match Config::from_yaml(s) {
            Err(ConfigError::MissingValue(key)) => assert_eq!(key, "Moodle.token"),
            other => panic!("expected MissingValue, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_book_names_error() {
        let s = SAMPLE.replace("name: geometry", "name: algebra");
        match Config::from_yaml(&s) {
            Err(ConfigError::DuplicateBook { name }) => assert_eq!(name, "algebra"),
            other => panic!("expected DuplicateBook, got {:?}", other),
        }
    }

    #[test]
    fn empty_book_field_errors() {
        let s = SAMPLE.replace("directory: books/geometry", "directory: ''");
        match Config::from_yaml(&s) {
            Err(ConfigError::MissingValue(key)) => assert_eq!(key, "Books[1].directory"),
            other => panic!("expected MissingValue, got {:?}", other),
        }
    }

    #[test]
    fn unknown_book_errors() {
        let c = Config::from_yaml(SAMPLE).unwrap();
        assert!(matches!(
            c.book("calculus"),
            Err(ConfigError::UnknownBook { .. })
        ));
    }

    #[test]
    fn books_key_optional() {
        let s = "Moodle:\n  url: https://m.example\n  token: t\n  timeout_secs: 5\n";
        let c = Config::from_yaml(s).unwrap();
        assert!(c.books.is_empty());
        assert_eq!(c.moodle.timeout_secs, Some(5));
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nope.yaml");
        match Config::load(Some(&path)) {
            Err(ConfigError::Read { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected Read error, got {:?}", other),
        }
    }

    #[test]
    fn invalid_yaml_errors() {
        assert!(Config::from_yaml("Moodle: [").is_err());
    }
}
