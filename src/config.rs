//! User configuration (`config.toml` in the platform config dir).

use directories::ProjectDirs;
use rowcalc_engine::engine::{EvaluatorOptions, OutOfBounds};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576; // 1 MiB

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    /// Sheet CSV files load into and commands run on.
    pub sheet: Option<String>,
    pub row_count: Option<usize>,
    pub column_count: Option<usize>,
    pub out_of_bounds: Option<OutOfBounds>,
    /// Extra Rhai function files, loaded after `default.rhai`.
    pub functions: Vec<PathBuf>,
}

impl Config {
    pub(crate) fn evaluator_options(&self) -> EvaluatorOptions {
        let defaults = EvaluatorOptions::default();
        EvaluatorOptions {
            row_count: self.row_count.unwrap_or(defaults.row_count),
            column_count: self.column_count.unwrap_or(defaults.column_count),
            out_of_bounds: self.out_of_bounds.unwrap_or(defaults.out_of_bounds),
            ..defaults
        }
    }
}

pub(crate) fn config_dir() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "rowcalc")?;
    Some(proj.config_dir().to_path_buf())
}

/// Load `explicit` or the user's `config.toml`. Problems are reported as
/// warnings and fall back to defaults; a missing file is only a warning
/// when it was asked for explicitly.
pub(crate) fn load_config(explicit: Option<&Path>) -> (Config, Vec<String>) {
    let mut warnings = Vec::new();
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config_dir() {
            Some(dir) => dir.join("config.toml"),
            None => return (Config::default(), warnings),
        },
    };

    if !path.exists() {
        if explicit.is_some() {
            warnings.push(format!("Config file not found: {}", path.display()));
        }
        return (Config::default(), warnings);
    }

    let config = match std::fs::metadata(&path) {
        Ok(meta) if meta.len() > MAX_CONFIG_FILE_BYTES => {
            warnings.push(format!(
                "Refusing to read {}: file too large ({} bytes, max {})",
                path.display(),
                meta.len(),
                MAX_CONFIG_FILE_BYTES
            ));
            None
        }
        Ok(_) => match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<Config>(&content) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    warnings.push(format!("Failed to parse {}: {}", path.display(), err));
                    None
                }
            },
            Err(err) => {
                warnings.push(format!("Failed to read {}: {}", path.display(), err));
                None
            }
        },
        Err(err) => {
            warnings.push(format!(
                "Failed to read metadata for {}: {}",
                path.display(),
                err
            ));
            None
        }
    };
    (config.unwrap_or_default(), warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempConfig(PathBuf);

    impl TempConfig {
        fn new(name: &str, content: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "rowcalc_config_{}_{}.toml",
                std::process::id(),
                name
            ));
            std::fs::write(&path, content).unwrap();
            TempConfig(path)
        }
    }

    impl Drop for TempConfig {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn test_parse_config() {
        let file = TempConfig::new(
            "full",
            "sheet = \"Data\"\nrow_count = 50\nout_of_bounds = \"error\"\nfunctions = [\"a.rhai\"]\n",
        );
        let (config, warnings) = load_config(Some(&file.0));
        assert!(warnings.is_empty());
        assert_eq!(config.sheet.as_deref(), Some("Data"));
        assert_eq!(config.functions, vec![PathBuf::from("a.rhai")]);

        let options = config.evaluator_options();
        assert_eq!(options.row_count, 50);
        assert_eq!(options.column_count, EvaluatorOptions::default().column_count);
        assert_eq!(options.out_of_bounds, OutOfBounds::Error);
    }

    #[test]
    fn test_unknown_field_warns() {
        let file = TempConfig::new("unknown", "colour = \"red\"\n");
        let (config, warnings) = load_config(Some(&file.0));
        assert_eq!(config, Config::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Failed to parse"));
    }

    #[test]
    fn test_missing_explicit_file_warns() {
        let (config, warnings) = load_config(Some(Path::new("/nonexistent/rowcalc.toml")));
        assert_eq!(config, Config::default());
        assert_eq!(warnings.len(), 1);
    }
}
