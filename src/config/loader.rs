use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{CoreError, Result};

/// Load a [`Config`] from a TOML document at `path`, then validate it.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
    let text = fs::read_to_string(path)
        .map_err(|e| CoreError::Config(format!("failed to read config file: {e}")))?;
    let cfg: Config =
        toml::from_str(&text).map_err(|e| CoreError::Config(format!("failed to parse config: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_validates_a_minimal_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [ring]
            capacity = 131072
            high_water_frac = 0.8

            [session]
            idle_timeout_secs = 60
            "#
        )
        .unwrap();

        let cfg = load_from_path(file.path()).expect("valid document should load");
        assert_eq!(cfg.ring.capacity, 131072);
        assert_eq!(cfg.ring.high_water_frac, 0.8);
        assert_eq!(cfg.session.idle_timeout_secs, 60);
        assert_eq!(cfg.event_channel_depth, 4096);
    }

    #[test]
    fn rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml {{{{").unwrap();
        assert!(load_from_path(file.path()).is_err());
    }

    #[test]
    fn rejects_missing_file() {
        assert!(load_from_path("/nonexistent/path/config.toml").is_err());
    }

    #[test]
    fn propagates_cross_field_validation_failures() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [ring]
            capacity = 1024
            "#
        )
        .unwrap();
        assert!(load_from_path(file.path()).is_err());
    }
}
