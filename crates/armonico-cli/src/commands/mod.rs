//! CLI subcommand implementations.

pub mod play;
pub mod render;

use anyhow::Context;
use armonico_core::ParameterStates;
use std::path::Path;

/// Load a TOML preset, or the defaults when no path is given.
pub fn load_params(preset: Option<&Path>) -> anyhow::Result<ParameterStates> {
    let params = match preset {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read preset '{}'", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("failed to parse preset '{}'", path.display()))?
        }
        None => ParameterStates::default(),
    };
    params.validate().context("invalid preset")?;
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_preset_path_is_an_error() {
        let err = load_params(Some(Path::new("/no/such/preset.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read preset"));
    }

    #[test]
    fn no_preset_gives_defaults() {
        let params = load_params(None).unwrap();
        assert_eq!(params, ParameterStates::default());
    }

    #[test]
    fn partial_preset_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gain = 0.5").unwrap();
        let params = load_params(Some(file.path())).unwrap();
        assert_eq!(params.gain, 0.5);
        assert_eq!(params.partial_levels, ParameterStates::default().partial_levels);
    }

    #[test]
    fn invalid_preset_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gain = -2.0").unwrap();
        let err = load_params(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("invalid preset"));
    }
}
