//! Shared CLI helpers used across multiple commands.

use anyhow::Context;
use livefx_core::{EngineConfig, EngineError, ParameterDescriptor, codegen, parse_descriptors};
use std::path::{Path, PathBuf};

/// Parse a `key=value` string for clap's `value_parser`.
pub fn parse_key_val(s: &str) -> Result<(String, f32), String> {
    let Some((key, value)) = s.split_once('=') else {
        return Err(format!(
            "Invalid parameter format: '{}' (expected key=value)",
            s
        ));
    };
    let value = value
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("Invalid value for '{}': {}", key, e))?;
    Ok((key.trim().to_string(), value))
}

/// Engine settings from `path`, or the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => {
            let config = EngineConfig::load(path)?;
            tracing::debug!(path = %path.display(), "engine config loaded");
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

/// User code plus its parameter declarations, as read from disk.
#[derive(Debug, Clone)]
pub struct UserCode {
    /// Where the code came from.
    pub path: PathBuf,
    /// The per-sample statement text.
    pub code: String,
    /// Declared parameters, with command-line overrides applied.
    pub params: Vec<ParameterDescriptor>,
}

impl UserCode {
    /// Reads the code file and the optional JSON parameter file, then applies
    /// `key=value` overrides to the parameter defaults.
    pub fn load(
        code_path: &Path,
        params_path: Option<&Path>,
        overrides: &[(String, f32)],
    ) -> anyhow::Result<Self> {
        let code = std::fs::read_to_string(code_path)
            .with_context(|| format!("reading code from {}", code_path.display()))?;
        let mut params = match params_path {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading parameters from {}", path.display()))?;
                parse_descriptors(&json)
                    .with_context(|| format!("parsing parameters in {}", path.display()))?
            }
            None => Vec::new(),
        };
        apply_overrides(&mut params, overrides)?;
        Ok(Self {
            path: code_path.to_path_buf(),
            code,
            params,
        })
    }
}

/// Replaces the default of each named parameter.
pub fn apply_overrides(
    params: &mut [ParameterDescriptor],
    overrides: &[(String, f32)],
) -> anyhow::Result<()> {
    for (name, value) in overrides {
        let Some(param) = params.iter_mut().find(|p| &p.name == name) else {
            anyhow::bail!("--param {name}: no parameter named '{name}' is declared");
        };
        param.default_value = *value;
    }
    Ok(())
}

/// A compile error worded for the user, with positions pointing into their code.
pub fn describe_error(err: &EngineError, user: &UserCode) -> String {
    let EngineError::Load(load) = err else {
        return err.to_string();
    };
    match load.position() {
        Some(pos) => match codegen::user_code_line(&user.code, pos.line) {
            Some(line) => format!("{}:{}: {}", user.path.display(), line, load),
            None => format!("{}: {} (in generated scaffolding)", user.path.display(), load),
        },
        None => format!("{}: {}", user.path.display(), load),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livefx_host::{LoadError, Position};

    fn user(code: &str) -> UserCode {
        UserCode {
            path: PathBuf::from("fx.lfx"),
            code: code.to_string(),
            params: vec![ParameterDescriptor::new("gain", 1.0, 0.0, 2.0)],
        }
    }

    #[test]
    fn key_val_parsing() {
        assert_eq!(parse_key_val("gain=0.5"), Ok(("gain".to_string(), 0.5)));
        assert_eq!(parse_key_val(" gain = 2 "), Ok(("gain".to_string(), 2.0)));
        assert!(parse_key_val("gain").is_err());
        assert!(parse_key_val("gain=loud").is_err());
    }

    #[test]
    fn overrides_replace_defaults() {
        let mut u = user("output[i] = input[i]");
        apply_overrides(&mut u.params, &[("gain".into(), 1.5)]).unwrap();
        assert_eq!(u.params[0].default_value, 1.5);
        assert!(apply_overrides(&mut u.params, &[("drive".into(), 1.0)]).is_err());
    }

    #[test]
    fn errors_point_into_user_code() {
        let u = user("let x = 1;\noutput[i] = = x");
        let err = EngineError::Load(LoadError::Syntax {
            pos: Position {
                line: codegen::FIRST_USER_LINE + 1,
                column: 21,
            },
            message: "expected expression".into(),
        });
        let text = describe_error(&err, &u);
        assert!(text.starts_with("fx.lfx:2: "), "{text}");

        let err = EngineError::Load(LoadError::Syntax {
            pos: Position { line: 2, column: 1 },
            message: "expected '}'".into(),
        });
        assert!(describe_error(&err, &u).contains("generated scaffolding"));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(load_config(Some(Path::new("/no/such/livefx.toml"))).is_err());
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
    }
}
