//! Settings loading from configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (deep-merged over the defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `FORME_DEFAULT_STYLE` | `default_style` (empty or `none` disables it) |
//! | `FORME_DEBUG` | `debug` |
//! | `FORME_LOG_LEVEL` | `log_level` |
//! | `FORME_TEMPLATE_DIRS` | `template_dirs` (platform path-separator separated) |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use forme_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/forme.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::FormeError;
use crate::settings::FormeSettings;

/// Loads settings from a TOML string.
///
/// Settings absent from the TOML keep their default values; nested tables
/// (such as `[styles]`) are merged key by key.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<FormeSettings, FormeError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| FormeError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;

    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<FormeSettings, FormeError> {
    let content = read_config(path.as_ref(), "TOML")?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<FormeSettings, FormeError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or cannot be deserialized.
pub fn from_json_str(json_str: &str) -> Result<FormeSettings, FormeError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| FormeError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;

    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<FormeSettings, FormeError> {
    let content = read_config(path.as_ref(), "JSON")?;
    from_json_str(&content)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> FormeSettings {
    let mut settings = FormeSettings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies environment variable overrides to a settings struct.
pub fn apply_env_overrides(settings: &mut FormeSettings) {
    if let Ok(val) = std::env::var("FORME_DEFAULT_STYLE") {
        let val = val.trim();
        settings.default_style = if val.is_empty() || val.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(val.to_string())
        };
    }

    if let Ok(val) = std::env::var("FORME_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Ok(val) = std::env::var("FORME_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Some(val) = std::env::var_os("FORME_TEMPLATE_DIRS") {
        settings.template_dirs = std::env::split_paths(&val)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
    }

    if let Some(name) = settings.default_style.as_deref() {
        if !settings.has_style(name) {
            tracing::warn!("Default style '{name}' is not registered in styles");
        }
    }
}

// ============================================================
// Helpers
// ============================================================

fn read_config(path: &Path, format: &str) -> Result<String, FormeError> {
    std::fs::read_to_string(path).map_err(|e| {
        FormeError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(
    value: serde_json::Value,
    format: &str,
) -> Result<FormeSettings, FormeError> {
    let default_json = serde_json::to_value(FormeSettings::default()).map_err(|e| {
        FormeError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        FormeError::ConfigurationError(format!(
            "Failed to deserialize settings from {format}: {e}"
        ))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_str_partial() {
        let settings = from_toml_str(
            r#"
            default_style = "bootstrap"

            [styles]
            bootstrap = "forme/bootstrap.html"
            "#,
        )
        .unwrap();
        assert_eq!(settings.default_style.as_deref(), Some("bootstrap"));
        // Merged with the default style table, not replacing it.
        assert_eq!(settings.style_template("bare"), Some("forme/bare.html"));
        assert_eq!(
            settings.default_style_template(),
            Some("forme/bootstrap.html")
        );
        assert!(settings.auto_escape);
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let result = from_toml_str("default_style = ");
        assert!(matches!(result, Err(FormeError::ConfigurationError(_))));
    }

    #[test]
    fn test_from_toml_str_wrong_type() {
        let result = from_toml_str("auto_escape = \"sometimes\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json_str() {
        let settings = from_json_str(
            r#"{"log_level": "debug", "template_dirs": ["templates"], "auto_escape": false}"#,
        )
        .unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.template_dirs.len(), 1);
        assert!(!settings.auto_escape);
        assert_eq!(settings.default_style.as_deref(), Some("bare"));
    }

    #[test]
    fn test_from_json_str_null_default_style() {
        let settings = from_json_str(r#"{"default_style": null}"#).unwrap();
        assert!(settings.default_style.is_none());
    }

    #[test]
    fn test_from_toml_file_missing() {
        let result = from_toml_file("/nonexistent/forme.toml");
        assert!(matches!(result, Err(FormeError::ConfigurationError(_))));
    }

    #[test]
    fn test_from_toml_and_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("forme.toml");
        std::fs::write(&toml_path, "default_style = \"bootstrap\"\n[styles]\nbootstrap = \"forme/bootstrap.html\"\n").unwrap();
        let settings = from_toml_file(&toml_path).unwrap();
        assert_eq!(settings.default_style_template(), Some("forme/bootstrap.html"));
        assert!(settings.has_style("bare"));

        let json_path = dir.path().join("forme.json");
        std::fs::write(&json_path, r#"{"auto_escape": false}"#).unwrap();
        let settings = from_json_file(&json_path).unwrap();
        assert!(!settings.auto_escape);
    }

    #[test]
    fn test_merge_json_nested() {
        let base = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 3});
        let over = serde_json::json!({"a": {"y": 20}});
        let merged = merge_json(base, over);
        assert_eq!(merged, serde_json::json!({"a": {"x": 1, "y": 20}, "b": 3}));
    }
}
