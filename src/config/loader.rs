// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value as JsonValue;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{PipelineError, Result};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (references, cycles, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks names, references, action kinds, cycles and patterns.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Figure out the project root for a config path.
///
/// - If the config path has a non-empty parent (e.g. "site/Assetpipe.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Assetpipe.toml" (parent = ""),
///   we fall back to the current working directory "."
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Load the structured data file handed to template transforms.
///
/// `.json` files are parsed as JSON; anything else as TOML. A missing
/// `[data].file` yields an empty object.
pub fn load_template_data(cfg: &ConfigFile, root: &Path) -> Result<JsonValue> {
    let Some(file) = cfg.data_section().file.as_deref() else {
        return Ok(JsonValue::Object(Default::default()));
    };

    let path = root.join(file);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("reading template data file {:?}", path))?;
    parse_template_data(&path, &contents)
}

/// Parse data file `contents`, picking the format from `path`'s extension.
pub fn parse_template_data(path: &Path, contents: &str) -> Result<JsonValue> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(contents)
            .with_context(|| format!("parsing JSON data file {:?}", path))
            .map_err(PipelineError::from)
    } else {
        let value: toml::Value = toml::from_str(contents)?;
        serde_json::to_value(value)
            .with_context(|| format!("converting TOML data file {:?}", path))
            .map_err(PipelineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_toml_template_data_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = fs::File::create(dir.path().join("data.toml")).unwrap();
        writeln!(data, "title = \"Home\"\n[site]\nname = \"demo\"").unwrap();

        let raw: RawConfigFile = toml::from_str(
            "[data]\nfile = \"data.toml\"\n\n[task.a]\ncmd = \"true\"\n",
        )
        .unwrap();
        let cfg = ConfigFile::try_from(raw).unwrap();

        let value = load_template_data(&cfg, dir.path()).unwrap();
        assert_eq!(value["title"], "Home");
        assert_eq!(value["site"]["name"], "demo");
    }

    #[test]
    fn missing_data_section_gives_empty_object() {
        let raw: RawConfigFile = toml::from_str("[task.a]\ncmd = \"true\"\n").unwrap();
        let cfg = ConfigFile::try_from(raw).unwrap();
        let value = load_template_data(&cfg, Path::new(".")).unwrap();
        assert!(value.as_object().is_some_and(|o| o.is_empty()));
    }

    #[test]
    fn json_data_is_picked_by_extension() {
        let value = parse_template_data(Path::new("data.JSON"), r#"{"year": 2026}"#).unwrap();
        assert_eq!(value["year"], 2026);
        assert!(parse_template_data(Path::new("data.toml"), "{not toml").is_err());
    }
}
