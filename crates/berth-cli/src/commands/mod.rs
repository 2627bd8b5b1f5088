//! CLI commands

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::{Error, Result};

pub mod ingress;
pub mod service;

/// Load a YAML or JSON document from `path`.
///
/// Files ending in `.json` are parsed as JSON; everything else as YAML.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_yaml::from_str(&content)?)
    }
}
