//! Loading Definitions from strings, files and directories.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use super::error::DefinitionError;
use super::types::Definition;
use super::validate;

/// Parse and validate a TOML definition.
pub fn from_toml_str(raw: &str) -> Result<Definition, DefinitionError> {
    from_toml_named(raw, "<definition>")
}

/// Parse and validate a JSON definition.
pub fn from_json_str(raw: &str) -> Result<Definition, DefinitionError> {
    from_json_named(raw, "<definition>")
}

fn from_toml_named(raw: &str, context: &str) -> Result<Definition, DefinitionError> {
    let mut def: Definition = toml::from_str(raw).map_err(|e| DefinitionError::Parse {
        context: context.to_string(),
        reason: e.to_string(),
    })?;
    finish(&mut def)?;
    Ok(def)
}

fn from_json_named(raw: &str, context: &str) -> Result<Definition, DefinitionError> {
    let mut def: Definition = serde_json::from_str(raw).map_err(|e| DefinitionError::Parse {
        context: context.to_string(),
        reason: e.to_string(),
    })?;
    finish(&mut def)?;
    Ok(def)
}

fn finish(def: &mut Definition) -> Result<(), DefinitionError> {
    normalize(def);
    validate::validate(def)?;
    debug!(id = %def.id, name = %def.name, "definition loaded");
    Ok(())
}

/// Base links are always used for joining relative paths, so they must end
/// with a slash.
fn normalize(def: &mut Definition) {
    for link in def.links.iter_mut().chain(def.legacy_links.iter_mut()) {
        *link = link.trim().to_string();
        if !link.is_empty() && !link.ends_with('/') {
            link.push('/');
        }
    }
}

/// Load one definition file, dispatching on extension.
pub fn load_file(path: &Path) -> Result<Definition, DefinitionError> {
    let display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|e| DefinitionError::Read {
        path: display.clone(),
        reason: e.to_string(),
    })?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => from_toml_named(&raw, &display),
        Some("json") => from_json_named(&raw, &display),
        _ => Err(DefinitionError::UnsupportedFormat { path: display }),
    }
}

/// Load every definition in a directory, in stable file-name order.
///
/// Files with other extensions are skipped; two files claiming the same id
/// are an error.
pub fn load_dir(dir: &Path) -> Result<Vec<Definition>, DefinitionError> {
    let entries = fs::read_dir(dir).map_err(|e| DefinitionError::Read {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("toml") | Some("json")
            )
        })
        .collect();
    paths.sort();

    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    let mut definitions = Vec::with_capacity(paths.len());
    for path in paths {
        let def = load_file(&path)?;
        if seen
            .insert(def.id.clone(), path.display().to_string())
            .is_some()
        {
            return Err(DefinitionError::Duplicate {
                id: def.id,
                path: path.display().to_string(),
            });
        }
        definitions.push(def);
    }
    info!(count = definitions.len(), dir = %dir.display(), "definitions loaded");
    Ok(definitions)
}
