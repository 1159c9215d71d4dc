//! Codebase context documents (`AGENT.md`)
//!
//! Generating the document is someone else's job; the pipeline only locates
//! it and passes its text to the planner and implementer.

use crate::config::Settings;
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Context file to use: an explicit override, else the configured default
pub fn resolve_path(settings: &Settings, explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => settings.context_path(),
    }
}

/// Read the context file; a missing file is `Ok(None)`
pub fn load(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no context file");
            Ok(None)
        }
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Join `--info-file` contents and `--info-text` values
///
/// Files come first, each under a `# <file name>` heading. `None` when there
/// is nothing to add.
pub fn additional_info(files: &[PathBuf], texts: &[String]) -> Result<Option<String>, ConfigError> {
    let mut parts = Vec::with_capacity(files.len() + texts.len());
    for file in files {
        let text = std::fs::read_to_string(file).map_err(|source| ConfigError::Read {
            path: file.clone(),
            source,
        })?;
        let name = file
            .file_name()
            .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned());
        parts.push(format!("# {name}\n{}", text.trim_end()));
    }
    parts.extend(texts.iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()));
    Ok((!parts.is_empty()).then(|| parts.join("\n\n")))
}
