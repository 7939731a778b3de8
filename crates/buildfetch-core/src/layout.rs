//! Sandbox Layout Planner
//!
//! Validates the fetch destination for the host OS and places every
//! component of the effective set under it, either directly or in a folder
//! named after the component. Runs before any I/O.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use crate::components::ComponentSet;
use crate::config::BuildConfiguration;
use crate::error::ConfigurationError;
use crate::plan::{LoadPlan, LoadPlanEntry, LoadScope};

/// Path rules of the OS the sandbox is created on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    Unix,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(windows) {
            HostOs::Windows
        } else {
            HostOs::Unix
        }
    }

    fn reserved(&self) -> Option<&'static Regex> {
        static WINDOWS: OnceLock<Option<Regex>> = OnceLock::new();
        static UNIX: OnceLock<Option<Regex>> = OnceLock::new();
        match self {
            HostOs::Windows => WINDOWS
                .get_or_init(|| Regex::new(r#"[<>"|?*\x00-\x1f]"#).ok())
                .as_ref(),
            HostOs::Unix => UNIX.get_or_init(|| Regex::new(r"\x00").ok()).as_ref(),
        }
    }

    /// First reserved character in `path`, if any.
    ///
    /// On Windows a `:` is only allowed as the drive separator.
    fn first_reserved(&self, path: &str) -> Option<char> {
        let found = self
            .reserved()
            .and_then(|re| re.find(path))
            .and_then(|m| path[m.start()..].chars().next());
        if found.is_some() || *self == HostOs::Unix {
            return found;
        }
        let drive = path.len() >= 2
            && path.as_bytes()[0].is_ascii_alphabetic()
            && path.as_bytes()[1] == b':';
        path.char_indices()
            .find(|(idx, c)| *c == ':' && !(drive && *idx == 1))
            .map(|(_, c)| c)
    }

    fn is_separator(&self, c: char) -> bool {
        match self {
            HostOs::Unix => c == '/',
            HostOs::Windows => c == '/' || c == '\\',
        }
    }

    fn is_absolute(&self, path: &str) -> bool {
        match self {
            HostOs::Unix => path.starts_with('/'),
            HostOs::Windows => {
                let bytes = path.as_bytes();
                path.starts_with('\\')
                    || path.starts_with('/')
                    || (bytes.len() >= 3
                        && bytes[0].is_ascii_alphabetic()
                        && bytes[1] == b':'
                        && (bytes[2] == b'\\' || bytes[2] == b'/'))
            }
        }
    }
}

/// Validate `destination` and resolve it against `working_dir`.
pub fn validate_destination(
    destination: &str,
    working_dir: &Path,
    os: HostOs,
) -> Result<PathBuf, ConfigurationError> {
    let trimmed = destination.trim();
    if trimmed.is_empty() {
        return Err(ConfigurationError::EmptyDestination);
    }
    if let Some(character) = os.first_reserved(trimmed) {
        return Err(ConfigurationError::InvalidDestination {
            path: trimmed.to_string(),
            character,
        });
    }
    if os.is_absolute(trimmed) {
        return Ok(PathBuf::from(trimmed));
    }
    // Pushed segment by segment: a stray separator never turns the join
    // absolute.
    let mut root = working_dir.to_path_buf();
    for segment in trimmed
        .split(|c: char| os.is_separator(c))
        .filter(|s| !s.is_empty() && *s != ".")
    {
        root.push(segment);
    }
    Ok(root)
}

fn validate_folder_name(name: &str, os: HostOs) -> Result<(), ConfigurationError> {
    let bad = os
        .first_reserved(name)
        .or_else(|| name.chars().find(|c| *c == '/' || *c == '\\'));
    match bad {
        Some(character) => Err(ConfigurationError::InvalidComponentFolder {
            name: name.to_string(),
            character,
        }),
        None => Ok(()),
    }
}

/// Lay the effective component set out under the destination.
///
/// With `create_folders_for_components` off, all components share the
/// root and a path present in two components ends up with the content of
/// the one loaded last.
pub fn plan_layout(
    set: &ComponentSet,
    config: &BuildConfiguration,
    working_dir: &Path,
    os: HostOs,
) -> Result<LoadPlan, ConfigurationError> {
    let destination_root = validate_destination(&config.fetch_destination, working_dir, os)?;

    let mut entries = Vec::with_capacity(set.selections.len());
    for selection in &set.selections {
        let subpath = if config.create_folders_for_components {
            validate_folder_name(&selection.component.name, os)?;
            PathBuf::from(&selection.component.name)
        } else {
            PathBuf::new()
        };
        let scope = match &selection.rule {
            Some(rule) => LoadScope::Rule(rule.selections.clone()),
            None => LoadScope::Full,
        };
        entries.push(LoadPlanEntry {
            component: selection.component.clone(),
            scope,
            subpath,
        });
    }

    debug!(
        destination = %destination_root.display(),
        components = entries.len(),
        component_folders = config.create_folders_for_components,
        "Planned sandbox layout"
    );

    Ok(LoadPlan {
        destination_root,
        entries,
    })
}
