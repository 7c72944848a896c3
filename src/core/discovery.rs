//! Recipe discovery: find the one recipe file of a kind in a directory.

use super::entity::EntityKind;
use super::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The four compilable recipe kinds, by file-name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeKind {
    Service,
    Application,
    Cloud,
    Template,
}

impl RecipeKind {
    pub const ALL: [RecipeKind; 4] = [
        RecipeKind::Service,
        RecipeKind::Application,
        RecipeKind::Cloud,
        RecipeKind::Template,
    ];

    /// File-name suffix, e.g. `-service.recipe`.
    pub fn suffix(self) -> &'static str {
        match self {
            RecipeKind::Service => "-service.recipe",
            RecipeKind::Application => "-application.recipe",
            RecipeKind::Cloud => "-cloud.recipe",
            RecipeKind::Template => "-template.recipe",
        }
    }

    /// Entity the recipe's root block must compile into.
    pub fn root_kind(self) -> EntityKind {
        match self {
            RecipeKind::Service => EntityKind::Service,
            RecipeKind::Application => EntityKind::Application,
            RecipeKind::Cloud => EntityKind::Cloud,
            RecipeKind::Template => EntityKind::CloudTemplate,
        }
    }

    /// Kind implied by a file name, if it carries a known suffix.
    pub fn from_path(path: &Path) -> Option<RecipeKind> {
        let name = path.file_name()?.to_str()?;
        Self::ALL.into_iter().find(|k| name.ends_with(k.suffix()))
    }
}

impl fmt::Display for RecipeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecipeKind::Service => "service",
            RecipeKind::Application => "application",
            RecipeKind::Cloud => "cloud",
            RecipeKind::Template => "template",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RecipeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "service" => Ok(RecipeKind::Service),
            "application" => Ok(RecipeKind::Application),
            "cloud" => Ok(RecipeKind::Cloud),
            "template" => Ok(RecipeKind::Template),
            other => Err(format!(
                "unknown recipe kind '{}' (expected service, application, cloud or template)",
                other
            )),
        }
    }
}

/// The single file in `dir` whose name ends with `suffix`.
///
/// Zero matches is [`ErrorKind::MissingRecipe`]; more than one is
/// [`ErrorKind::MultipleCandidateFiles`] listing every match.
pub fn discover_recipe(dir: &Path, suffix: &str) -> Result<PathBuf, ErrorKind> {
    let pattern = format!(
        "{}/*{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(suffix)
    );
    let entries = glob::glob(&pattern).map_err(|e| ErrorKind::Io {
        path: dir.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.msg),
    })?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    candidates.sort();

    match candidates.len() {
        0 => Err(ErrorKind::MissingRecipe {
            suffix: suffix.to_string(),
            dir: dir.to_path_buf(),
        }),
        1 => Ok(candidates.remove(0)),
        _ => Err(ErrorKind::MultipleCandidateFiles {
            suffix: suffix.to_string(),
            dir: dir.to_path_buf(),
            candidates,
        }),
    }
}
