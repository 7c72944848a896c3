//! Locating the base recipe named by `extend "<ref>"`.
//!
//! Candidates, in order: the reference itself when absolute, the reference
//! relative to the extending recipe's directory, then the reference under
//! every configured search root. A directory candidate must hold exactly one
//! service recipe; a file candidate is used as-is; otherwise
//! `<candidate>.recipe` is tried.

use super::discovery::{discover_recipe, RecipeKind};
use super::error::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Paths tried for `reference`, in search order.
pub fn candidates(reference: &str, current_dir: &Path, search_paths: &[PathBuf]) -> Vec<PathBuf> {
    let target = Path::new(reference);
    if target.is_absolute() {
        return vec![target.to_path_buf()];
    }
    std::iter::once(current_dir.join(target))
        .chain(search_paths.iter().map(|root| root.join(target)))
        .collect()
}

fn with_recipe_extension(candidate: &Path) -> PathBuf {
    let mut s = candidate.as_os_str().to_os_string();
    s.push(".recipe");
    PathBuf::from(s)
}

fn absolute(path: &Path) -> Result<PathBuf, ErrorKind> {
    path.canonicalize().map_err(|source| ErrorKind::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve an `extend` reference to the absolute path of the base recipe.
pub fn resolve_extend(
    reference: &str,
    current_dir: &Path,
    search_paths: &[PathBuf],
) -> Result<PathBuf, ErrorKind> {
    let mut searched = Vec::new();
    for candidate in candidates(reference, current_dir, search_paths) {
        searched.push(candidate.clone());
        if candidate.is_dir() {
            let found = discover_recipe(&candidate, RecipeKind::Service.suffix())?;
            debug!(reference, base = %found.display(), "resolved extend via directory");
            return absolute(&found);
        }
        if candidate.is_file() {
            debug!(reference, base = %candidate.display(), "resolved extend");
            return absolute(&candidate);
        }
        let with_ext = with_recipe_extension(&candidate);
        if with_ext.is_file() {
            debug!(reference, base = %with_ext.display(), "resolved extend");
            return absolute(&with_ext);
        }
    }
    Err(ErrorKind::ExtensionResolutionFailure {
        reference: reference.to_string(),
        searched,
    })
}
