//! Compilation errors.
//!
//! Every failure is fatal to the compilation that raised it. [`ErrorKind`]
//! says what went wrong; [`CompileError`] adds where: the recipe file, the
//! line when known, and the chain of outer recipes that led to it (an
//! application compiling a service, a service extending a base).

use super::entity::EntityKind;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// What went wrong.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("no file ending in '{suffix}' found in {}", .dir.display())]
    MissingRecipe { suffix: String, dir: PathBuf },

    #[error(
        "found multiple files ending in '{suffix}' in {}: {}; only one may be supplied",
        .dir.display(),
        join_paths(.candidates)
    )]
    MultipleCandidateFiles {
        suffix: String,
        dir: PathBuf,
        candidates: Vec<PathBuf>,
    },

    #[error("file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid properties in {}: {message}", .path.display())]
    PropertiesParseError { path: PathBuf, message: String },

    #[error("syntax error: {message}")]
    ParseError { message: String },

    #[error("unknown declaration '{name}'")]
    UnknownDeclaration { name: String },

    #[error("'{name}' {reason}")]
    IllegalNestingOrRoot { name: String, reason: String },

    #[error("'{name}' cannot be declared: '{existing}' is already declared and only one {family} is allowed")]
    DuplicateProcessingUnitDeclaration {
        name: String,
        existing: String,
        family: String,
    },

    #[error("could not find writable property '{name}' on {entity}")]
    UnknownProperty { entity: EntityKind, name: String },

    #[error("property duplication was found: property '{name}' is defined more than once")]
    DuplicateProperty { name: String },

    #[error("cannot set '{name}' on {entity}: {message}")]
    TypeCoercionFailure {
        entity: EntityKind,
        name: String,
        message: String,
    },

    #[error("'extend' must be the first declaration inside the {entity} block")]
    IllegalExtendPosition { entity: EntityKind },

    #[error("'extend' can not be used {target}")]
    UnsupportedExtension { target: String },

    #[error("cannot resolve extended recipe '{reference}'; looked in: {}", join_paths(.searched))]
    ExtensionResolutionFailure {
        reference: String,
        searched: Vec<PathBuf>,
    },

    #[error("recipe does not evaluate to a single root entity: {reason}")]
    EmptyOrMalformedRecipe { reason: String },

    #[error("validation of {entity} failed: {message}")]
    ValidationFailure { entity: EntityKind, message: String },

    #[error("could not resolve '{name}'")]
    UnresolvedReference { name: String },

    #[error("circular reference: {}", join_paths(.cycle))]
    CircularReference { cycle: Vec<PathBuf> },

    #[error("expected a {expected} recipe, found {found}")]
    WrongRootType {
        expected: EntityKind,
        found: EntityKind,
    },
}

/// A failed compilation: the error plus the file (and chain of files) it
/// happened in.
#[derive(Debug)]
pub struct CompileError {
    /// Recipe (or properties/fragment) file being processed
    pub file: PathBuf,

    /// 1-based line of the offending declaration, when known
    pub line: Option<usize>,

    /// Outer recipes, outermost first
    pub chain: Vec<PathBuf>,

    pub kind: ErrorKind,
}

impl CompileError {
    pub fn new(file: impl Into<PathBuf>, kind: ErrorKind) -> Self {
        Self {
            file: file.into(),
            line: None,
            chain: Vec::new(),
            kind,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    /// Record that this error surfaced while compiling `outer`.
    pub fn within(mut self, outer: &Path) -> Self {
        if self.file != outer && self.chain.first().map(|p| p.as_path()) != Some(outer) {
            self.chain.insert(0, outer.to_path_buf());
        }
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file.display())?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        write!(f, ": {}", self.kind)?;
        if !self.chain.is_empty() {
            write!(f, " (while compiling {})", join_paths(&self.chain).replace(", ", " -> "))?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_with_line_and_chain() {
        let err = CompileError::new(
            "/r/base-service.recipe",
            ErrorKind::UnknownDeclaration {
                name: "lifecycel".into(),
            },
        )
        .at_line(4)
        .within(Path::new("/r/child-service.recipe"))
        .within(Path::new("/r/app-application.recipe"));
        let msg = err.to_string();
        assert!(msg.starts_with("/r/base-service.recipe:4: unknown declaration 'lifecycel'"));
        assert!(msg.contains("/r/app-application.recipe -> /r/child-service.recipe"));
    }

    #[test]
    fn test_error_within_same_file_is_not_chained() {
        let err = CompileError::new("/a", ErrorKind::DuplicateProperty { name: "x".into() })
            .within(Path::new("/a"));
        assert!(err.chain.is_empty());
    }

    #[test]
    fn test_error_first_line_wins() {
        let err = CompileError::new("/a", ErrorKind::DuplicateProperty { name: "x".into() })
            .at_line(3)
            .at_line(9);
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_error_multiple_candidates_lists_files() {
        let kind = ErrorKind::MultipleCandidateFiles {
            suffix: "-service.recipe".into(),
            dir: PathBuf::from("/svc"),
            candidates: vec![PathBuf::from("/svc/a-service.recipe"), PathBuf::from("/svc/b-service.recipe")],
        };
        let msg = kind.to_string();
        assert!(msg.contains("/svc/a-service.recipe, /svc/b-service.recipe"));
    }
}
