//! BLAKE3 provenance of compiled recipes.
//!
//! Every file a compilation reads (recipe, properties, overrides, extended
//! and loaded recipes) is recorded with the hash of the exact text that was
//! parsed. The combined digest changes whenever any input changes.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Hash text. Returns `"blake3:{hex}"`.
pub fn hash_text(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// One input file of a compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDigest {
    pub path: PathBuf,
    pub hash: String,
}

/// Ordered, de-duplicated record of input files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Provenance {
    sources: Vec<SourceDigest>,
}

impl Provenance {
    /// Record `path` as read with `content`. A path already recorded keeps
    /// its first hash.
    pub fn record(&mut self, path: &Path, content: &str) {
        if self.sources.iter().any(|s| s.path == path) {
            return;
        }
        self.sources.push(SourceDigest {
            path: path.to_path_buf(),
            hash: hash_text(content),
        });
    }

    pub fn sources(&self) -> &[SourceDigest] {
        &self.sources
    }

    pub fn into_sources(self) -> Vec<SourceDigest> {
        self.sources
    }

    /// Digest over the path-sorted `(path, hash)` pairs.
    pub fn digest(&self) -> String {
        let mut sorted: Vec<&SourceDigest> = self.sources.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));
        let mut hasher = blake3::Hasher::new();
        for source in sorted {
            hasher.update(source.path.to_string_lossy().as_bytes());
            hasher.update(b"\0");
            hasher.update(source.hash.as_bytes());
            hasher.update(b"\n");
        }
        format!("blake3:{}", hasher.finalize().to_hex())
    }
}
