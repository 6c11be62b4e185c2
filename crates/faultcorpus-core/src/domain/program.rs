//! Synthesized program artifacts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::kind::{FaultClass, KindId, Variant};

/// A generated program for one fault kind and variant.
///
/// Immutable once produced. Regenerable from `(kind, variant)`, so nothing
/// persists it beyond a corpus run unless the corpus is emitted to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSpec {
    pub kind: KindId,
    pub class: FaultClass,
    pub variant: Variant,
    /// File name the source is written under (e.g. `null-deref.c`).
    pub file_name: String,
    pub source: String,
    /// SHA-256 hex digest of `source`.
    pub digest: String,
}

impl ProgramSpec {
    pub fn new(kind: KindId, class: FaultClass, variant: Variant, source: String) -> Self {
        let digest = source_digest(&source);
        let file_name = format!("{}.c", kind.as_str());
        Self {
            kind,
            class,
            variant,
            file_name,
            source,
            digest,
        }
    }

    /// First 12 characters of the digest.
    pub fn short_digest(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }
}

/// Compute the SHA-256 hex digest of program source.
pub fn source_digest(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}
