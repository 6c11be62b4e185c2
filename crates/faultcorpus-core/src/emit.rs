//! Write a synthesized corpus to disk.
//!
//! Layout: `<dir>/<kind>/<kind>.c` per program plus `<dir>/manifest.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::error::Result;
use crate::domain::kind::{FaultClass, KindId};
use crate::domain::program::ProgramSpec;

/// One manifest line per emitted program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub kind: KindId,
    pub class: FaultClass,
    /// Path relative to the corpus directory.
    pub file: String,
    pub digest: String,
}

/// Manifest written next to an emitted corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusManifest {
    pub schema_version: String,
    pub programs: Vec<ManifestEntry>,
}

/// Write every program and a manifest under `dir`. Returns the manifest path.
pub fn emit_corpus(dir: &Path, programs: &[ProgramSpec]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let mut entries = Vec::with_capacity(programs.len());
    for program in programs {
        let kind_dir = dir.join(program.kind.as_str());
        std::fs::create_dir_all(&kind_dir)?;
        std::fs::write(kind_dir.join(&program.file_name), &program.source)?;

        entries.push(ManifestEntry {
            kind: program.kind.clone(),
            class: program.class,
            file: format!("{}/{}", program.kind, program.file_name),
            digest: program.digest.clone(),
        });
    }

    let manifest = CorpusManifest {
        schema_version: "1".to_string(),
        programs: entries,
    };
    let manifest_path = dir.join("manifest.json");
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;

    info!(dir = ?dir, programs = programs.len(), "emitted corpus");
    Ok(manifest_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::domain::program::source_digest;
    use crate::synth::Synthesizer;

    #[test]
    fn test_emit_corpus_writes_programs_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::with_builtin_kinds();
        let programs: Vec<_> = catalog
            .list()
            .map(|k| Synthesizer::synthesize_default(k).unwrap())
            .collect();

        let manifest_path = emit_corpus(dir.path(), &programs).unwrap();
        let manifest: CorpusManifest =
            serde_json::from_str(&std::fs::read_to_string(&manifest_path).unwrap()).unwrap();

        assert_eq!(manifest.programs.len(), 5);
        assert_eq!(manifest.programs[0].file, "null-deref/null-deref.c");

        for entry in &manifest.programs {
            let source = std::fs::read_to_string(dir.path().join(&entry.file)).unwrap();
            assert_eq!(source_digest(&source), entry.digest);
        }
    }
}
