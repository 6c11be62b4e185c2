//! TOML configuration for corpus runs.
//!
//! ```toml
//! [toolchain]
//! compiler = "clang"
//! timeout_secs = 10
//!
//! [pipeline]
//! parallelism = 4
//!
//! [[kinds]]
//! id = "null-deref"
//! signature = "SEGV on unknown address"
//!
//! [[kinds]]
//! id = "deep-leak"
//! class = "leak"
//! signature = "detected memory leaks"
//! variant = { call_depth = 3, leak_count = 8 }
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::Catalog;
use crate::domain::error::{FaultError, Result};
use crate::domain::kind::{
    Access, ExpectedSignature, FaultClass, FaultKind, KindId, MatchMode, Variant,
};

/// Default compiler flags: C11, unoptimized, AddressSanitizer instrumentation.
pub const DEFAULT_FLAGS: &[&str] = &[
    "-std=c11",
    "-O0",
    "-g",
    "-fno-omit-frame-pointer",
    "-fsanitize=address",
    "-fsanitize-address-use-after-scope",
    "-fdiagnostics-color=never",
];

pub const DEFAULT_COMPILER: &str = "clang";
pub const DEFAULT_ASAN_OPTIONS: &str = "detect_leaks=1:color=never";

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorpusConfig {
    pub toolchain: ToolchainSection,
    pub pipeline: PipelineSection,
    /// Start from the built-in kinds before applying `kinds`.
    pub builtin_kinds: bool,
    pub kinds: Vec<KindEntry>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            toolchain: ToolchainSection::default(),
            pipeline: PipelineSection::default(),
            builtin_kinds: true,
            kinds: Vec::new(),
        }
    }
}

/// `[toolchain]`: how programs are compiled and executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainSection {
    pub compiler: String,
    pub flags: Vec<String>,
    /// Environment for the executed program, added to the inherited one.
    pub env: BTreeMap<String, String>,
    /// Optional command prefix for execution, e.g. `["valgrind", "-q"]`.
    pub run_wrapper: Vec<String>,
    /// Wall-clock limit for one program execution.
    pub timeout_secs: u64,
    pub compile_timeout_secs: u64,
    /// Per-stream cap on captured output.
    pub max_output_bytes: usize,
    /// RLIMIT_CPU for the executed program. `None` leaves it unset.
    pub cpu_limit_secs: Option<u64>,
}

impl Default for ToolchainSection {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("ASAN_OPTIONS".to_string(), DEFAULT_ASAN_OPTIONS.to_string());
        Self {
            compiler: DEFAULT_COMPILER.to_string(),
            flags: DEFAULT_FLAGS.iter().map(|f| f.to_string()).collect(),
            env,
            run_wrapper: Vec::new(),
            timeout_secs: 10,
            compile_timeout_secs: 60,
            max_output_bytes: 1 << 20,
            cpu_limit_secs: Some(30),
        }
    }
}

/// `[pipeline]`: scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    /// Maximum concurrent oracle runs.
    pub parallelism: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self { parallelism: 4 }
    }
}

/// `[[kinds]]`: a new kind, or an override of a built-in one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KindEntry {
    pub id: String,
    /// Required unless `id` names a built-in kind.
    #[serde(default)]
    pub class: Option<FaultClass>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub match_mode: Option<MatchMode>,
    #[serde(default)]
    pub variant: VariantOverride,
}

/// Partial [`Variant`]; unset fields keep the base value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VariantOverride {
    pub alloc_size: Option<i64>,
    pub buffer_size: Option<i64>,
    pub overflow_by: Option<i64>,
    pub call_depth: Option<u32>,
    pub leak_count: Option<u32>,
    pub access: Option<Access>,
    pub spin_forever: Option<bool>,
}

impl VariantOverride {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, base: &Variant) -> Variant {
        Variant {
            alloc_size: self.alloc_size.unwrap_or(base.alloc_size),
            buffer_size: self.buffer_size.unwrap_or(base.buffer_size),
            overflow_by: self.overflow_by.unwrap_or(base.overflow_by),
            call_depth: self.call_depth.unwrap_or(base.call_depth),
            leak_count: self.leak_count.unwrap_or(base.leak_count),
            access: self.access.unwrap_or(base.access),
            spin_forever: self.spin_forever.unwrap_or(base.spin_forever),
        }
    }
}

impl CorpusConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = ?path, kinds = config.kinds.len(), "loaded corpus config");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let tc = &self.toolchain;
        if tc.compiler.trim().is_empty() {
            return Err(FaultError::Config("toolchain.compiler is empty".into()));
        }
        if tc.timeout_secs == 0 {
            return Err(FaultError::Config("toolchain.timeout_secs must be > 0".into()));
        }
        if tc.compile_timeout_secs == 0 {
            return Err(FaultError::Config(
                "toolchain.compile_timeout_secs must be > 0".into(),
            ));
        }
        if tc.max_output_bytes == 0 {
            return Err(FaultError::Config(
                "toolchain.max_output_bytes must be > 0".into(),
            ));
        }
        if self.pipeline.parallelism == 0 {
            return Err(FaultError::Config("pipeline.parallelism must be > 0".into()));
        }
        if !self.builtin_kinds && self.kinds.is_empty() {
            return Err(FaultError::Config(
                "builtin_kinds = false requires at least one [[kinds]] entry".into(),
            ));
        }
        Ok(())
    }
}

impl Catalog {
    /// Build a catalog from configuration.
    ///
    /// Built-in kinds come first (unless `builtin_kinds = false`). An entry
    /// whose id names a kind already present only overrides its signature
    /// and variant; any other entry registers a new kind after them.
    pub fn from_config(config: &CorpusConfig) -> Result<Self> {
        let mut kinds: Vec<FaultKind> = if config.builtin_kinds {
            FaultClass::ALL.into_iter().map(FaultKind::builtin).collect()
        } else {
            Vec::new()
        };

        let mut seen = HashSet::new();
        for entry in &config.kinds {
            let id = KindId::new(entry.id.as_str())?;
            if !seen.insert(id.clone()) {
                return Err(FaultError::DuplicateKind { kind: id });
            }

            if let Some(existing) = kinds.iter_mut().find(|k| k.id == id) {
                if let Some(class) = entry.class {
                    if class != existing.class {
                        return Err(FaultError::Config(format!(
                            "kind {id} is built in as {}, cannot redeclare as {class}",
                            existing.class
                        )));
                    }
                }
                apply_entry(existing, entry);
                continue;
            }

            let class = entry
                .class
                .or_else(|| FaultClass::from_canonical_id(id.as_str()))
                .ok_or_else(|| {
                    FaultError::Config(format!("kind {id} needs a class"))
                })?;
            let mut kind = FaultKind::builtin(class);
            kind.id = id;
            apply_entry(&mut kind, entry);
            kinds.push(kind);
        }

        let mut catalog = Catalog::new();
        for kind in kinds {
            catalog.register(kind)?;
        }
        Ok(catalog)
    }
}

fn apply_entry(kind: &mut FaultKind, entry: &KindEntry) {
    if let Some(pattern) = &entry.signature {
        kind.signature.pattern = pattern.clone();
    }
    if let Some(mode) = entry.match_mode {
        kind.signature.mode = mode;
    }
    if !entry.variant.is_empty() {
        kind.variant = entry.variant.apply(&kind.variant);
    }
}

/// Render a signature for listings: quoted substring or `/regex/`.
pub fn describe_signature(sig: &ExpectedSignature) -> String {
    match sig.mode {
        MatchMode::Substring => format!("{:?}", sig.pattern),
        MatchMode::Regex => format!("/{}/", sig.pattern),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_defaults() {
        let config = CorpusConfig::from_toml_str("").unwrap();
        assert_eq!(config, CorpusConfig::default());
        assert_eq!(config.toolchain.compiler, "clang");
        assert!(config
            .toolchain
            .flags
            .contains(&"-fsanitize=address".to_string()));
        assert_eq!(
            config.toolchain.env.get("ASAN_OPTIONS").map(String::as_str),
            Some(DEFAULT_ASAN_OPTIONS)
        );

        let catalog = Catalog::from_config(&config).unwrap();
        assert_eq!(catalog.len(), 5);
    }

    #[test]
    fn test_default_flags_work_for_gcc_too() {
        let flags = &ToolchainSection::default().flags;
        assert!(flags.contains(&"-fdiagnostics-color=never".to_string()));
        // clang-only spelling; gcc rejects it and every kind fails to compile
        assert!(!flags.iter().any(|f| f == "-fno-color-diagnostics"));
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = CorpusConfig::from_toml_str(
            r#"
            [toolchain]
            compiler = "gcc"
            run_wrapper = ["valgrind", "-q"]

            [pipeline]
            parallelism = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.toolchain.compiler, "gcc");
        assert_eq!(config.toolchain.timeout_secs, 10);
        assert_eq!(config.toolchain.run_wrapper, vec!["valgrind", "-q"]);
        assert_eq!(config.pipeline.parallelism, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            CorpusConfig::from_toml_str("[pipeline]\nparallelism = 0\n"),
            Err(FaultError::Config(_))
        ));
        assert!(matches!(
            CorpusConfig::from_toml_str("[toolchain]\ntimeout_secs = 0\n"),
            Err(FaultError::Config(_))
        ));
        assert!(matches!(
            CorpusConfig::from_toml_str("[toolchain]\nbogus = 1\n"),
            Err(FaultError::Toml(_))
        ));
    }

    #[test]
    fn test_builtin_override_and_new_kind() {
        let config = CorpusConfig::from_toml_str(
            r#"
            [[kinds]]
            id = "null-deref"
            signature = "null pointer dereference"

            [[kinds]]
            id = "deep-leak"
            class = "leak"
            signature = "detected memory leak"
            variant = { call_depth = 3, leak_count = 8 }

            [[kinds]]
            id = "double-free"
            signature = "double[- ]free"
            match_mode = "regex"
            "#,
        )
        .unwrap();
        let catalog = Catalog::from_config(&config).unwrap();

        let ids: Vec<_> = catalog.list().map(|k| k.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "null-deref",
                "double-free",
                "leak",
                "stack-overflow",
                "use-after-scope",
                "deep-leak"
            ]
        );

        let nd = catalog.lookup_str("null-deref").unwrap();
        assert_eq!(nd.signature.pattern, "null pointer dereference");
        assert_eq!(nd.class, FaultClass::NullDeref);

        let deep = catalog.lookup_str("deep-leak").unwrap();
        assert_eq!(deep.class, FaultClass::Leak);
        assert_eq!(deep.variant.call_depth, 3);
        assert_eq!(deep.variant.leak_count, 8);
        assert_eq!(deep.variant.alloc_size, Variant::default().alloc_size);

        let df = catalog.lookup_str("double-free").unwrap();
        assert_eq!(df.signature.mode, MatchMode::Regex);
    }

    #[test]
    fn test_without_builtins() {
        let config = CorpusConfig::from_toml_str(
            r#"
            builtin_kinds = false

            [[kinds]]
            id = "leak"
            "#,
        )
        .unwrap();
        let catalog = Catalog::from_config(&config).unwrap();
        assert_eq!(catalog.len(), 1);
        // Class inferred from the canonical id.
        assert_eq!(catalog.lookup_str("leak").unwrap().class, FaultClass::Leak);
    }

    #[test]
    fn test_no_kinds_at_all_rejected() {
        assert!(matches!(
            CorpusConfig::from_toml_str("builtin_kinds = false\n"),
            Err(FaultError::Config(_))
        ));
    }

    #[test]
    fn test_config_kind_errors() {
        let dup = CorpusConfig::from_toml_str(
            "[[kinds]]\nid = \"x\"\nclass = \"leak\"\n[[kinds]]\nid = \"x\"\nclass = \"leak\"\n",
        )
        .unwrap();
        assert!(matches!(
            Catalog::from_config(&dup),
            Err(FaultError::DuplicateKind { .. })
        ));

        let classless = CorpusConfig::from_toml_str("[[kinds]]\nid = \"mystery\"\n").unwrap();
        assert!(matches!(
            Catalog::from_config(&classless),
            Err(FaultError::Config(_))
        ));

        let bad_id = CorpusConfig::from_toml_str("[[kinds]]\nid = \"Bad Id\"\nclass = \"leak\"\n")
            .unwrap();
        assert!(matches!(
            Catalog::from_config(&bad_id),
            Err(FaultError::InvalidKindId { .. })
        ));

        let bad_regex = CorpusConfig::from_toml_str(
            "[[kinds]]\nid = \"leak\"\nsignature = \"(\"\nmatch_mode = \"regex\"\n",
        )
        .unwrap();
        assert!(matches!(
            Catalog::from_config(&bad_regex),
            Err(FaultError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faultcorpus.toml");
        std::fs::write(&path, "[toolchain]\ncpu_limit_secs = 5\n").unwrap();
        let config = CorpusConfig::load(&path).unwrap();
        assert_eq!(config.toolchain.cpu_limit_secs, Some(5));

        assert!(matches!(
            CorpusConfig::load(&dir.path().join("missing.toml")),
            Err(FaultError::Io(_))
        ));
    }

    #[test]
    fn test_describe_signature() {
        assert_eq!(
            describe_signature(&ExpectedSignature::substring("double free")),
            "\"double free\""
        );
        assert_eq!(
            describe_signature(&ExpectedSignature::regex("SEGV.*")),
            "/SEGV.*/"
        );
    }
}
