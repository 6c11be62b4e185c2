//! Fault kinds, classes, expected signatures and variants.

use serde::{Deserialize, Serialize};

use super::error::{FaultError, Result};

/// Identifier of a registered fault kind (e.g. `null-deref`).
///
/// Lowercase ASCII letters, digits, `-` and `_` only; the id doubles as a
/// directory and file stem when a corpus is written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KindId(String);

impl KindId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(FaultError::InvalidKindId {
                id,
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_'))
        {
            return Err(FaultError::InvalidKindId {
                reason: format!("character {c:?} not allowed"),
                id,
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for KindId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for KindId {
    type Error = FaultError;

    fn try_from(value: String) -> Result<Self> {
        KindId::new(value)
    }
}

impl From<KindId> for String {
    fn from(id: KindId) -> Self {
        id.0
    }
}

impl std::str::FromStr for KindId {
    type Err = FaultError;

    fn from_str(s: &str) -> Result<Self> {
        KindId::new(s)
    }
}

/// Synthesis policy: which undefined behavior a program triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultClass {
    /// Write (or read) through a null pointer.
    NullDeref,
    /// Release one allocation twice.
    DoubleFree,
    /// Exit with unreachable heap blocks.
    Leak,
    /// Unchecked copy past the end of a stack array.
    StackBufferOverflow,
    /// Dereference the address of a block-scoped local after the block ends.
    StackUseAfterScope,
}

impl FaultClass {
    pub const ALL: [FaultClass; 5] = [
        FaultClass::NullDeref,
        FaultClass::DoubleFree,
        FaultClass::Leak,
        FaultClass::StackBufferOverflow,
        FaultClass::StackUseAfterScope,
    ];

    /// Canonical kind id for the built-in kind of this class.
    pub fn canonical_id(&self) -> &'static str {
        match self {
            FaultClass::NullDeref => "null-deref",
            FaultClass::DoubleFree => "double-free",
            FaultClass::Leak => "leak",
            FaultClass::StackBufferOverflow => "stack-overflow",
            FaultClass::StackUseAfterScope => "use-after-scope",
        }
    }

    /// Resolve a class from its canonical id.
    pub fn from_canonical_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.canonical_id() == id)
    }

    /// Language constructs a program of this class needs.
    pub fn required_constructs(&self) -> Vec<Construct> {
        match self {
            FaultClass::NullDeref => vec![Construct::PointerWrite, Construct::PointerRead],
            FaultClass::DoubleFree => vec![
                Construct::HeapAlloc,
                Construct::HeapRelease,
                Construct::AliasingReference,
                Construct::FunctionCall,
            ],
            FaultClass::Leak => vec![Construct::HeapAlloc],
            FaultClass::StackBufferOverflow => vec![
                Construct::FixedStackArray,
                Construct::UncheckedCopy,
                Construct::FunctionCall,
            ],
            FaultClass::StackUseAfterScope => vec![
                Construct::FixedStackArray,
                Construct::BlockScope,
                Construct::EscapingAddress,
            ],
        }
    }

    /// Default expected signature, worded the way AddressSanitizer reports it.
    ///
    /// Wording is tool-version dependent; configuration overrides these.
    pub fn default_signature(&self) -> &'static str {
        match self {
            FaultClass::NullDeref => "SEGV on unknown address",
            FaultClass::DoubleFree => "attempting double-free",
            FaultClass::Leak => "detected memory leaks",
            FaultClass::StackBufferOverflow => "stack-buffer-overflow",
            FaultClass::StackUseAfterScope => "stack-use-after-scope",
        }
    }

    /// Default variant for this class.
    pub fn default_variant(&self) -> Variant {
        let base = Variant::default();
        match self {
            FaultClass::StackUseAfterScope => Variant {
                buffer_size: 5,
                ..base
            },
            _ => base,
        }
    }
}

impl std::fmt::Display for FaultClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FaultClass::NullDeref => "null_deref",
            FaultClass::DoubleFree => "double_free",
            FaultClass::Leak => "leak",
            FaultClass::StackBufferOverflow => "stack_buffer_overflow",
            FaultClass::StackUseAfterScope => "stack_use_after_scope",
        };
        f.write_str(s)
    }
}

/// A language construct a fault program relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Construct {
    PointerWrite,
    PointerRead,
    HeapAlloc,
    HeapRelease,
    AliasingReference,
    FixedStackArray,
    UncheckedCopy,
    BlockScope,
    EscapingAddress,
    FunctionCall,
}

/// How an expected signature is matched against diagnostic text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Case-sensitive substring match.
    #[default]
    Substring,
    /// Regular expression match (`regex` crate syntax).
    Regex,
}

impl std::fmt::Display for MatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchMode::Substring => f.write_str("substring"),
            MatchMode::Regex => f.write_str("regex"),
        }
    }
}

/// Pattern the external tool must report for a kind to pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedSignature {
    pub pattern: String,
    #[serde(default)]
    pub mode: MatchMode,
}

impl ExpectedSignature {
    pub fn substring(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            mode: MatchMode::Substring,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            mode: MatchMode::Regex,
        }
    }

    /// Check that the signature can be evaluated.
    pub fn validate(&self, kind: &KindId) -> Result<()> {
        if self.pattern.is_empty() {
            return Err(FaultError::InvalidSignature {
                kind: kind.clone(),
                reason: "pattern must not be empty".to_string(),
            });
        }
        if self.mode == MatchMode::Regex {
            regex::Regex::new(&self.pattern).map_err(|e| FaultError::InvalidSignature {
                kind: kind.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

/// Memory access performed through the faulting pointer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    #[default]
    Write,
}

/// Parameterization of a synthesized program.
///
/// Sizes are signed so out-of-range requests reach validation instead of
/// failing to parse. Each class only reads the fields it uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Variant {
    /// Heap allocation size in bytes (double free, leak).
    pub alloc_size: i64,
    /// Stack array length (overflow destination, scoped array).
    pub buffer_size: i64,
    /// Bytes by which the copy source exceeds the destination.
    pub overflow_by: i64,
    /// Extra `noinline` frames between `main` and the fault site.
    pub call_depth: u32,
    /// Number of leaked blocks.
    pub leak_count: u32,
    /// Null dereference access mode.
    pub access: Access,
    /// Loop forever before reaching the fault. Only for timeout testing.
    pub spin_forever: bool,
}

impl Default for Variant {
    fn default() -> Self {
        Self {
            alloc_size: 100,
            buffer_size: 12,
            overflow_by: 31,
            call_depth: 0,
            leak_count: 2,
            access: Access::Write,
            spin_forever: false,
        }
    }
}

/// A registered fault kind. Immutable once in a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultKind {
    pub id: KindId,
    pub class: FaultClass,
    pub constructs: Vec<Construct>,
    pub signature: ExpectedSignature,
    /// Variant used when a caller does not supply one.
    pub variant: Variant,
}

impl FaultKind {
    /// Kind with the class's constructs and default variant.
    pub fn new(id: KindId, class: FaultClass, signature: ExpectedSignature) -> Self {
        Self {
            id,
            class,
            constructs: class.required_constructs(),
            signature,
            variant: class.default_variant(),
        }
    }

    /// The built-in kind for a class, with its default signature.
    pub fn builtin(class: FaultClass) -> Self {
        Self::new(
            KindId(class.canonical_id().to_string()),
            class,
            ExpectedSignature::substring(class.default_signature()),
        )
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_id_validation() {
        assert!(KindId::new("null-deref").is_ok());
        assert!(KindId::new("leak_2").is_ok());
        assert!(KindId::new("").is_err());
        assert!(KindId::new("Null-Deref").is_err());
        assert!(KindId::new("../escape").is_err());
    }

    #[test]
    fn test_kind_id_deserialize_rejects_invalid() {
        let ok: KindId = serde_json::from_str("\"leak\"").unwrap();
        assert_eq!(ok.as_str(), "leak");
        assert!(serde_json::from_str::<KindId>("\"has space\"").is_err());
    }

    #[test]
    fn test_canonical_ids_round_trip() {
        for class in FaultClass::ALL {
            assert_eq!(FaultClass::from_canonical_id(class.canonical_id()), Some(class));
        }
        assert_eq!(FaultClass::from_canonical_id("heap-overflow"), None);
    }

    #[test]
    fn test_builtin_kind_uses_class_defaults() {
        let kind = FaultKind::builtin(FaultClass::StackUseAfterScope);
        assert_eq!(kind.id.as_str(), "use-after-scope");
        assert_eq!(kind.variant.buffer_size, 5);
        assert!(kind.constructs.contains(&Construct::EscapingAddress));
        assert_eq!(kind.signature.mode, MatchMode::Substring);
    }

    #[test]
    fn test_signature_validation() {
        let kind = KindId::new("leak").unwrap();
        assert!(ExpectedSignature::substring("detected memory leaks")
            .validate(&kind)
            .is_ok());
        assert!(ExpectedSignature::substring("").validate(&kind).is_err());
        assert!(ExpectedSignature::regex(r"leaks?\s+of \d+ byte").validate(&kind).is_ok());
        match ExpectedSignature::regex("(unclosed").validate(&kind) {
            Err(FaultError::InvalidSignature { kind, .. }) => assert_eq!(kind.as_str(), "leak"),
            other => panic!("expected InvalidSignature, got {:?}", other),
        }
    }

    #[test]
    fn test_variant_partial_deserialize_keeps_defaults() {
        let v: Variant = toml::from_str("call_depth = 3\naccess = \"read\"").unwrap();
        assert_eq!(v.call_depth, 3);
        assert_eq!(v.access, Access::Read);
        assert_eq!(v.alloc_size, Variant::default().alloc_size);
    }
}
