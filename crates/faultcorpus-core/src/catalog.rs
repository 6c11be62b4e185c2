//! Fault catalog: the registry of fault kinds.
//!
//! The catalog is an explicit value. Callers build one (from built-ins or
//! configuration) and pass it by reference to the synthesizer, pipeline and
//! verifier. Registration order is preserved and drives report order.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::domain::error::{FaultError, Result};
use crate::domain::kind::{FaultClass, FaultKind, KindId};

/// Ordered registry of fault kinds.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    kinds: Vec<FaultKind>,
    index: HashMap<KindId, usize>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in kind of every [`FaultClass`].
    pub fn with_builtin_kinds() -> Self {
        let mut catalog = Self::new();
        // Built-in ids are distinct and their signatures are plain substrings.
        for class in FaultClass::ALL {
            let kind = FaultKind::builtin(class);
            catalog.index.insert(kind.id.clone(), catalog.kinds.len());
            catalog.kinds.push(kind);
        }
        catalog
    }

    /// Register a kind.
    ///
    /// Fails with [`FaultError::DuplicateKind`] when the id is taken and with
    /// [`FaultError::InvalidSignature`] when the signature cannot be evaluated.
    pub fn register(&mut self, kind: FaultKind) -> Result<()> {
        if self.index.contains_key(&kind.id) {
            return Err(FaultError::DuplicateKind { kind: kind.id });
        }
        kind.signature.validate(&kind.id)?;

        debug!(kind = %kind.id, class = %kind.class, "registered fault kind");
        self.index.insert(kind.id.clone(), self.kinds.len());
        self.kinds.push(kind);
        Ok(())
    }

    /// Registered kinds in registration order.
    ///
    /// The iterator is lazy and `Clone`, so a sequence can be restarted.
    pub fn list(&self) -> std::slice::Iter<'_, FaultKind> {
        self.kinds.iter()
    }

    /// Look up a kind by id.
    pub fn lookup(&self, id: &KindId) -> Result<&FaultKind> {
        self.index
            .get(id)
            .map(|&i| &self.kinds[i])
            .ok_or_else(|| FaultError::UnknownKind { kind: id.clone() })
    }

    /// Look up a kind by its string id.
    pub fn lookup_str(&self, id: &str) -> Result<&FaultKind> {
        self.lookup(&KindId::new(id)?)
    }

    /// Resolve a requested subset in registration order.
    ///
    /// An empty request selects every kind. Duplicates collapse. The first
    /// unknown id fails the whole selection.
    pub fn select(&self, requested: &[KindId]) -> Result<Vec<&FaultKind>> {
        if requested.is_empty() {
            return Ok(self.kinds.iter().collect());
        }

        let mut wanted = HashSet::new();
        for id in requested {
            self.lookup(id)?;
            wanted.insert(id);
        }

        Ok(self
            .kinds
            .iter()
            .filter(|k| wanted.contains(&k.id))
            .collect())
    }

    /// Registration position of a kind.
    pub fn position(&self, id: &KindId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::kind::ExpectedSignature;

    fn kind(id: &str, class: FaultClass, sig: &str) -> FaultKind {
        FaultKind::new(KindId::new(id).unwrap(), class, ExpectedSignature::substring(sig))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut catalog = Catalog::new();
        catalog
            .register(kind("null-deref", FaultClass::NullDeref, "null pointer dereference"))
            .unwrap();

        let found = catalog.lookup_str("null-deref").unwrap();
        assert_eq!(found.class, FaultClass::NullDeref);
        assert_eq!(found.signature.pattern, "null pointer dereference");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let mut catalog = Catalog::new();
        catalog.register(kind("leak", FaultClass::Leak, "leak")).unwrap();
        match catalog.register(kind("leak", FaultClass::Leak, "other")) {
            Err(FaultError::DuplicateKind { kind }) => assert_eq!(kind.as_str(), "leak"),
            other => panic!("expected DuplicateKind, got {:?}", other),
        }
        // The first registration is untouched.
        assert_eq!(catalog.lookup_str("leak").unwrap().signature.pattern, "leak");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_unknown_kind() {
        let catalog = Catalog::with_builtin_kinds();
        match catalog.lookup_str("heap-overflow") {
            Err(FaultError::UnknownKind { kind }) => assert_eq!(kind.as_str(), "heap-overflow"),
            other => panic!("expected UnknownKind, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_signature_not_registered() {
        let mut catalog = Catalog::new();
        let bad = FaultKind::new(
            KindId::new("leak").unwrap(),
            FaultClass::Leak,
            ExpectedSignature::regex("[unterminated"),
        );
        assert!(matches!(
            catalog.register(bad),
            Err(FaultError::InvalidSignature { .. })
        ));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_list_is_ordered_and_restartable() {
        let mut catalog = Catalog::new();
        for (id, class) in [
            ("zeta", FaultClass::Leak),
            ("alpha", FaultClass::NullDeref),
            ("mid", FaultClass::DoubleFree),
        ] {
            catalog.register(kind(id, class, "x")).unwrap();
        }

        let seq = catalog.list();
        let first: Vec<_> = seq.clone().map(|k| k.id.as_str()).collect();
        let second: Vec<_> = seq.map(|k| k.id.as_str()).collect();
        assert_eq!(first, vec!["zeta", "alpha", "mid"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_select_orders_by_registration() {
        let catalog = Catalog::with_builtin_kinds();
        let requested = vec![
            KindId::new("leak").unwrap(),
            KindId::new("null-deref").unwrap(),
            KindId::new("leak").unwrap(),
        ];
        let selected: Vec<_> = catalog
            .select(&requested)
            .unwrap()
            .into_iter()
            .map(|k| k.id.as_str())
            .collect();
        assert_eq!(selected, vec!["null-deref", "leak"]);

        assert_eq!(catalog.select(&[]).unwrap().len(), 5);
        assert!(catalog.select(&[KindId::new("nope").unwrap()]).is_err());
    }

    #[test]
    fn test_builtin_catalog_contents() {
        let catalog = Catalog::with_builtin_kinds();
        let ids: Vec<_> = catalog.list().map(|k| k.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "null-deref",
                "double-free",
                "leak",
                "stack-overflow",
                "use-after-scope"
            ]
        );
        assert_eq!(catalog.position(&KindId::new("leak").unwrap()), Some(2));
    }
}
