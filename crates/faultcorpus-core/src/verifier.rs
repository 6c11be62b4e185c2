//! Corpus verifier: expected-vs-observed signature checks.
//!
//! Verification never fails. Every per-kind problem (run error, missing
//! outcome, unusable signature) becomes an `error` verdict so that one kind
//! cannot prevent the others from being judged.

use std::collections::HashMap;

use regex::Regex;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::diagnostics::{describe_observed, snippet};
use crate::domain::error::{ErrorCategory, RunOutcome};
use crate::domain::kind::{FaultKind, KindId, MatchMode};
use crate::domain::report::{Verdict, VerdictReport, VerdictStatus};
use crate::domain::run::RunResult;

/// Signature matcher over run outcomes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verifier {
    /// Force a match mode for every kind instead of each signature's own.
    match_override: Option<MatchMode>,
}

impl Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_match_override(mode: MatchMode) -> Self {
        Self {
            match_override: Some(mode),
        }
    }

    /// Verify the `requested` kinds (every kind when empty) in catalog
    /// registration order. Requested ids the catalog does not know are
    /// skipped with a warning.
    pub fn verify(
        &self,
        catalog: &Catalog,
        requested: &[KindId],
        results: &HashMap<KindId, RunOutcome>,
    ) -> VerdictReport {
        for id in requested.iter().chain(results.keys()) {
            if catalog.position(id).is_none() {
                warn!(kind = %id, "ignoring kind missing from catalog");
            }
        }
        let selection: Vec<&FaultKind> = catalog
            .list()
            .filter(|k| requested.is_empty() || requested.contains(&k.id))
            .collect();
        self.verify_selection(&selection, results, None)
    }

    /// Verify an explicit selection. Kinds without an outcome are recorded
    /// as `missing` errors; report order is `selection` order.
    pub fn verify_selection(
        &self,
        selection: &[&FaultKind],
        results: &HashMap<KindId, RunOutcome>,
        aborted: Option<String>,
    ) -> VerdictReport {
        let verdicts = selection
            .iter()
            .map(|kind| self.judge(kind, results.get(&kind.id)))
            .collect();
        VerdictReport::new(verdicts, aborted)
    }

    /// Judge a single kind.
    pub fn judge(&self, kind: &FaultKind, outcome: Option<&RunOutcome>) -> Verdict {
        let mode = self.match_override.unwrap_or(kind.signature.mode);
        let mut verdict = Verdict {
            kind: kind.id.clone(),
            class: kind.class,
            status: VerdictStatus::Fail,
            expected: kind.signature.pattern.clone(),
            match_mode: mode,
            observed: None,
            exit_code: None,
            duration_ms: None,
            program_digest: None,
        };

        let result = match outcome {
            None => {
                verdict.status = VerdictStatus::Error {
                    category: ErrorCategory::Missing,
                    message: "no run outcome recorded".to_string(),
                };
                return verdict;
            }
            Some(Err(err)) => {
                verdict.status = VerdictStatus::Error {
                    category: err.category(),
                    message: err.to_string(),
                };
                return verdict;
            }
            Some(Ok(result)) => result,
        };

        verdict.exit_code = result.exit_code;
        verdict.duration_ms = Some(result.duration_ms);
        verdict.program_digest = Some(result.program.digest.clone());

        match find_signature(&kind.signature.pattern, mode, result) {
            Ok(Some(line)) => {
                verdict.status = VerdictStatus::Pass;
                verdict.observed = Some(line);
            }
            Ok(None) => {
                verdict.observed = describe_observed(&result.diagnostic_text());
            }
            Err(reason) => {
                verdict.status = VerdictStatus::Error {
                    category: ErrorCategory::Signature,
                    message: reason,
                };
            }
        }

        debug!(kind = %kind.id, status = verdict.status.label(), "judged kind");
        verdict
    }
}

/// Find the diagnostic line that carries the signature.
///
/// `Ok(None)` when absent; `Err` when the pattern cannot be evaluated.
fn find_signature(
    pattern: &str,
    mode: MatchMode,
    result: &RunResult,
) -> std::result::Result<Option<String>, String> {
    let text = result.diagnostic_text();
    let start = match mode {
        MatchMode::Substring => text.find(pattern),
        MatchMode::Regex => {
            let re = Regex::new(pattern).map_err(|e| format!("invalid regex: {e}"))?;
            re.find(&text).map(|m| m.start())
        }
    };
    Ok(start.map(|at| snippet(line_containing(&text, at))))
}

fn line_containing(text: &str, at: usize) -> &str {
    let begin = text[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = text[at..].find('\n').map(|i| at + i).unwrap_or(text.len());
    &text[begin..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::OracleError;
    use crate::domain::kind::{ExpectedSignature, FaultClass, Variant};
    use crate::domain::program::ProgramSpec;
    use std::sync::Arc;

    fn kind(id: &str, class: FaultClass, sig: ExpectedSignature) -> FaultKind {
        FaultKind::new(KindId::new(id).unwrap(), class, sig)
    }

    fn run(kind: &FaultKind, stderr: &str) -> RunOutcome {
        Ok(RunResult {
            program: Arc::new(ProgramSpec::new(
                kind.id.clone(),
                kind.class,
                Variant::default(),
                "int main(void) { return 0; }\n".to_string(),
            )),
            exit_code: Some(1),
            signal: None,
            stdout: format!("fault-corpus: {}\n", kind.id),
            stderr: stderr.to_string(),
            compile_stderr: String::new(),
            duration_ms: 3,
            truncated: false,
        })
    }

    #[test]
    fn test_substring_match_passes_with_line_snippet() {
        let k = kind(
            "leak",
            FaultClass::Leak,
            ExpectedSignature::substring("detected memory leaks"),
        );
        let outcome = run(&k, "====\n==9==ERROR: LeakSanitizer: detected memory leaks\n");
        let v = Verifier::new().judge(&k, Some(&outcome));
        assert!(v.passed());
        assert_eq!(
            v.observed.as_deref(),
            Some("==9==ERROR: LeakSanitizer: detected memory leaks")
        );
        assert_eq!(v.exit_code, Some(1));
        assert!(v.program_digest.is_some());
    }

    #[test]
    fn test_substring_match_is_case_sensitive() {
        let k = kind(
            "leak",
            FaultClass::Leak,
            ExpectedSignature::substring("Detected Memory Leaks"),
        );
        let outcome = run(&k, "ERROR: LeakSanitizer: detected memory leaks\n");
        let v = Verifier::new().judge(&k, Some(&outcome));
        assert_eq!(v.status, VerdictStatus::Fail);
        assert_eq!(
            v.observed.as_deref(),
            Some("LeakSanitizer: detected memory leaks")
        );
    }

    #[test]
    fn test_regex_mode() {
        let k = kind(
            "double-free",
            FaultClass::DoubleFree,
            ExpectedSignature::regex(r"attempting double-free on 0x[0-9a-f]+"),
        );
        let outcome = run(
            &k,
            "==1==ERROR: AddressSanitizer: attempting double-free on 0x602000000010 in thread T0:\n",
        );
        assert!(Verifier::new().judge(&k, Some(&outcome)).passed());
    }

    #[test]
    fn test_match_override_forces_regex() {
        let k = kind(
            "null-deref",
            FaultClass::NullDeref,
            ExpectedSignature::substring("SEGV on .* address"),
        );
        let outcome = run(&k, "==1==ERROR: AddressSanitizer: SEGV on unknown address 0x000000000000\n");
        assert!(!Verifier::new().judge(&k, Some(&outcome)).passed());
        let forced = Verifier::with_match_override(MatchMode::Regex).judge(&k, Some(&outcome));
        assert!(forced.passed());
        assert_eq!(forced.match_mode, MatchMode::Regex);
    }

    #[test]
    fn test_unusable_regex_is_recorded_not_raised() {
        let k = kind("leak", FaultClass::Leak, ExpectedSignature::substring("(oops"));
        let outcome = run(&k, "anything\n");
        let v = Verifier::with_match_override(MatchMode::Regex).judge(&k, Some(&outcome));
        match v.status {
            VerdictStatus::Error { category, .. } => assert_eq!(category, ErrorCategory::Signature),
            other => panic!("expected signature error, got {:?}", other),
        }
    }

    #[test]
    fn test_run_error_isolated_from_other_kinds() {
        let a = kind("null-deref", FaultClass::NullDeref, ExpectedSignature::substring("SEGV"));
        let b = kind("leak", FaultClass::Leak, ExpectedSignature::substring("detected memory leak"));

        let mut results = HashMap::new();
        results.insert(
            a.id.clone(),
            Err(OracleError::Compile {
                kind: a.id.clone(),
                detail: "exit status 1".to_string(),
                diagnostics: vec!["null-deref.c:1:1: error: boom".to_string()],
            }),
        );
        results.insert(b.id.clone(), run(&b, "ERROR: LeakSanitizer: detected memory leaks\n"));

        let report = Verifier::new().verify_selection(&[&a, &b], &results, None);
        assert_eq!(report.kinds(), vec!["null-deref", "leak"]);
        match &report.verdicts[0].status {
            VerdictStatus::Error { category, message } => {
                assert_eq!(*category, ErrorCategory::Compile);
                assert!(message.contains("failed to compile"));
            }
            other => panic!("expected compile error, got {:?}", other),
        }
        assert!(report.verdicts[1].passed());
        assert_eq!(report.summary.errored, 1);
        assert_eq!(report.summary.passed, 1);
    }

    #[test]
    fn test_missing_outcome_recorded() {
        let a = kind("leak", FaultClass::Leak, ExpectedSignature::substring("leak"));
        let report = Verifier::new().verify_selection(&[&a], &HashMap::new(), None);
        match &report.verdicts[0].status {
            VerdictStatus::Error { category, .. } => assert_eq!(*category, ErrorCategory::Missing),
            other => panic!("expected missing, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_orders_by_catalog_registration() {
        let mut catalog = Catalog::new();
        let z = kind("zulu", FaultClass::Leak, ExpectedSignature::substring("leak"));
        let a = kind("alpha", FaultClass::NullDeref, ExpectedSignature::substring("SEGV"));
        let m = kind("mike", FaultClass::DoubleFree, ExpectedSignature::substring("double"));
        catalog.register(z.clone()).unwrap();
        catalog.register(a.clone()).unwrap();
        catalog.register(m.clone()).unwrap();

        let mut results = HashMap::new();
        results.insert(a.id.clone(), run(&a, "SEGV\n"));
        results.insert(z.id.clone(), run(&z, "leak\n"));
        results.insert(
            KindId::new("stranger").unwrap(),
            run(&a, "not in catalog\n"),
        );

        let requested = vec![a.id.clone(), z.id.clone(), KindId::new("ghost").unwrap()];
        let report = Verifier::new().verify(&catalog, &requested, &results);
        assert_eq!(report.kinds(), vec!["zulu", "alpha"]);
        assert!(report.all_passed());

        // Empty request covers the whole catalog; "mike" never ran.
        let report = Verifier::new().verify(&catalog, &[], &results);
        assert_eq!(report.kinds(), vec!["zulu", "alpha", "mike"]);
        assert_eq!(report.summary.errored, 1);
    }

    #[test]
    fn test_line_containing() {
        let text = "one\ntwo three\nfour";
        assert_eq!(line_containing(text, 0), "one");
        assert_eq!(line_containing(text, 8), "two three");
        assert_eq!(line_containing(text, text.len() - 1), "four");
    }
}
