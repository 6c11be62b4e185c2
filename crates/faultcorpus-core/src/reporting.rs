use anyhow::{Context, Result};
use std::path::Path;

use crate::domain::report::{VerdictReport, VerdictStatus};

/// Write the report as pretty JSON.
pub fn write_report_json(path: &Path, report: &VerdictReport) -> Result<()> {
    let content = render_report_json(report)?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

pub fn render_report_json(report: &VerdictReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("serialize verdict report")
}

/// Render a plain-text table for terminals.
pub fn render_report_text(report: &VerdictReport) -> String {
    let width = report
        .verdicts
        .iter()
        .map(|v| v.kind.as_str().len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut out = String::new();
    out.push_str(&format!("{:<width$}  {:<6}  DETAIL\n", "KIND", "STATUS"));
    for v in &report.verdicts {
        let detail = match &v.status {
            VerdictStatus::Pass => format!(
                "matched {:?}: {}",
                v.expected,
                v.observed.as_deref().unwrap_or("")
            ),
            VerdictStatus::Fail => format!(
                "expected {:?}, observed: {}",
                v.expected,
                v.observed.as_deref().unwrap_or("<no diagnostic output>")
            ),
            VerdictStatus::Error { category, message } => format!("[{}] {}", category, message),
        };
        out.push_str(&format!(
            "{:<width$}  {:<6}  {}\n",
            v.kind.as_str(),
            v.status.label(),
            detail
        ));
    }

    let s = &report.summary;
    out.push_str(&format!(
        "\n{} kinds: {} passed, {} failed, {} errored\n",
        s.total, s.passed, s.failed, s.errored
    ));
    if let Some(reason) = &report.aborted {
        out.push_str(&format!("run aborted: {}\n", reason));
    }
    out
}

/// Render a markdown summary for CI comments.
pub fn render_report_md(report: &VerdictReport) -> String {
    let mut out = String::new();
    out.push_str("# Fault Corpus Report\n\n");
    out.push_str(&format!(
        "- run: `{}`\n- generated: {}\n- passed: {}/{}\n",
        report.run_id,
        report.generated_at.to_rfc3339(),
        report.summary.passed,
        report.summary.total
    ));
    if let Some(reason) = &report.aborted {
        out.push_str(&format!("- **aborted**: {}\n", reason));
    }
    out.push('\n');

    out.push_str("| kind | status | expected | observed |\n");
    out.push_str("|------|--------|----------|----------|\n");
    for v in &report.verdicts {
        let observed = match &v.status {
            VerdictStatus::Error { category, message } => format!("{}: {}", category, message),
            _ => v.observed.clone().unwrap_or_default(),
        };
        out.push_str(&format!(
            "| `{}` | {} | `{}` | {} |\n",
            v.kind,
            v.status.label(),
            v.expected,
            observed.replace('|', "\\|")
        ));
    }
    out
}

pub fn write_report_md(path: &Path, report: &VerdictReport) -> Result<()> {
    let md = render_report_md(report);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorCategory;
    use crate::domain::kind::{FaultClass, KindId, MatchMode};
    use crate::domain::report::Verdict;
    use serde_json::json;

    fn report() -> VerdictReport {
        let verdict = |kind: &str, class, status, observed: Option<&str>| Verdict {
            kind: KindId::new(kind).expect("valid id"),
            class,
            status,
            expected: "pattern".to_string(),
            match_mode: MatchMode::Substring,
            observed: observed.map(str::to_string),
            exit_code: Some(1),
            duration_ms: Some(12),
            program_digest: Some("ab".repeat(32)),
        };
        VerdictReport::new(
            vec![
                verdict(
                    "null-deref",
                    FaultClass::NullDeref,
                    VerdictStatus::Pass,
                    Some("ERROR: AddressSanitizer: SEGV on unknown address"),
                ),
                verdict(
                    "leak",
                    FaultClass::Leak,
                    VerdictStatus::Fail,
                    Some("SUMMARY: nothing | here"),
                ),
                verdict(
                    "double-free",
                    FaultClass::DoubleFree,
                    VerdictStatus::Error {
                        category: ErrorCategory::Timeout,
                        message: "timed out".to_string(),
                    },
                    None,
                ),
            ],
            None,
        )
    }

    #[test]
    fn report_json_has_expected_keys() {
        let raw = serde_json::to_value(report()).expect("serialize report");
        let obj = raw.as_object().expect("report object");
        for key in ["run_id", "generated_at", "verdicts", "summary", "aborted"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(raw["summary"]["total"], json!(3));
        assert_eq!(raw["verdicts"][0]["status"], json!("pass"));
        assert_eq!(raw["verdicts"][0]["class"], json!("null_deref"));
        assert_eq!(raw["verdicts"][2]["status"], json!("error"));
        assert_eq!(raw["verdicts"][2]["category"], json!("timeout"));
    }

    #[test]
    fn report_json_file_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        let original = report();
        write_report_json(&path, &original).expect("write report");

        let parsed: VerdictReport =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read report"))
                .expect("parse report");
        assert_eq!(parsed, original);
    }

    #[test]
    fn text_report_lists_every_kind_in_order() {
        let text = render_report_text(&report());
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[0].starts_with("KIND"));
        assert!(lines[1].starts_with("null-deref") && lines[1].contains("pass"));
        assert!(lines[2].starts_with("leak") && lines[2].contains("fail"));
        assert!(lines[3].starts_with("double-free") && lines[3].contains("[timeout]"));
        assert!(text.contains("3 kinds: 1 passed, 1 failed, 1 errored"));
        assert!(!text.contains("aborted"));
    }

    #[test]
    fn aborted_report_is_flagged() {
        let mut r = report();
        r.aborted = Some("tool unavailable: clang".to_string());
        assert!(render_report_text(&r).contains("run aborted: tool unavailable: clang"));
        assert!(render_report_md(&r).contains("**aborted**"));
    }

    #[test]
    fn markdown_escapes_pipes() {
        let md = render_report_md(&report());
        assert!(md.contains("# Fault Corpus Report"));
        assert!(md.contains("SUMMARY: nothing \\| here"));
        assert!(md.contains("| `double-free` | error |"));
    }
}
