//! Parsing of compiler and sanitizer diagnostic text.
//!
//! Compiler lines follow the clang/gcc shape
//! `file:line:col: severity: message`. Sanitizer reports open with a
//! `==PID==ERROR: XSanitizer: ...` headline and close with a `SUMMARY:` line.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum length of a snippet placed in a report.
pub const SNIPPET_MAX_CHARS: usize = 200;

/// Severity of a compiler diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Fatal,
    Error,
    Warning,
    Note,
}

impl Severity {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "fatal" => Some(Severity::Fatal),
            "error" => Some(Severity::Error),
            "warning" => Some(Severity::Warning),
            "note" => Some(Severity::Note),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Fatal | Severity::Error)
    }
}

/// One parsed compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerDiagnostic {
    pub file: String,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
    pub severity: Severity,
    pub message: String,
}

impl std::fmt::Display for CompilerDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sev = match self.severity {
            Severity::Fatal => "fatal error",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        write!(f, "{}:{}:{}: {}: {}", self.file, self.line, self.column, sev, self.message)
    }
}

fn compiler_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.+?):([0-9]+):([0-9]+):\s(fatal|error|warning|note)(?: error)?:\s(.*)$")
            .expect("static regex")
    })
}

fn ignored_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(warning: .* incompatible with .*|warning: .* input unused|warning: include location .* is unsafe for cross-compilation.*)$",
        )
        .expect("static regex")
    })
}

fn sanitizer_headline_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:==\d+==)?ERROR: (\w+Sanitizer): (.*)$").expect("static regex")
    })
}

/// Parse compiler output into diagnostics, skipping noise and unparsable lines.
pub fn parse_compiler_output(text: &str) -> Vec<CompilerDiagnostic> {
    text.lines()
        .filter(|line| !line.is_empty() && !ignored_line_re().is_match(line))
        .filter_map(parse_compiler_line)
        .collect()
}

/// Parse one `file:line:col: severity: message` line.
pub fn parse_compiler_line(line: &str) -> Option<CompilerDiagnostic> {
    let caps = compiler_line_re().captures(line)?;
    Some(CompilerDiagnostic {
        file: caps[1].to_string(),
        line: caps[2].parse().ok()?,
        column: caps[3].parse().ok()?,
        severity: Severity::parse(&caps[4])?,
        message: caps[5].to_string(),
    })
}

/// Headline of a sanitizer report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizerHeadline {
    /// e.g. `AddressSanitizer`, `LeakSanitizer`.
    pub tool: String,
    pub message: String,
}

/// First sanitizer `ERROR:` headline in `text`, if any.
pub fn sanitizer_headline(text: &str) -> Option<SanitizerHeadline> {
    text.lines().find_map(|line| {
        let caps = sanitizer_headline_re().captures(line.trim_end())?;
        Some(SanitizerHeadline {
            tool: caps[1].to_string(),
            message: caps[2].to_string(),
        })
    })
}

/// First `SUMMARY:` line in `text`, if any.
pub fn summary_line(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim)
        .find(|line| line.starts_with("SUMMARY:"))
}

/// Best description of what the tool reported when no signature matched.
pub fn describe_observed(text: &str) -> Option<String> {
    if let Some(headline) = sanitizer_headline(text) {
        return Some(snippet(&format!("{}: {}", headline.tool, headline.message)));
    }
    if let Some(summary) = summary_line(text) {
        return Some(snippet(summary));
    }
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(snippet)
}

/// Trim and cap a line for inclusion in a report.
pub fn snippet(line: &str) -> String {
    let line = line.trim();
    if line.chars().count() <= SNIPPET_MAX_CHARS {
        return line.to_string();
    }
    let mut out: String = line.chars().take(SNIPPET_MAX_CHARS - 1).collect();
    out.push('…');
    out
}
