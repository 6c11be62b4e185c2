//! faultcorpus CLI
//!
//! Commands:
//! - `faultcorpus run-corpus [--kinds k1,k2] [--parallelism N] [--timeout S]` - run and verify
//! - `faultcorpus list` - show registered kinds
//! - `faultcorpus synthesize <kind> [variant flags] [--out FILE]` - print one program
//! - `faultcorpus emit --out DIR [--kinds k1,k2]` - write the corpus to disk
//! - `faultcorpus check-tools` - report toolchain availability

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

use faultcorpus_core::{
    describe_signature, emit_corpus, render_report_json, render_report_md, render_report_text,
    write_report_json, write_report_md, Access, Catalog, CorpusConfig, KindId, MatchMode,
    Synthesizer, VariantOverride, VerdictReport, Verifier,
};
use faultcorpus_oracle::{CancelToken, CorpusPipeline, PipelineConfig, SubprocessOracle, ToolConfig};

#[derive(Parser)]
#[command(name = "faultcorpus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Synthesize and verify a corpus of sanitizer-detectable faults", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize, compile, run and verify every selected kind
    RunCorpus {
        /// Comma-separated kind ids (default: all registered kinds)
        #[arg(short, long, value_delimiter = ',')]
        kinds: Vec<String>,

        /// Maximum concurrent runs
        #[arg(short, long)]
        parallelism: Option<usize>,

        /// Per-program run timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        #[command(flatten)]
        toolchain: ToolchainArgs,

        /// Match every signature as a substring or as a regex
        #[arg(long, value_enum)]
        match_mode: Option<MatchArg>,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,

        /// Write the report to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List registered kinds with their classes and signatures
    List {
        #[arg(long, env = "FAULTCORPUS_CONFIG")]
        config: Option<PathBuf>,

        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the program synthesized for one kind
    Synthesize {
        /// Kind id (e.g. null-deref)
        kind: String,

        #[command(flatten)]
        variant: VariantArgs,

        #[arg(long, env = "FAULTCORPUS_CONFIG")]
        config: Option<PathBuf>,

        /// Write the source to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Write the synthesized corpus and a manifest to a directory
    Emit {
        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        /// Comma-separated kind ids (default: all registered kinds)
        #[arg(short, long, value_delimiter = ',')]
        kinds: Vec<String>,

        #[arg(long, env = "FAULTCORPUS_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Check that the compiler and run wrapper can be found
    CheckTools {
        #[command(flatten)]
        toolchain: ToolchainArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct ToolchainArgs {
    /// Configuration file (TOML)
    #[arg(short, long, env = "FAULTCORPUS_CONFIG")]
    config: Option<PathBuf>,

    /// Compiler to use instead of the configured one
    #[arg(long, env = "FAULTCORPUS_CC")]
    compiler: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
struct VariantArgs {
    /// Heap allocation size in bytes
    #[arg(long)]
    alloc_size: Option<i64>,

    /// Stack array length
    #[arg(long)]
    buffer_size: Option<i64>,

    /// Bytes written past the destination
    #[arg(long)]
    overflow_by: Option<i64>,

    /// Extra frames between main and the fault site
    #[arg(long)]
    call_depth: Option<u32>,

    /// Number of leaked blocks
    #[arg(long)]
    leak_count: Option<u32>,

    /// Access through the null pointer
    #[arg(long, value_enum)]
    access: Option<AccessArg>,
}

impl VariantArgs {
    fn to_override(&self) -> VariantOverride {
        VariantOverride {
            alloc_size: self.alloc_size,
            buffer_size: self.buffer_size,
            overflow_by: self.overflow_by,
            call_depth: self.call_depth,
            leak_count: self.leak_count,
            access: self.access.map(Access::from),
            spin_forever: None,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ReportFormat {
    Text,
    Json,
    Markdown,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum MatchArg {
    Substring,
    Regex,
}

impl From<MatchArg> for MatchMode {
    fn from(arg: MatchArg) -> Self {
        match arg {
            MatchArg::Substring => MatchMode::Substring,
            MatchArg::Regex => MatchMode::Regex,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum AccessArg {
    Read,
    Write,
}

impl From<AccessArg> for Access {
    fn from(arg: AccessArg) -> Self {
        match arg {
            AccessArg::Read => Access::Read,
            AccessArg::Write => Access::Write,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    faultcorpus_core::init_tracing(cli.log_json, level);

    match cli.command {
        Commands::RunCorpus {
            kinds,
            parallelism,
            timeout,
            toolchain,
            match_mode,
            format,
            output,
        } => {
            cmd_run_corpus(
                &kinds,
                parallelism,
                timeout,
                &toolchain,
                match_mode,
                format,
                output.as_deref(),
            )
            .await
        }
        Commands::List { config, json } => cmd_list(config.as_deref(), json).map(ok_code),
        Commands::Synthesize {
            kind,
            variant,
            config,
            out,
        } => cmd_synthesize(&kind, &variant, config.as_deref(), out.as_deref()).map(ok_code),
        Commands::Emit { out, kinds, config } => {
            cmd_emit(&out, &kinds, config.as_deref()).map(ok_code)
        }
        Commands::CheckTools { toolchain } => cmd_check_tools(&toolchain).await,
    }
}

fn ok_code(_: ()) -> ExitCode {
    ExitCode::SUCCESS
}

/// Load the configuration file, or defaults when none is given.
fn load_config(path: Option<&Path>) -> Result<CorpusConfig> {
    match path {
        Some(path) => CorpusConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path)),
        None => Ok(CorpusConfig::default()),
    }
}

fn load_catalog(config: &CorpusConfig) -> Result<Catalog> {
    Catalog::from_config(config).context("Failed to build fault catalog")
}

/// Parse kind ids given on the command line.
fn parse_kinds(raw: &[String]) -> Result<Vec<KindId>> {
    raw.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| KindId::new(s).with_context(|| format!("Invalid kind id: {}", s)))
        .collect()
}

/// Configuration file values with command-line overrides applied.
fn tool_config(config: &CorpusConfig, args: &ToolchainArgs) -> ToolConfig {
    let mut tool = ToolConfig::from_section(&config.toolchain);
    if let Some(compiler) = &args.compiler {
        tool = tool.with_compiler(compiler.clone());
    }
    tool
}

/// Cancel the token on Ctrl-C.
fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            token.cancel();
        }
    });
}

/// Pipeline for `run-corpus`: config file values, then command-line overrides.
fn build_pipeline(
    config: &CorpusConfig,
    parallelism: Option<usize>,
    timeout: Option<u64>,
    toolchain: &ToolchainArgs,
    match_mode: Option<MatchArg>,
) -> CorpusPipeline {
    let mut tool = tool_config(config, toolchain);
    if let Some(secs) = timeout {
        tool = tool.with_timeout(Duration::from_secs(secs));
    }
    let mut pipeline_config = PipelineConfig::from_config(config);
    pipeline_config.tool = tool;
    if let Some(n) = parallelism {
        pipeline_config = pipeline_config.with_parallelism(n);
    }

    let verifier = match match_mode {
        Some(mode) => Verifier::with_match_override(mode.into()),
        None => Verifier::new(),
    };

    info!(
        compiler = %pipeline_config.tool.compiler,
        parallelism = pipeline_config.parallelism,
        "running corpus"
    );
    CorpusPipeline::new(Arc::new(SubprocessOracle::new()), pipeline_config)
        .with_verifier(verifier)
}

/// Write the report to `path` in `format`.
fn write_report(path: &Path, format: ReportFormat, report: &VerdictReport) -> Result<()> {
    match format {
        ReportFormat::Text => std::fs::write(path, render_report_text(report))
            .with_context(|| format!("Failed to write report to {:?}", path)),
        ReportFormat::Json => write_report_json(path, report),
        ReportFormat::Markdown => write_report_md(path, report),
    }
}

async fn cmd_run_corpus(
    kinds: &[String],
    parallelism: Option<usize>,
    timeout: Option<u64>,
    toolchain: &ToolchainArgs,
    match_mode: Option<MatchArg>,
    format: ReportFormat,
    output: Option<&Path>,
) -> Result<ExitCode> {
    let config = load_config(toolchain.config.as_deref())?;
    let catalog = load_catalog(&config)?;
    let requested = parse_kinds(kinds)?;

    let pipeline = build_pipeline(&config, parallelism, timeout, toolchain, match_mode);
    let cancel = CancelToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let report = pipeline
        .run(&catalog, &requested, &cancel)
        .await
        .context("Corpus run failed")?;

    match output {
        Some(path) => {
            write_report(path, format, &report)?;
            print!("{}", render_report_text(&report));
            println!("Report written to {:?}", path);
        }
        None => match format {
            ReportFormat::Text => print!("{}", render_report_text(&report)),
            ReportFormat::Json => println!("{}", render_report_json(&report)?),
            ReportFormat::Markdown => print!("{}", render_report_md(&report)),
        },
    }

    Ok(ExitCode::from(report.exit_code() as u8))
}

fn cmd_list(config: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config(config)?;
    let catalog = load_catalog(&config)?;

    if json {
        let kinds: Vec<_> = catalog.list().collect();
        println!("{}", serde_json::to_string_pretty(&kinds)?);
        return Ok(());
    }

    let width = catalog
        .list()
        .map(|k| k.id.as_str().len())
        .max()
        .unwrap_or(2)
        .max(2);
    println!("{:<width$}  {:<20}  SIGNATURE", "ID", "CLASS");
    for kind in catalog.list() {
        println!(
            "{:<width$}  {:<20}  {}",
            kind.id.as_str(),
            kind.class.to_string(),
            describe_signature(&kind.signature)
        );
    }
    println!();
    println!("{} kinds registered", catalog.len());
    Ok(())
}

fn cmd_synthesize(
    kind: &str,
    variant: &VariantArgs,
    config: Option<&Path>,
    out: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    let catalog = load_catalog(&config)?;
    let kind = catalog.lookup_str(kind)?;

    let variant = variant.to_override().apply(&kind.variant);
    let program = Synthesizer::synthesize(kind, &variant)
        .with_context(|| format!("Failed to synthesize {}", kind.id))?;

    match out {
        Some(path) => {
            std::fs::write(path, &program.source)
                .with_context(|| format!("Failed to write {:?}", path))?;
            info!(kind = %program.kind, digest = %program.short_digest(), "program written");
            println!("Wrote {} ({}) to {:?}", program.file_name, program.short_digest(), path);
        }
        None => print!("{}", program.source),
    }
    Ok(())
}

fn cmd_emit(out: &Path, kinds: &[String], config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let catalog = load_catalog(&config)?;
    let requested = parse_kinds(kinds)?;

    let programs = catalog
        .select(&requested)?
        .into_iter()
        .map(Synthesizer::synthesize_default)
        .collect::<faultcorpus_core::Result<Vec<_>>>()
        .context("Failed to synthesize corpus")?;

    let manifest = emit_corpus(out, &programs)
        .with_context(|| format!("Failed to write corpus to {:?}", out))?;

    println!("Emitted {} programs", programs.len());
    for program in &programs {
        println!("  {}  {}", program.short_digest(), program.kind);
    }
    println!("Manifest: {:?}", manifest);
    Ok(())
}

async fn cmd_check_tools(toolchain: &ToolchainArgs) -> Result<ExitCode> {
    let config = load_config(toolchain.config.as_deref())?;
    let tool = tool_config(&config, toolchain);

    println!("faultcorpus toolchain");
    println!("=====================");
    println!();

    let resolved = match tool.resolve() {
        Ok(resolved) => resolved,
        Err(err) => {
            println!("Compiler: {} (unavailable)", tool.compiler);
            println!("  {}", err);
            return Ok(ExitCode::from(2));
        }
    };

    println!("Compiler: {}", resolved.compiler.display());
    if let Ok(output) = tokio::process::Command::new(&resolved.compiler)
        .arg("--version")
        .output()
        .await
    {
        if output.status.success() {
            let version = String::from_utf8_lossy(&output.stdout);
            if let Some(first) = version.lines().next() {
                println!("  {}", first.trim());
            }
        }
    }
    println!("Flags: {}", tool.flags.join(" "));

    match &resolved.wrapper {
        Some(wrapper) => println!("Run wrapper: {}", wrapper.display()),
        None => println!("Run wrapper: (none)"),
    }

    println!();
    println!("Environment:");
    if tool.env.is_empty() {
        println!("  (none)");
    }
    for (key, value) in &tool.env {
        println!("  {}={}", key, value);
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_corpus_parses_kind_list_and_flags() {
        let cli = Cli::try_parse_from([
            "faultcorpus",
            "run-corpus",
            "--kinds",
            "null-deref,double-free",
            "--parallelism",
            "2",
            "--timeout",
            "5",
            "--compiler",
            "gcc",
            "--format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::RunCorpus {
                kinds,
                parallelism,
                timeout,
                toolchain,
                format,
                ..
            } => {
                assert_eq!(kinds, vec!["null-deref", "double-free"]);
                assert_eq!(parallelism, Some(2));
                assert_eq!(timeout, Some(5));
                assert_eq!(toolchain.compiler.as_deref(), Some("gcc"));
                assert_eq!(format, ReportFormat::Json);
            }
            _ => panic!("expected run-corpus"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["faultcorpus", "list", "--verbose", "--log-json"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.log_json);
    }

    #[test]
    fn test_synthesize_variant_flags() {
        let cli = Cli::try_parse_from([
            "faultcorpus",
            "synthesize",
            "null-deref",
            "--access",
            "read",
            "--call-depth",
            "3",
        ])
        .unwrap();

        match cli.command {
            Commands::Synthesize { kind, variant, .. } => {
                assert_eq!(kind, "null-deref");
                let ov = variant.to_override();
                assert_eq!(ov.access, Some(Access::Read));
                assert_eq!(ov.call_depth, Some(3));
                assert_eq!(ov.alloc_size, None);
            }
            _ => panic!("expected synthesize"),
        }
    }

    #[test]
    fn test_emit_requires_out() {
        assert!(Cli::try_parse_from(["faultcorpus", "emit"]).is_err());
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(Cli::try_parse_from(["faultcorpus", "run-corpus", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_parse_kinds_trims_and_skips_empty() {
        let raw = vec![" leak ".to_string(), String::new(), "double-free".to_string()];
        let ids = parse_kinds(&raw).unwrap();
        assert_eq!(
            ids.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            vec!["leak", "double-free"]
        );
    }

    #[test]
    fn test_parse_kinds_rejects_invalid_id() {
        let raw = vec!["Not A Kind".to_string()];
        assert!(parse_kinds(&raw).is_err());
    }

    #[test]
    fn test_compiler_flag_overrides_config() {
        let config = CorpusConfig::default();
        let args = ToolchainArgs {
            config: None,
            compiler: Some("gcc-13".to_string()),
        };
        let tool = tool_config(&config, &args);
        assert_eq!(tool.compiler, "gcc-13");
        assert_eq!(tool.flags, config.toolchain.flags);
    }

    #[tokio::test]
    async fn test_match_mode_flag_reaches_verdicts() {
        let cli = Cli::try_parse_from([
            "faultcorpus",
            "run-corpus",
            "--kinds",
            "leak",
            "--match-mode",
            "regex",
            "--compiler",
            "/nonexistent/faultcorpus-cc",
        ])
        .unwrap();
        let Commands::RunCorpus {
            kinds,
            parallelism,
            timeout,
            toolchain,
            match_mode,
            ..
        } = cli.command
        else {
            panic!("expected run-corpus");
        };
        assert_eq!(match_mode, Some(MatchArg::Regex));

        let config = CorpusConfig::default();
        let catalog = load_catalog(&config).unwrap();
        let pipeline = build_pipeline(&config, parallelism, timeout, &toolchain, match_mode);
        let report = pipeline
            .run(&catalog, &parse_kinds(&kinds).unwrap(), &CancelToken::new())
            .await
            .unwrap();

        // Missing compiler aborts the run, but the verdict still records the mode.
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.verdicts[0].match_mode, MatchMode::Regex);
        assert!(report.aborted.is_some());
        assert_eq!(report.exit_code(), 2);

        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("report.md");
        write_report(&md, ReportFormat::Markdown, &report).unwrap();
        assert!(std::fs::read_to_string(&md).unwrap().contains("leak"));

        let json = dir.path().join("report.json");
        write_report(&json, ReportFormat::Json, &report).unwrap();
        let back: VerdictReport =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(back.verdicts[0].match_mode, MatchMode::Regex);
    }

    #[test]
    fn test_load_config_defaults_without_file() {
        let config = load_config(None).unwrap();
        let catalog = load_catalog(&config).unwrap();
        assert_eq!(catalog.len(), 5);
    }

    #[test]
    fn test_load_config_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(dir.path().join("missing.toml").as_path())).is_err());
    }
}
