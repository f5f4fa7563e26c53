//! CLI binary for edgequake-billrecon.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs one extraction (and optionally an anomaly check),
//! applies a ledger edit script, and prints the report.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_billrecon::{
    compile, write_report, AnomalyChecker, Document, ExtractionConfig, ExtractionOrchestrator,
    ExtractionOutcome, ExtractionProgressCallback, LedgerOp, MarkdownReportRenderer,
    ProgressCallback, ReportConfig, ReportRenderer, Session,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a single 0–100 % bar for one extraction.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Instant,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, document: &str) {
        self.bar.set_prefix("Rendering");
        self.bar.set_message(document.to_string());
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting bills from {document}…"))
        ));
    }

    fn on_pages_rendered(&self, page_count: usize) {
        self.bar.set_prefix("Extracting");
        self.bar.set_message("waiting for the model");
        self.bar.println(format!(
            "  {} {} pages rendered  {}",
            green("✓"),
            page_count,
            dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64())),
        ));
    }

    fn on_progress(&self, percent: f32) {
        self.bar.set_position(percent.round() as u64);
    }

    fn on_extraction_complete(&self, bill_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} bills extracted  {}",
            green("✔"),
            bold(&bill_count.to_string()),
            dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64())),
        );
    }

    fn on_extraction_failed(&self, message: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), red(message));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract bills and print the Markdown report
  billrecon extract claim.pdf

  # Apply corrections, then write the report to a file
  billrecon extract claim.pdf --edits fixes.json --report summary.md

  # Extraction plus anomaly check, JSON output
  billrecon extract claim.pdf --check-anomalies --json > claim.json

  # Anomaly check only
  billrecon check https://example.com/claims/claim-42.pdf

EDIT SCRIPTS:
  A JSON array of operations applied in order; rows are 1-based.
  [
    {"op": "update", "row": 2, "billerName": "City Clinic", "billNumber": "B-7",
     "billDate": "03-01-2024", "billAmount": "1,250.00"},
    {"op": "delete", "row": 4},
    {"op": "add", "billerName": "Pharmacy", "billNumber": "RX-1",
     "billDate": "04-01-2024", "billAmount": 320}
  ]

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory containing libpdfium
"#;

#[derive(Parser, Debug)]
#[command(
    name = "billrecon",
    version,
    about = "Extract and reconcile medical bills from scanned PDFs using Vision LLMs",
    arg_required_else_help = true,
    after_help = AFTER_HELP,
    color = clap::ColorChoice::Auto,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract bills and identity details, reconcile, and report.
    Extract(ExtractArgs),
    /// Ask the model for anomaly notes on a document.
    Check {
        /// Local PDF path or HTTP(S) URL.
        input: String,
    },
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Local PDF path or HTTP(S) URL.
    input: String,

    /// JSON edit script applied to the ledger after extraction.
    #[arg(long, env = "BILLRECON_EDITS")]
    edits: Option<PathBuf>,

    /// Write the Markdown report to this file instead of stdout.
    #[arg(long, env = "BILLRECON_REPORT")]
    report: Option<PathBuf>,

    /// Print the reconciled session as JSON.
    #[arg(long, env = "BILLRECON_JSON")]
    json: bool,

    /// Run the anomaly check alongside extraction.
    #[arg(long, env = "BILLRECON_CHECK_ANOMALIES")]
    check_anomalies: bool,

    /// Report title.
    #[arg(long, env = "BILLRECON_REPORT_TITLE", default_value = "Medical Bill Summary")]
    title: String,

    /// Table rows per report page.
    #[arg(long, env = "BILLRECON_ROWS_PER_PAGE", default_value_t = 25,
          value_parser = clap::value_parser!(u32).range(1..))]
    rows_per_page: u32,

    /// Currency label for the amount column.
    #[arg(long, env = "BILLRECON_CURRENCY", default_value = "INR")]
    currency: String,

    /// Disable the progress bar.
    #[arg(long, env = "BILLRECON_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Model ID (provider default when unset).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Provider name: openai, anthropic, gemini, azure, ollama.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    #[arg(long, global = true, env = "BILLRECON_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// PDF user password.
    #[arg(long, global = true, env = "BILLRECON_PASSWORD")]
    password: Option<String>,

    /// File holding a replacement extraction instruction.
    #[arg(long, global = true, env = "BILLRECON_EXTRACTION_PROMPT")]
    extraction_prompt: Option<PathBuf>,

    /// File holding a replacement anomaly-check instruction.
    #[arg(long, global = true, env = "BILLRECON_ANOMALY_PROMPT")]
    anomaly_prompt: Option<PathBuf>,

    #[arg(long, global = true, env = "BILLRECON_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    #[arg(long, global = true, env = "BILLRECON_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Seconds before a remote call is abandoned; 0 disables.
    #[arg(long, global = true, env = "BILLRECON_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    #[arg(long, global = true, env = "BILLRECON_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    #[arg(short, long, global = true, env = "BILLRECON_VERBOSE")]
    verbose: bool,

    #[arg(short, long, global = true, env = "BILLRECON_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides the feedback that matters; keep INFO quiet.
    let show_progress = match &cli.command {
        Command::Extract(args) => !cli.common.quiet && !args.no_progress && !args.json,
        Command::Check { .. } => false,
    };
    let filter = if cli.common.verbose {
        "debug"
    } else if cli.common.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let config = build_config(&cli.common, progress).await?;

    match &cli.command {
        Command::Extract(args) => run_extract(args, &cli.common, &config).await,
        Command::Check { input } => run_check(input, &config).await,
    }
}

async fn run_extract(args: &ExtractArgs, common: &CommonArgs, config: &ExtractionConfig) -> Result<()> {
    let document = Document::open(&args.input, config.download_timeout_secs)
        .await
        .with_context(|| format!("Failed to open '{}'", args.input))?;
    let orchestrator =
        ExtractionOrchestrator::from_config(config).context("Failed to set up extraction")?;

    let mut session = Session::new();

    // ── Step 1: Extraction (and optional anomaly check) ──────────────────
    let (outcome, advisory) = if args.check_anomalies {
        let checker = AnomalyChecker::from_config(config).context("Failed to set up anomaly check")?;
        let (outcome, advisory) = futures::future::join(
            orchestrator.run(&mut session, &document),
            checker.check(&document),
        )
        .await;
        (outcome, Some(advisory))
    } else {
        (orchestrator.run(&mut session, &document).await, None)
    };
    let outcome = outcome.context("Extraction could not start")?;

    match &outcome {
        ExtractionOutcome::Populated(_) => {}
        ExtractionOutcome::Empty => {
            anyhow::bail!("{}", outcome.user_message().unwrap_or_default());
        }
        ExtractionOutcome::Failed(failure) => {
            let hint = if failure.is_transient() {
                "; try again"
            } else {
                ""
            };
            return Err(anyhow::anyhow!("{}", failure.cause))
                .context(format!("{}{}", failure.message, hint));
        }
    }

    if let Some(advisory) = advisory {
        match advisory {
            Ok(a) => {
                session.accept_advisory(a);
            }
            Err(e) => {
                if !common.quiet {
                    eprintln!("{} anomaly check failed: {}", yellow("⚠"), e);
                }
            }
        }
    }

    // ── Step 2: Apply edit script ────────────────────────────────────────
    if let Some(ref path) = args.edits {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read edit script {:?}", path))?;
        let ops: Vec<LedgerOp> = serde_json::from_str(&text)
            .with_context(|| format!("Invalid edit script {:?}", path))?;
        for (i, op) in ops.into_iter().enumerate() {
            if let Err(rejection) = session.ledger_mut().apply(op) {
                if !common.quiet {
                    eprintln!("{} edit #{} rejected: {}", yellow("⚠"), i + 1, rejection);
                }
            }
        }
    }

    // ── Step 3: Output ───────────────────────────────────────────────────
    if args.json {
        let json = serde_json::to_string_pretty(&session.snapshot())
            .context("Failed to serialise session")?;
        println!("{json}");
    }

    let report_config = ReportConfig {
        title: args.title.clone(),
        rows_per_page: args.rows_per_page as usize,
        currency_label: args.currency.clone(),
    }
    .validated()?;
    let layout = compile(&session, &report_config);
    let rendered = MarkdownReportRenderer::from_config(&report_config).render(&layout)?;

    if let Some(ref path) = args.report {
        write_report(path, &rendered)
            .await
            .context("Failed to write report")?;
        if !common.quiet {
            eprintln!(
                "{}  {} bills  total {}  →  {}",
                green("✔"),
                session.ledger().len(),
                layout.total.amount,
                bold(&path.display().to_string()),
            );
        }
    } else if !args.json {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.content.as_bytes())
            .context("Failed to write to stdout")?;
    }

    if let Some(advisory) = session.advisory() {
        if !common.quiet && !args.json {
            eprintln!("\n{}\n{}", bold("Anomaly check"), advisory.text);
        }
    }

    Ok(())
}

async fn run_check(input: &str, config: &ExtractionConfig) -> Result<()> {
    let document = Document::open(input, config.download_timeout_secs)
        .await
        .with_context(|| format!("Failed to open '{}'", input))?;
    let checker = AnomalyChecker::from_config(config).context("Failed to set up anomaly check")?;
    let advisory = checker.check(&document).await.context("Anomaly check failed")?;
    println!("{}", advisory.text);
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(common: &CommonArgs, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .dpi(common.dpi)
        .max_tokens(common.max_tokens)
        .temperature(common.temperature)
        .api_timeout_secs(common.api_timeout)
        .download_timeout_secs(common.download_timeout);

    if let Some(ref model) = common.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = common.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = common.password {
        builder = builder.password(password);
    }
    if let Some(ref path) = common.extraction_prompt {
        builder = builder.extraction_prompt(read_prompt(path).await?);
    }
    if let Some(ref path) = common.anomaly_prompt {
        builder = builder.anomaly_prompt(read_prompt(path).await?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))
}
