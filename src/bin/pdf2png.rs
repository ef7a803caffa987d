//! CLI binary for pdf2png.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConvertOptions` and writes the resulting PNG.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2png::convert::write_atomic;
use pdf2png::engine::pdfium::PdfiumModule;
use pdf2png::{
    resolve_input, ConvertOptions, Converter, EngineLoader, EngineModule, LoaderConfig,
    ResourceLocation,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # First page at 2x (writes report.png)
  pdf2png report.pdf

  # Page 3 at 1.5x to a chosen file
  pdf2png --page 3 --scale 1.5 report.pdf -o cover.png

  # Convert from URL
  pdf2png https://arxiv.org/pdf/1706.03762 --page 1

  # JSON result (data URL included) on stdout
  pdf2png --json report.pdf > result.json

  # Check that the PDF engine can start
  pdf2png --check

ENVIRONMENT VARIABLES:
  PDF2PNG_WORKER_SRC      PDFium library path or URL to use as-is (no probe)
  PDFIUM_LIB_PATH         Same as PDF2PNG_WORKER_SRC
  PDF2PNG_LOCAL_WORKER    Local library candidate probed before the pinned release
  PDFIUM_FETCH_CACHE_DIR  Override the default pdfium cache directory

SETUP:
  PDFium (~30 MB) is downloaded automatically on first run and cached in
  ~/.cache/pdf2png/pdfium-7690/. No manual library setup is required.
"#;

/// Render one page of a PDF to PNG.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2png",
    version,
    about = "Render one page of a PDF file or URL to a PNG image",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "check")]
    input: Option<String>,

    /// Write the PNG here. Default: the input name with `.pdf` replaced by `.png`.
    #[arg(short, long, env = "PDF2PNG_OUTPUT")]
    output: Option<PathBuf>,

    /// 1-indexed page to render.
    #[arg(long, env = "PDF2PNG_PAGE", default_value_t = 1)]
    page: usize,

    /// Pixels per PDF point.
    #[arg(long, env = "PDF2PNG_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Quality hint in [0, 1]; higher spends more effort on compression.
    #[arg(long, env = "PDF2PNG_QUALITY", default_value_t = 1.0)]
    quality: f32,

    /// PDFium library path or URL to use without probing.
    #[arg(long, env = "PDF2PNG_WORKER_SRC")]
    worker_src: Option<String>,

    /// Print the ConversionResult as JSON on stdout instead of writing a file.
    #[arg(long, env = "PDF2PNG_JSON")]
    json: bool,

    /// Report engine and worker availability, then exit.
    #[arg(long)]
    check: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2PNG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2PNG_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "PDF2PNG_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
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

    let converter = Converter::new(build_loader(&cli));

    // ── Check mode ───────────────────────────────────────────────────────
    if cli.check {
        return run_check(&converter, cli.json).await;
    }

    let input = cli
        .input
        .as_deref()
        .context("An input PDF is required")?;

    let options = ConvertOptions::builder()
        .page_number(cli.page)
        .scale(cli.scale)
        .quality(cli.quality)
        .build()
        .context("Invalid options")?;

    let file = resolve_input(input, cli.download_timeout)
        .await
        .with_context(|| format!("Failed to open '{input}'"))?;

    // ── Run conversion ───────────────────────────────────────────────────
    let spinner = (!cli.quiet && !cli.json).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Rendering");
        bar.set_message(format!("page {} of {}", options.page_number, file.name()));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let result = converter.convert(Some(&file), &options).await;

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
        println!("{json}");
        if let Some(error) = &result.error {
            anyhow::bail!("Conversion failed: {error}");
        }
        return Ok(());
    }

    let png = match result.into_result() {
        Ok(png) => png,
        Err(e) => {
            if !cli.quiet {
                eprintln!("{} {}", red("✘"), e);
            }
            return Err(e).context("Conversion failed");
        }
    };

    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(png.name()));
    write_atomic(&output_path, png.bytes())
        .await
        .context("Failed to write PNG")?;

    if !cli.quiet {
        eprintln!(
            "{}  page {}  {}  →  {}",
            green("✔"),
            options.page_number,
            dim(&format!("{} bytes", png.size())),
            bold(&output_path.display().to_string()),
        );
    }

    Ok(())
}

/// The loader the CLI converts with: `--worker-src` overrides the
/// environment, which overrides the built-in defaults.
fn build_loader(cli: &Cli) -> EngineLoader {
    let mut config = LoaderConfig::from_env();
    if let Some(src) = &cli.worker_src {
        config = config.worker_src(ResourceLocation::parse(src));
    }
    let module: Arc<dyn EngineModule> = Arc::new(PdfiumModule::new());
    EngineLoader::new(module, config)
}

async fn run_check(converter: &Converter, json: bool) -> Result<()> {
    let loader = converter.loader();
    let worker = loader.check_worker_resource().await;
    let engine = loader.probe_engine().await;

    if json {
        let report = serde_json::json!({ "worker": worker, "engine": engine });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise check report")?
        );
    } else {
        println!(
            "Local worker:  {} {}",
            if worker.exists { green("found") } else { dim("missing") },
            worker.url.as_deref().unwrap_or("(none configured)")
        );
        match (&engine.worker_src, &engine.error) {
            (Some(src), _) => println!(
                "Engine:        {} {} via {}",
                green("ready"),
                engine.engine.as_deref().unwrap_or("?"),
                src
            ),
            (None, Some(error)) => println!("Engine:        {} {}", red("unavailable"), error),
            (None, None) => println!("Engine:        {}", red("unavailable")),
        }
    }

    if !engine.available {
        anyhow::bail!("PDF engine is not available");
    }
    Ok(())
}
