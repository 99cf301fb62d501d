//! CLI binary for doctriage.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ClassifierConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use doctriage::{
    build_dataset, dataset_statistics, extract_text, normalize, save_dataset,
    ClassificationResult, Classifier, ClassifierConfig, DatasetOptions, DatasetProgressCallback,
    ExtractionOutcome, ModelArtifact, NormalizerConfig, Outcome, ProgressCallback,
};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress for `doctriage dataset`: one bar over all files, with a
/// log line above it for every skipped file.
struct CliProgressCallback {
    bar: ProgressBar,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Scanning");
        bar.set_message("Listing files…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            skipped: AtomicUsize::new(0),
        })
    }
}

impl DatasetProgressCallback for CliProgressCallback {
    fn on_start(&self, total_files: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_files as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn on_file_complete(&self, path: &Path, label: &str, _text_len: usize) {
        self.bar.set_message(format!("{label}/{}", file_name(path)));
        self.bar.inc(1);
    }

    fn on_file_skipped(&self, path: &Path, reason: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "{} {}  {}",
            red("✘"),
            path.display(),
            dim(reason)
        ));
        self.bar.inc(1);
    }

    fn on_complete(&self, total_files: usize, kept: usize) {
        self.bar.finish_and_clear();
        let skipped = self.skipped.load(Ordering::SeqCst);
        if skipped == 0 {
            eprintln!("{} {} files extracted", green("✔"), bold(&kept.to_string()));
        } else {
            eprintln!(
                "{} {}/{} files extracted  ({} skipped)",
                if kept == 0 { red("✘") } else { cyan("⚠") },
                bold(&kept.to_string()),
                total_files,
                red(&skipped.to_string()),
            );
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Classify a few uploads
  doctriage classify --model model.json scan.png statement.pdf sheet.xlsx

  # Machine-readable output
  doctriage classify --model model.json --json upload.pdf > result.json

  # Refuse weak predictions
  doctriage classify --model model.json --min-confidence 0.6 upload.pdf

  # Show what the classifier sees
  doctriage extract upload.pdf
  doctriage extract --raw photo.jpg

  # Build a training set from one folder per label
  doctriage dataset data/ -o dataset.json

SUPPORTED FILES:
  .pdf              text layer, OCR for pages without one
  .png .jpg        OCR
  .docx             paragraphs
  .xlsx             every sheet, as a text table

ENVIRONMENT VARIABLES:
  DOCTRIAGE_MODEL         Model artifact path for `classify`
  DOCTRIAGE_TESSERACT     tesseract executable (default: tesseract on PATH)
  DOCTRIAGE_OCR_LANG      tesseract language (default: eng)
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Overrides the log filter (e.g. doctriage=debug)
"#;

/// Classify uploaded documents by their text.
#[derive(Parser, Debug)]
#[command(
    name = "doctriage",
    version,
    about = "Classify PDF, image, Word and Excel documents with a trained text model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCTRIAGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except results and errors.
    #[arg(short, long, global = true, env = "DOCTRIAGE_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "DOCTRIAGE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one or more documents.
    Classify {
        /// Files to classify.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Model artifact (JSON).
        #[arg(short, long, env = "DOCTRIAGE_MODEL")]
        model: PathBuf,

        /// Report "unknown" when the best class scores below this (0.0–1.0).
        #[arg(long, env = "DOCTRIAGE_MIN_CONFIDENCE")]
        min_confidence: Option<f64>,

        /// Documents classified at once.
        #[arg(short, long, env = "DOCTRIAGE_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,

        /// Output a JSON array of results.
        #[arg(long, env = "DOCTRIAGE_JSON")]
        json: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Print the text extracted from a document.
    Extract {
        file: PathBuf,

        /// Print extracted text as-is instead of normalised.
        #[arg(long)]
        raw: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Build a labelled `[[text, label], ...]` dataset from one folder per label.
    Dataset {
        /// Root directory; each sub-directory name is a label.
        dir: PathBuf,

        /// Output JSON file.
        #[arg(short, long, default_value = "dataset.json")]
        output: PathBuf,

        /// Files extracted at once.
        #[arg(short, long, env = "DOCTRIAGE_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,

        /// Keep full words instead of stemming them.
        #[arg(long)]
        no_stem: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

/// Extraction settings shared by every subcommand.
#[derive(Args, Debug)]
struct EngineArgs {
    /// Whole-document extraction timeout in seconds.
    #[arg(long, env = "DOCTRIAGE_EXTRACTION_TIMEOUT", default_value_t = 120)]
    extraction_timeout: u64,

    /// Per-image OCR timeout in seconds.
    #[arg(long, env = "DOCTRIAGE_OCR_TIMEOUT", default_value_t = 60)]
    ocr_timeout: u64,

    /// tesseract language code(s), e.g. eng or eng+deu.
    #[arg(long, env = "DOCTRIAGE_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// tesseract page segmentation mode (0–13).
    #[arg(long, env = "DOCTRIAGE_OCR_PSM", default_value_t = 6,
          value_parser = clap::value_parser!(u8).range(0..=13))]
    ocr_psm: u8,

    /// tesseract executable.
    #[arg(long, env = "DOCTRIAGE_TESSERACT", default_value = "tesseract")]
    tesseract_path: PathBuf,

    /// Longest edge, in pixels, of PDF pages rendered for OCR.
    #[arg(long, env = "DOCTRIAGE_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Largest accepted upload in bytes.
    #[arg(long, env = "DOCTRIAGE_MAX_UPLOAD_BYTES", default_value_t = doctriage::config::DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// Largest decompressed docx/xlsx part in bytes.
    #[arg(long, env = "DOCTRIAGE_MAX_OFFICE_PART_BYTES", default_value_t = doctriage::config::DEFAULT_MAX_OFFICE_PART_BYTES)]
    max_office_part_bytes: u64,

    /// Parent directory for per-document scratch space.
    #[arg(long, env = "DOCTRIAGE_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// libpdfium file or directory (else PDFIUM_LIB_PATH, ./, system).
    #[arg(long, env = "DOCTRIAGE_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The dataset progress bar replaces INFO logs; verbose always wins.
    let show_progress =
        !cli.quiet && !cli.no_progress && matches!(cli.command, Command::Dataset { .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Classify {
            files,
            model,
            min_confidence,
            concurrency,
            json,
            engine,
        } => {
            let config = build_config(&engine, min_confidence)?;
            run_classify(files, &model, config, concurrency, json, cli.quiet).await
        }
        Command::Extract { file, raw, engine } => {
            let config = build_config(&engine, None)?;
            run_extract(&file, raw, &config).await
        }
        Command::Dataset {
            dir,
            output,
            concurrency,
            no_stem,
            engine,
        } => {
            let config = build_config(&engine, None)?;
            let mut normalizer = NormalizerConfig::training();
            normalizer.stem = !no_stem;
            let mut options = DatasetOptions::default()
                .with_config(config)
                .with_normalizer(normalizer)
                .with_concurrency(concurrency);
            if show_progress {
                let cb = CliProgressCallback::new();
                options = options.with_progress(cb as ProgressCallback);
            }
            run_dataset(&dir, &output, &options, cli.quiet).await
        }
    }
}

async fn run_classify(
    files: Vec<PathBuf>,
    model_path: &Path,
    config: ClassifierConfig,
    concurrency: usize,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let model = ModelArtifact::load(model_path)
        .with_context(|| format!("Failed to load model from {:?}", model_path))?;
    let classifier = Classifier::new(Arc::new(model), config);

    // `buffered` keeps results in argument order.
    let outcomes: Vec<(PathBuf, Result<ClassificationResult, doctriage::DoctriageError>)> =
        stream::iter(files.into_iter().map(|path| {
            let classifier = classifier.clone();
            async move {
                let result = classifier.classify_path(&path).await;
                (path, result)
            }
        }))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut unreadable = 0usize;
    let mut results = Vec::with_capacity(outcomes.len());
    for (path, outcome) in outcomes {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                unreadable += 1;
                eprintln!("{} {}", red("✘"), e);
                tracing::debug!("Could not read {:?}", path);
            }
        }
    }

    if json {
        let out = serde_json::to_string_pretty(&results).context("Failed to serialise results")?;
        println!("{out}");
    } else {
        for r in &results {
            println!("{}", describe(r));
        }
        if !quiet {
            let classified = results.iter().filter(|r| r.is_classified()).count();
            eprintln!(
                "{}",
                dim(&format!(
                    "{} classified, {} unknown or failed",
                    classified,
                    results.len() - classified
                ))
            );
        }
    }

    if unreadable > 0 {
        anyhow::bail!("{} input file(s) could not be read", unreadable);
    }
    Ok(())
}

/// One human-readable line per result.
fn describe(r: &ClassificationResult) -> String {
    match &r.outcome {
        Outcome::Classified { label } => format!(
            "{} {}  {}  {}",
            green("✔"),
            r.filename,
            bold(label),
            dim(&format!("p={:.2}", r.confidence().unwrap_or_default()))
        ),
        Outcome::Unknown { reason } => {
            let why = match &r.extraction_error {
                Some(e) => e.to_string(),
                None => serde_json::to_value(reason)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
            };
            format!(
                "{} {}  {}  {}",
                cyan("?"),
                r.filename,
                bold(&r.file_class),
                dim(&why)
            )
        }
        Outcome::Failed { error, detail, .. } => format!(
            "{} {}  {}  {}",
            red("✘"),
            r.filename,
            red(error.as_str()),
            dim(detail)
        ),
    }
}

async fn run_extract(file: &Path, raw: bool, config: &ClassifierConfig) -> Result<()> {
    let outcome = extract_text(file, config)
        .await
        .with_context(|| format!("Cannot extract {:?}", file))?;

    match outcome {
        ExtractionOutcome::Text(text) => {
            if raw {
                println!("{text}");
            } else {
                println!("{}", normalize(&text, &NormalizerConfig::training()));
            }
            Ok(())
        }
        ExtractionOutcome::Empty => {
            eprintln!("{} no text found in {}", cyan("⚠"), file.display());
            Ok(())
        }
        ExtractionOutcome::Failed(e) => {
            Err(anyhow::Error::new(e)).with_context(|| format!("Extraction failed for {:?}", file))
        }
    }
}

async fn run_dataset(
    dir: &Path,
    output: &Path,
    options: &DatasetOptions,
    quiet: bool,
) -> Result<()> {
    let rows = build_dataset(dir, options)
        .await
        .with_context(|| format!("Failed to build dataset from {:?}", dir))?;
    save_dataset(&rows, output)
        .await
        .context("Failed to write dataset")?;

    if !quiet {
        eprintln!(
            "{}  {} rows  →  {}",
            green("✔"),
            rows.len(),
            bold(&output.display().to_string())
        );
        for (label, count) in dataset_statistics(&rows) {
            eprintln!("   {:<24} {}", label, dim(&count.to_string()));
        }
    }
    Ok(())
}

/// Map CLI args to `ClassifierConfig`.
fn build_config(engine: &EngineArgs, min_confidence: Option<f64>) -> Result<ClassifierConfig> {
    let mut builder = ClassifierConfig::builder()
        .extraction_timeout_secs(engine.extraction_timeout)
        .ocr_timeout_secs(engine.ocr_timeout)
        .ocr_language(engine.ocr_lang.clone())
        .ocr_psm(engine.ocr_psm)
        .tesseract_path(engine.tesseract_path.clone())
        .max_rendered_pixels(engine.max_pixels)
        .max_upload_bytes(engine.max_upload_bytes)
        .max_office_part_bytes(engine.max_office_part_bytes);

    if let Some(p) = min_confidence {
        builder = builder.min_confidence(p);
    }
    if let Some(ref dir) = engine.temp_dir {
        builder = builder.temp_dir(dir.clone());
    }
    if let Some(ref lib) = engine.pdfium_lib {
        builder = builder.pdfium_library_path(lib.clone());
    }

    builder.build().context("Invalid configuration")
}
