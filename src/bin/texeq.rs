//! texeq CLI - equation enumeration, substitution and rendering for LaTeX corpora

#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand};
#[cfg(feature = "cli")]
use std::ffi::OsString;
#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};
#[cfg(feature = "cli")]
use std::time::Duration;
#[cfg(feature = "cli")]
use texeq::{
    enumerate, render_corpus, substitute_corpus,
    utils::files::sibling_log_path,
    EquationTable, Layout, MathMode, NoMathPolicy, OutputTarget, PipelineConfig, RenderConfig,
    RunLog, TexeqResult,
};
#[cfg(feature = "cli")]
use tracing::{error, info};
#[cfg(feature = "cli")]
use tracing_subscriber::EnvFilter;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "texeq")]
#[command(version)]
#[command(about = "texeq - Equation enumeration and identifier substitution for LaTeX corpora", long_about = None)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct RunOptions {
    /// Input directory holds one level of subfolders of documents
    #[arg(long)]
    parent: bool,

    /// Worker threads (defaults to available parallelism)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Run log path
    #[arg(long)]
    log: Option<PathBuf>,

    /// Also write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[cfg(feature = "cli")]
impl RunOptions {
    fn layout(&self) -> Layout {
        if self.parent {
            Layout::Parent
        } else {
            Layout::Flat
        }
    }
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Build an equation table from a corpus
    Enumerate {
        /// Input directory
        directory: PathBuf,

        /// Table file to write
        outfile: PathBuf,

        /// Enumerate inline `$...$` math instead of display math
        #[arg(long)]
        inline: bool,

        /// Continue numbering from an existing table
        #[arg(long)]
        resume: Option<PathBuf>,

        #[command(flatten)]
        run: RunOptions,
    },

    /// Replace equations with their identifiers
    Substitute {
        /// Table written by `enumerate`
        table: PathBuf,

        /// Input directory
        directory: PathBuf,

        /// Output directory (rewrites the input in place if omitted)
        #[arg(short, long)]
        outpath: Option<PathBuf>,

        /// Substitute inline `$...$` math instead of display math
        #[arg(long)]
        inline: bool,

        /// Copy documents without math to the output unchanged
        #[arg(long)]
        write_unchanged: bool,

        #[command(flatten)]
        run: RunOptions,
    },

    /// Render the display math of each document to XHTML
    Render {
        /// Input directory
        directory: PathBuf,

        /// Output directory (defaults to `<directory>_converted`)
        outdir: Option<PathBuf>,

        /// Conversion stage timeout in seconds
        #[arg(long, default_value_t = 120)]
        timeout_convert: u64,

        /// Postprocessing stage timeout in seconds
        #[arg(long, default_value_t = 60)]
        timeout_post: u64,

        #[command(flatten)]
        run: RunOptions,
    },

    /// Show version and feature info
    Info,
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = handle_command(cli.command) {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(feature = "cli")]
fn handle_command(cmd: Commands) -> TexeqResult<()> {
    match cmd {
        Commands::Enumerate {
            directory,
            outfile,
            inline,
            resume,
            run,
        } => {
            let mode = math_mode(inline);
            let config = PipelineConfig::new(&directory)
                .with_layout(run.layout())
                .with_mode(mode)
                .with_threads(run.threads);

            let resume = match resume {
                Some(path) => {
                    let table = EquationTable::load(&path, mode)?;
                    info!("Resuming from {} ({} entries)", path.display(), table.len());
                    Some(table)
                }
                None => None,
            };

            info!("Beginning processing of {}", directory.display());
            let (table, log) = enumerate(&config, resume)?;
            table.save(&outfile)?;
            info!("Wrote {} entries to {}", table.len(), outfile.display());

            finish(&log, run.log.unwrap_or_else(|| sibling_log_path(&outfile)), run.report)
        }

        Commands::Substitute {
            table,
            directory,
            outpath,
            inline,
            write_unchanged,
            run,
        } => {
            let mode = math_mode(inline);
            let equations = EquationTable::load(&table, mode)?;
            info!("Loaded {} entries from {}", equations.len(), table.display());

            let log_path = run
                .log
                .clone()
                .unwrap_or_else(|| sibling_log_path(outpath.as_deref().unwrap_or(directory.as_path())));
            let output = match outpath {
                Some(dir) => OutputTarget::Mirror(dir),
                None => OutputTarget::InPlace,
            };
            let no_math = if write_unchanged {
                NoMathPolicy::WriteUnchanged
            } else {
                NoMathPolicy::Skip
            };
            let config = PipelineConfig::new(&directory)
                .with_layout(run.layout())
                .with_mode(mode)
                .with_output(output)
                .with_no_math(no_math)
                .with_threads(run.threads);

            let log = substitute_corpus(&config, &equations)?;
            finish(&log, log_path, run.report)
        }

        Commands::Render {
            directory,
            outdir,
            timeout_convert,
            timeout_post,
            run,
        } => {
            let outdir = outdir.unwrap_or_else(|| converted_dir(&directory));
            let render = RenderConfig::from_env().with_timeouts(
                Duration::from_secs(timeout_convert),
                Duration::from_secs(timeout_post),
            );
            let config = PipelineConfig::new(&directory)
                .with_layout(run.layout())
                .with_output(OutputTarget::Mirror(outdir.clone()))
                .with_threads(run.threads);

            info!("Beginning processing of {}", directory.display());
            let log = render_corpus(&config, &render)?;
            finish(&log, run.log.unwrap_or_else(|| sibling_log_path(&outdir)), run.report)
        }

        Commands::Info => {
            println!("texeq - Equation enumeration and identifier substitution for LaTeX corpora");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Features:");
            println!("  ✓ Display math: equation, multline, gather, align, flalign, math, \\[..\\], $$..$$");
            println!("  ✓ Inline math: $..$ runs");
            println!("  ✓ Whitespace- and comment-insensitive deduplication");
            println!("  ✓ Grouped equations split into individually numbered rows");
            println!("  ✓ Resumable tab-delimited equation tables");
            println!("  ✓ Parallel substitution with in-place or mirrored output");
            println!("  ✓ XHTML rendering through an external two-stage toolchain");
            println!();
            println!("Identifiers:");
            println!("  EQDS<n>Q  single display equation");
            println!("  EQDM<n>Q  grouped display equation");
            println!("  EQI<n>Q   inline equation");
            println!();
            println!("Environment:");
            println!("  TEXEQ_LATEXML      conversion command (default: latexml -)");
            println!("  TEXEQ_LATEXMLPOST  postprocessing command (default: latexmlpost --format=xhtml -)");
            println!();
            Ok(())
        }
    }
}

#[cfg(feature = "cli")]
fn math_mode(inline: bool) -> MathMode {
    if inline {
        MathMode::Inline
    } else {
        MathMode::Display
    }
}

/// `<directory>_converted` next to the input directory.
#[cfg(feature = "cli")]
fn converted_dir(directory: &Path) -> PathBuf {
    let normalized: PathBuf = directory.components().collect();
    let mut name: OsString = normalized.into_os_string();
    name.push("_converted");
    PathBuf::from(name)
}

#[cfg(feature = "cli")]
fn finish(log: &RunLog, log_path: PathBuf, report: Option<PathBuf>) -> TexeqResult<()> {
    log.write_to(&log_path)?;
    if let Some(report) = report {
        log.write_report(&report)?;
    }
    info!(
        "Processing complete: {} succeeded, {} failed (log: {})",
        log.succeeded(),
        log.failures.len(),
        log_path.display()
    );
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Build with --features cli");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  cargo install texeq --features cli");
    eprintln!("  texeq <enumerate|substitute|render|info> [OPTIONS]");
}
