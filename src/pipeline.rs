//! Batch driver
//!
//! Work over a corpus runs in two kinds of phases:
//! - parallel per-file phases (extraction, substitution, rendering) on a
//!   rayon pool, each worker reading one file and returning one result;
//! - the sequential fold between them, where the table is built and every
//!   identifier is allocated.
//!
//! Workers only see the immutable [`PipelineConfig`] and, when substituting,
//! a shared read-only table. A failing or panicking file is recorded in the
//! [`RunLog`] and never stops the batch.

use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use chrono::Local;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::comments::strip_comments;
use crate::core::inline::locate_inline;
use crate::core::locate::{count_display_math, locate_display};
use crate::registry::ExtractedEquation;
use crate::render::{render_document, RenderConfig};
use crate::substitute::EquationTable;
use crate::utils::error::{FileFailure, TexeqError, TexeqResult};
use crate::utils::files::{read_document, write_document};

/// How documents are arranged under the input directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Documents directly inside the input directory
    #[default]
    Flat,
    /// One level of subfolders, each holding documents
    Parent,
}

/// Where rewritten documents go.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
    /// Overwrite the input files
    #[default]
    InPlace,
    /// Same relative paths under another root
    Mirror(PathBuf),
}

/// Which math is extracted and substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MathMode {
    #[default]
    Display,
    Inline,
}

impl fmt::Display for MathMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MathMode::Display => write!(f, "display"),
            MathMode::Inline => write!(f, "inline"),
        }
    }
}

/// What substitution does with a document without recognised math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoMathPolicy {
    /// Leave the output unwritten
    #[default]
    Skip,
    /// Copy the document to its output path unchanged
    WriteUnchanged,
}

/// Run configuration, built once and shared by reference with every worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub layout: Layout,
    pub output: OutputTarget,
    pub mode: MathMode,
    pub no_math: NoMathPolicy,
    /// Worker count; `None` uses the available parallelism
    pub threads: Option<usize>,
    /// Document extension, without the dot
    pub extension: String,
}

impl PipelineConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            layout: Layout::default(),
            output: OutputTarget::default(),
            mode: MathMode::default(),
            no_math: NoMathPolicy::default(),
            threads: None,
            extension: "tex".to_string(),
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_output(mut self, output: OutputTarget) -> Self {
        self.output = output;
        self
    }

    pub fn with_mode(mut self, mode: MathMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_no_math(mut self, policy: NoMathPolicy) -> Self {
        self.no_math = policy;
        self
    }

    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// Output path of an input document.
    pub fn output_path(&self, file: &Path) -> PathBuf {
        match &self.output {
            OutputTarget::InPlace => file.to_path_buf(),
            OutputTarget::Mirror(root) => {
                let relative = file
                    .strip_prefix(&self.input)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| file.file_name().map(PathBuf::from).unwrap_or_default());
                root.join(relative)
            }
        }
    }

    fn thread_pool(&self) -> TexeqResult<rayon::ThreadPool> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads.unwrap_or(0))
            .build()?)
    }
}

/// Sorted list of the documents of a corpus.
pub fn collect_documents(root: &Path, layout: Layout, extension: &str) -> TexeqResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(TexeqError::NotADirectory(root.to_path_buf()));
    }

    let dirs = match layout {
        Layout::Flat => vec![root.to_path_buf()],
        Layout::Parent => read_dir_paths(root)?
            .into_iter()
            .filter(|p| p.is_dir())
            .collect(),
    };

    let mut files = Vec::new();
    for dir in dirs {
        files.extend(read_dir_paths(&dir)?.into_iter().filter(|p| {
            p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(extension)
        }));
    }
    files.sort();
    Ok(files)
}

fn read_dir_paths(dir: &Path) -> TexeqResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| TexeqError::io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        paths.push(entry.map_err(|e| TexeqError::io(dir, e))?.path());
    }
    Ok(paths)
}

/// Equations of one document, in document order, comments excluded.
pub fn extract_document(text: &str, mode: MathMode) -> Vec<ExtractedEquation> {
    let stripped = strip_comments(text);
    let located = match mode {
        MathMode::Display => locate_display(&stripped),
        MathMode::Inline => locate_inline(&stripped),
    };
    located.into_iter().map(ExtractedEquation::from).collect()
}

/// Whether a document contains display math outside comments.
pub fn has_math(text: &str) -> bool {
    count_display_math(text) > 0
}

/// Result of one file in a parallel phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport<T> {
    pub path: PathBuf,
    pub outcome: Result<T, FileFailure>,
}

/// Successful per-file outcomes of the writing phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FileSuccess {
    Substituted { replaced: usize, missed: usize },
    Rendered,
    AlreadyGenerated,
}

/// Run `work` on every file in parallel. Reports come back in input order.
fn run_per_file<T, F>(pool: &rayon::ThreadPool, files: &[PathBuf], work: F) -> Vec<FileReport<T>>
where
    T: Send,
    F: Fn(&Path) -> Result<T, FileFailure> + Sync,
{
    pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(path.as_path())))
                    .unwrap_or_else(|payload| {
                        Err(FileFailure::Panicked {
                            message: panic_message(payload.as_ref()),
                        })
                    });
                match &outcome {
                    Ok(_) => debug!("{}: done", path.display()),
                    Err(failure) => warn!("{}: {}", path.display(), failure),
                }
                FileReport {
                    path: path.clone(),
                    outcome,
                }
            })
            .collect()
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Parallel extraction over the corpus.
pub fn extract_corpus(config: &PipelineConfig) -> TexeqResult<Vec<FileReport<Vec<ExtractedEquation>>>> {
    let files = collect_documents(&config.input, config.layout, &config.extension)?;
    let pool = config.thread_pool()?;
    info!(
        "Extracting {} math from {} files on {} threads",
        config.mode,
        files.len(),
        pool.current_num_threads()
    );
    Ok(run_per_file(&pool, &files, |path| {
        let text = read_document(path)?;
        Ok(extract_document(&text, config.mode))
    }))
}

/// Build a table: parallel extraction, then a sequential fold in sorted file
/// order. A resumed table keeps its identifiers and numbering continues
/// after them.
pub fn enumerate(
    config: &PipelineConfig,
    resume: Option<EquationTable>,
) -> TexeqResult<(EquationTable, RunLog)> {
    let reports = extract_corpus(config)?;
    let mut table = resume.unwrap_or_else(|| EquationTable::empty(config.mode));
    let mut log = RunLog::new("enumerate");
    let before = table.len();

    for report in &reports {
        log.record(report);
        if let Ok(equations) = &report.outcome {
            table.fold_document(equations);
        }
    }

    info!(
        "Registered {} new equations ({} total) from {} files",
        table.len() - before,
        table.len(),
        reports.len()
    );
    Ok((table, log))
}

/// Rewrite every document with identifiers from `table`.
pub fn substitute_corpus(config: &PipelineConfig, table: &EquationTable) -> TexeqResult<RunLog> {
    let files = collect_documents(&config.input, config.layout, &config.extension)?;
    let pool = config.thread_pool()?;
    if config.output == OutputTarget::InPlace {
        warn!("Rewriting documents under {} in place", config.input.display());
    }
    info!("Substituting {} math in {} files", table.mode(), files.len());

    let reports = run_per_file(&pool, &files, |path| {
        let text = read_document(path)?;
        let substitution = table.substitute(&text);
        let out = config.output_path(path);

        if !substitution.found_math() {
            if config.no_math == NoMathPolicy::WriteUnchanged && out != path {
                write_document(&out, &text)?;
            }
            return Err(FileFailure::NoMathFound);
        }

        write_document(&out, &substitution.text)?;
        Ok(FileSuccess::Substituted {
            replaced: substitution.replaced,
            missed: substitution.missed,
        })
    });

    Ok(RunLog::from_reports("substitute", &reports))
}

/// Render every math-bearing document to `<stem>.xhtml` under the output root.
pub fn render_corpus(config: &PipelineConfig, render: &RenderConfig) -> TexeqResult<RunLog> {
    let files = collect_documents(&config.input, config.layout, &config.extension)?;
    let pool = config.thread_pool()?;

    info!("Generating list of files with math...");
    let candidates: Vec<PathBuf> = pool.install(|| {
        files
            .par_iter()
            .filter(|path| read_document(path).map_or(true, |text| has_math(&text)))
            .cloned()
            .collect()
    });
    info!("{} of {} files contain math", candidates.len(), files.len());

    let reports = run_per_file(&pool, &candidates, |path| {
        let out = config.output_path(path).with_extension("xhtml");
        if out.exists() {
            info!("{}: Already generated", path.display());
            return Ok(FileSuccess::AlreadyGenerated);
        }
        let text = read_document(path)?;
        let xhtml = render_document(render, &text)?;
        write_document(&out, &xhtml)?;
        Ok(FileSuccess::Rendered)
    });

    Ok(RunLog::from_reports("render", &reports))
}

/// One failed file in a run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedFailure {
    pub file: PathBuf,
    pub failure: FileFailure,
    pub message: String,
}

impl fmt::Display for LoggedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.message)
    }
}

/// Aggregate log of one run, written once at the end.
#[derive(Debug, Clone, Serialize)]
pub struct RunLog {
    pub operation: String,
    /// RFC 3339 start time
    pub started: String,
    pub processed: usize,
    pub failures: Vec<LoggedFailure>,
}

impl RunLog {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            started: Local::now().to_rfc3339(),
            processed: 0,
            failures: Vec::new(),
        }
    }

    pub fn from_reports<T>(operation: &str, reports: &[FileReport<T>]) -> Self {
        let mut log = Self::new(operation);
        for report in reports {
            log.record(report);
        }
        log
    }

    pub fn record<T>(&mut self, report: &FileReport<T>) {
        self.processed += 1;
        if let Err(failure) = &report.outcome {
            self.failures.push(LoggedFailure {
                file: report.path.clone(),
                message: failure.to_string(),
                failure: failure.clone(),
            });
        }
    }

    pub fn succeeded(&self) -> usize {
        self.processed - self.failures.len()
    }

    /// Plain-text form: a header line, then one `<file>: <reason>` per failure.
    pub fn render(&self) -> String {
        let mut out = format!(
            "# texeq {} started {}: {} files, {} succeeded, {} failed\n",
            self.operation,
            self.started,
            self.processed,
            self.succeeded(),
            self.failures.len()
        );
        for failure in &self.failures {
            out.push_str(&failure.to_string());
            out.push('\n');
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> TexeqResult<()> {
        write_document(path, &self.render())
    }

    /// JSON run report.
    pub fn write_report(&self, path: &Path) -> TexeqResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_document(path, &json)
    }
}
