//! Rendering toolchain interface
//!
//! Equations are rendered by an external two-stage toolchain (by default
//! LaTeXML): stage one turns a minimal document into intermediate markup,
//! stage two turns that into XHTML. Both read stdin and write stdout. Each
//! stage runs under a hard wall-clock timeout; on expiry the child is killed.
//!
//! Every failure is one of [`RenderFailure`]'s variants so batch callers can
//! record it per file and move on.

use std::env;
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::core::comments::strip_comments;
use crate::core::locate::grab_math;
use crate::utils::error::{FileFailure, RenderFailure, RenderStage, TexeqError, TexeqResult};

lazy_static! {
    static ref DOC_BODY: Regex =
        Regex::new(r"(?s)\\begin\{document\}.*?\\end\{document\}").expect("valid regex literal");
    static ref USEPACKAGE: Regex =
        Regex::new(r"(?s)\\usepackage(?:\[.*?\])?\{.*?\}").expect("valid regex literal");
    static ref DOCCLASS: Regex =
        Regex::new(r"\\documentclass(?:\[.*?\])?\{.*?\}").expect("valid regex literal");
    static ref BRACED: Regex = Regex::new(r"\{.*?\}").expect("valid regex literal");
    /// Two inline pairs glued together, `$a$$b$`, with their neighbours.
    static ref GLUED_PAIRS: Regex =
        Regex::new(r"(?s)([^$])(\$[^$]*?\$)(\$[^$]*?\$)([^$])").expect("valid regex literal");
}

/// Environment variable overriding the conversion command.
pub const CONVERT_ENV: &str = "TEXEQ_LATEXML";
/// Environment variable overriding the postprocessing command.
pub const POST_ENV: &str = "TEXEQ_LATEXMLPOST";

/// One toolchain stage: program, arguments and its time budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl StageCommand {
    pub fn new(program: impl Into<String>, args: &[&str], timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout,
        }
    }

    /// Parse a whitespace-separated command line. `None` for a blank line.
    pub fn parse(command_line: &str, timeout: Duration) -> Option<Self> {
        let mut words = command_line.split_whitespace();
        let program = words.next()?;
        Some(Self {
            program: program.to_string(),
            args: words.map(str::to_string).collect(),
            timeout,
        })
    }

    /// Run `script` through `sh -c`.
    pub fn shell(script: &str, timeout: Duration) -> Self {
        Self::new("sh", &["-c", script], timeout)
    }
}

/// Configuration of the two rendering stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    pub convert: StageCommand,
    pub post: StageCommand,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            convert: StageCommand::new("latexml", &["-"], Duration::from_secs(120)),
            post: StageCommand::new(
                "latexmlpost",
                &["--format=xhtml", "-"],
                Duration::from_secs(60),
            ),
        }
    }
}

impl RenderConfig {
    /// Defaults, with commands overridden from [`CONVERT_ENV`] / [`POST_ENV`].
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(cmd) = env::var(CONVERT_ENV)
            .ok()
            .and_then(|line| StageCommand::parse(&line, config.convert.timeout))
        {
            config.convert = cmd;
        }
        if let Some(cmd) = env::var(POST_ENV)
            .ok()
            .and_then(|line| StageCommand::parse(&line, config.post.timeout))
        {
            config.post = cmd;
        }
        config
    }

    pub fn with_timeouts(mut self, convert: Duration, post: Duration) -> Self {
        self.convert.timeout = convert;
        self.post.timeout = post;
        self
    }
}

/// Build the minimal document sent to the first stage: document class
/// (renamed to `article`, options kept), every `\usepackage`, and the display
/// math of the document body.
pub fn build_render_request(document: &str) -> TexeqResult<String> {
    let text = strip_comments(document);
    let text = GLUED_PAIRS.replace_all(&text, "${1}${2} ${3}${4}");

    let body = DOC_BODY
        .find(&text)
        .ok_or(TexeqError::MissingDocumentBody)?
        .as_str();

    let docclass = match DOCCLASS.find(&text) {
        Some(m) => format!("{}\n", BRACED.replace_all(m.as_str(), "{article}")),
        None => "\\documentclass{article}\n".to_string(),
    };

    let mut parts = vec![docclass];
    parts.extend(USEPACKAGE.find_iter(&text).map(|m| m.as_str().to_string()));
    parts.push("\\begin{document}\n".to_string());
    parts.extend(grab_math(body));
    parts.push("\\end{document}".to_string());
    Ok(parts.join("\n"))
}

const EXIT_POLL: Duration = Duration::from_millis(10);

/// Run one stage, feeding `input` on stdin and collecting stdout.
pub fn run_stage(
    stage: RenderStage,
    command: &StageCommand,
    input: &[u8],
) -> Result<Vec<u8>, RenderFailure> {
    let transport = |err: io::Error| RenderFailure::Transport {
        stage,
        message: err.to_string(),
    };

    let deadline = Instant::now() + command.timeout;
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(transport)?;

    let (Some(mut stdin), Some(mut stdout)) = (child.stdin.take(), child.stdout.take()) else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(transport(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "child pipes unavailable",
        )));
    };

    // The child may stop reading early; a failed write surfaces as empty
    // or partial output instead.
    let payload = input.to_vec();
    thread::spawn(move || {
        let _ = stdin.write_all(&payload);
    });

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = tx.send(stdout.read_to_end(&mut buf).map(|_| buf));
    });

    let output = match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(transport(err));
        }
        Err(_) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RenderFailure::Timeout { stage });
        }
    };

    // Closing stdout does not mean the child is done; the exit wait shares
    // the same deadline.
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RenderFailure::Timeout { stage });
            }
            Ok(None) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                thread::sleep(EXIT_POLL.min(remaining));
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(transport(err));
            }
        }
    };
    if !status.success() {
        debug!("{} exited with {}", command.program, status);
    }

    if output.iter().all(u8::is_ascii_whitespace) {
        return Err(RenderFailure::EmptyOutput { stage });
    }
    Ok(output)
}

/// Render one full document to XHTML.
pub fn render_document(config: &RenderConfig, document: &str) -> Result<String, FileFailure> {
    let request = build_render_request(document)?;
    let intermediate = run_stage(RenderStage::Convert, &config.convert, request.as_bytes())?;
    let xhtml = run_stage(RenderStage::Post, &config.post, &intermediate)?;
    Ok(String::from_utf8_lossy(&xhtml).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = "\\documentclass[12pt]{revtex4}\n\
\\usepackage{amsmath}\n\
\\usepackage[utf8]{inputenc}\n\
\\begin{document}\n\
Text $a$$b$ here.\n\
\\begin{equation}\n\
x = 1\n\
\\end{equation}\n\
% \\[ hidden \\]\n\
\\end{document}\n";

    #[test]
    fn test_request_layout() {
        let request = build_render_request(DOC).expect("document has a body");
        assert_eq!(
            request,
            "\\documentclass[12pt]{article}\n\n\
\\usepackage{amsmath}\n\
\\usepackage[utf8]{inputenc}\n\
\\begin{document}\n\n\
\\begin{equation}\nx = 1\n\\end{equation}\n\n\
\\end{document}"
        );
    }

    #[test]
    fn test_request_default_docclass() {
        let request =
            build_render_request("\\begin{document}\\[y\\]\\end{document}").expect("body");
        assert!(request.starts_with("\\documentclass{article}\n"));
        assert!(request.contains("\\[y\\]\n"));
    }

    #[test]
    fn test_request_requires_body() {
        let err = build_render_request("\\[x\\] without a body").unwrap_err();
        assert!(matches!(err, TexeqError::MissingDocumentBody));
    }

    #[test]
    fn test_glued_pairs_are_separated() {
        let text = GLUED_PAIRS.replace_all(" $a$$b$ ", "${1}${2} ${3}${4}");
        assert_eq!(text, " $a$ $b$ ");
    }

    #[test]
    fn test_parse_command_line() {
        let cmd = StageCommand::parse("latexmlpost --format=html5 -", Duration::from_secs(1))
            .expect("non-blank");
        assert_eq!(cmd.program, "latexmlpost");
        assert_eq!(cmd.args, vec!["--format=html5", "-"]);
        assert!(StageCommand::parse("   ", Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_missing_program_is_transport_failure() {
        let cmd = StageCommand::new("texeq-no-such-program", &[], Duration::from_secs(5));
        let err = run_stage(RenderStage::Convert, &cmd, b"x").unwrap_err();
        assert!(matches!(err, RenderFailure::Transport { .. }));
        assert!(!err.is_retryable());
    }

    #[cfg(unix)]
    #[test]
    fn test_stage_echoes_stdin() {
        let cmd = StageCommand::new("cat", &[], Duration::from_secs(10));
        let out = run_stage(RenderStage::Post, &cmd, b"<math/>").expect("cat succeeds");
        assert_eq!(out, b"<math/>".to_vec());
    }

    #[cfg(unix)]
    #[test]
    fn test_stage_timeout_kills_child() {
        let cmd = StageCommand::shell("exec sleep 5", Duration::from_millis(100));
        let err = run_stage(RenderStage::Convert, &cmd, b"").unwrap_err();
        assert_eq!(
            err,
            RenderFailure::Timeout {
                stage: RenderStage::Convert
            }
        );
        assert_eq!(err.to_string(), "MathML conversion failed - timeout");
    }

    #[cfg(unix)]
    #[test]
    fn test_stage_timeout_after_stdout_closes() {
        let cmd = StageCommand::shell("exec >&-; sleep 5", Duration::from_millis(200));
        let started = Instant::now();
        let err = run_stage(RenderStage::Post, &cmd, b"").unwrap_err();
        assert_eq!(
            err,
            RenderFailure::Timeout {
                stage: RenderStage::Post
            }
        );
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_blank_output_is_empty_failure() {
        let cmd = StageCommand::shell("cat >/dev/null; echo", Duration::from_secs(10));
        let err = run_stage(RenderStage::Post, &cmd, b"x").unwrap_err();
        assert!(matches!(err, RenderFailure::EmptyOutput { .. }));
    }
}
