//! Integration tests for texeq corpus runs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use texeq::{
    enumerate, flatten, render_corpus, split_display, split_inline, standardize,
    strip_comments, substitute_corpus, EquationRegistry, EquationTable, MathMode, NoMathPolicy,
    OutputTarget, PipelineConfig, RenderConfig, Span, StageCommand,
};

fn corpus(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for (name, text) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create corpus dirs");
        }
        fs::write(path, text).expect("write corpus file");
    }
    dir
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("read output")
}

fn table_text(table: &EquationTable) -> String {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("table.tsv");
    table.save(&path).expect("save table");
    read(&path)
}

// ============================================================================
// Splitting and canonical forms
// ============================================================================

mod properties {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOCS: &[&str] = &[
        "Intro.\n\\begin{equation}\n  E = mc^2 \\label{eq:e}\n\\end{equation}\nand \\[ x \\] done.",
        "No math, just 100\\% prose with a $ sign \\$ here.",
        "$$ a^2 + b^2 $$ then $x$$y$ and \\begin{align*}a &= 1 \\\\ b &= 2\\end{align*}",
        "",
        "\\begin{gather}\n\\begin{cases} 1 \\\\ 2 \\end{cases}\n\\end{gather} tail $$",
    ];

    #[test]
    fn test_split_round_trip() {
        for doc in DOCS {
            let stripped = strip_comments(doc);
            let display: String = split_display(&stripped).iter().map(Span::as_str).collect();
            assert_eq!(display, stripped);
            let inline: String = split_inline(&stripped).iter().map(Span::as_str).collect();
            assert_eq!(inline, stripped);
        }
    }

    #[test]
    fn test_flatten_idempotent() {
        for doc in DOCS {
            let stripped = strip_comments(doc);
            for span in split_display(&stripped) {
                if let Span::Math(eq) = span {
                    let once = flatten(eq.text);
                    assert_eq!(flatten(&once), once);
                    assert_eq!(flatten(&standardize(eq.text)), once);
                }
            }
        }
    }

    #[test]
    fn test_whitespace_insensitive() {
        let a = "\\begin{equation}\n  \\frac{a}{b} + c\n\\end{equation}";
        let b = "\\begin{equation}\\frac{a}{b}+c\\end{equation}";
        assert_eq!(flatten(a), flatten(b));
        assert_ne!(flatten(a), flatten("\\begin{equation}\\frac{a}{b}+d\\end{equation}"));
    }

    #[test]
    fn test_commented_equation_not_located() {
        let doc = "before\n\\begin{comment}\n\\begin{equation}x\\end{equation}\n\\end{comment}\nafter";
        let stripped = strip_comments(doc);
        let spans = split_display(&stripped);
        assert_eq!(spans.iter().filter(|s| s.is_math()).count(), 0);
    }
}

// ============================================================================
// Enumerate then substitute
// ============================================================================

mod corpus_runs {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identical_equation_across_files_shares_id() {
        let dir = corpus(&[
            ("a.tex", "First \\begin{equation}a+b\\end{equation} end.\n"),
            ("b.tex", "Second \\begin{equation}a+b\\end{equation} end.\n"),
        ]);
        let out = tempfile::tempdir().expect("tempdir");
        let config = PipelineConfig::new(dir.path());

        let (table, log) = enumerate(&config, None).expect("enumerate");
        assert!(log.failures.is_empty());
        assert_eq!(table_text(&table), "EQDS0Q\t\\\\begin{equation}\\na+b\\n\\\\end{equation}\n");

        let config = config.with_output(OutputTarget::Mirror(out.path().to_path_buf()));
        let log = substitute_corpus(&config, &table).expect("substitute");
        assert!(log.failures.is_empty());
        assert_eq!(read(&out.path().join("a.tex")), "First EQDS0Q end.\n");
        assert_eq!(read(&out.path().join("b.tex")), "Second EQDS0Q end.\n");
    }

    #[test]
    fn test_align_rows_registered_in_order() {
        let dir = corpus(&[(
            "paper.tex",
            "\\begin{align}\nx &= 1 \\\\\ny &= 2\n\\end{align}\n",
        )]);
        let (table, _) = enumerate(&PipelineConfig::new(dir.path()), None).expect("enumerate");
        let EquationTable::Display(registry) = &table else {
            panic!("display table expected");
        };
        let group = registry
            .entries()
            .find(|e| !e.members.is_empty())
            .expect("group entry");
        let members: Vec<String> = group.members.iter().map(|m| m.to_string()).collect();
        assert_eq!(group.id.to_string(), "EQDM0Q");
        assert_eq!(members, vec!["EQDS0Q", "EQDS1Q"]);
        assert_eq!(registry.single_count(), 2);
    }

    #[test]
    fn test_inline_run_substitutes_literal_text() {
        let dir = corpus(&[("a.tex", "Hello $x^2$ world, $a$$b$ too.\n")]);
        let config = PipelineConfig::new(dir.path()).with_mode(MathMode::Inline);
        let (table, _) = enumerate(&config, None).expect("enumerate");
        assert_eq!(table.len(), 3);

        substitute_corpus(&config, &table).expect("substitute in place");
        assert_eq!(
            read(&dir.path().join("a.tex")),
            "Hello EQI0Q world, EQI1QEQI2Q too.\n"
        );
    }

    #[test]
    fn test_no_math_is_logged_and_not_written() {
        let dir = corpus(&[("plain.tex", "Only words.\n")]);
        let out = tempfile::tempdir().expect("tempdir");
        let config = PipelineConfig::new(dir.path())
            .with_output(OutputTarget::Mirror(out.path().to_path_buf()));
        let table = EquationTable::empty(MathMode::Display);

        let log = substitute_corpus(&config, &table).expect("substitute");
        assert_eq!(log.failures.len(), 1);
        assert!(log.render().contains("plain.tex: no math found"));
        assert!(!out.path().join("plain.tex").exists());

        let config = config.with_no_math(NoMathPolicy::WriteUnchanged);
        substitute_corpus(&config, &table).expect("substitute");
        assert_eq!(read(&out.path().join("plain.tex")), "Only words.\n");
    }

    #[test]
    fn test_registry_miss_keeps_equation() {
        let dir = corpus(&[("a.tex", "See \\[ q \\] here.\n")]);
        let table = EquationTable::Display(EquationRegistry::new());
        substitute_corpus(&PipelineConfig::new(dir.path()), &table).expect("substitute");
        assert_eq!(read(&dir.path().join("a.tex")), "See \\[ q \\] here.\n");
    }

    #[test]
    fn test_surrounding_text_is_preserved() {
        let doc = "\\section{Intro} {braces} & tabs\t50\\% off.\n\\[ z \\]\nTrailing $ text.\n";
        let dir = corpus(&[("a.tex", doc)]);
        let config = PipelineConfig::new(dir.path());
        let (table, _) = enumerate(&config, None).expect("enumerate");
        substitute_corpus(&config, &table).expect("substitute");
        assert_eq!(
            read(&dir.path().join("a.tex")),
            "\\section{Intro} {braces} & tabs\t50\\% off.\nEQDS0Q\nTrailing $ text.\n"
        );
    }

    #[test]
    fn test_parent_layout_mirrors_subfolders() {
        let dir = corpus(&[
            ("x/one.tex", "\\[ a \\]\n"),
            ("y/two.tex", "\\[ b \\]\n"),
        ]);
        let out = tempfile::tempdir().expect("tempdir");
        let config = PipelineConfig::new(dir.path())
            .with_layout(texeq::Layout::Parent)
            .with_output(OutputTarget::Mirror(out.path().to_path_buf()));
        let (table, _) = enumerate(&config, None).expect("enumerate");
        substitute_corpus(&config, &table).expect("substitute");
        assert_eq!(read(&out.path().join("x/one.tex")), "EQDS0Q\n");
        assert_eq!(read(&out.path().join("y/two.tex")), "EQDS1Q\n");
    }
}

// ============================================================================
// Determinism and persistence
// ============================================================================

mod persistence {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> tempfile::TempDir {
        corpus(&[
            ("c.tex", "\\[ c \\] \\[ shared \\]"),
            ("a.tex", "\\[ a \\] \\[ shared \\]"),
            ("b.tex", "\\begin{gather} b_1 \\\\ b_2 \\end{gather}"),
        ])
    }

    #[test]
    fn test_ids_independent_of_thread_count() {
        let dir = sample();
        let serial = PipelineConfig::new(dir.path()).with_threads(Some(1));
        let parallel = PipelineConfig::new(dir.path()).with_threads(Some(4));
        let (a, _) = enumerate(&serial, None).expect("serial");
        let (b, _) = enumerate(&parallel, None).expect("parallel");
        assert_eq!(table_text(&a), table_text(&b));
        assert!(table_text(&a).starts_with("EQDS0Q\t\\\\begin{equation}\\na\\n"));
    }

    #[test]
    fn test_resume_continues_numbering() {
        let first = corpus(&[("a.tex", "\\[ a \\]")]);
        let (table, _) = enumerate(&PipelineConfig::new(first.path()), None).expect("first run");
        let saved = tempfile::tempdir().expect("tempdir");
        let path: PathBuf = saved.path().join("table.tsv");
        table.save(&path).expect("save");

        let second = corpus(&[("b.tex", "\\[ a \\] \\[ z \\]")]);
        let resume = EquationTable::load(&path, MathMode::Display).expect("load");
        let (table, _) =
            enumerate(&PipelineConfig::new(second.path()), Some(resume)).expect("second run");
        let text = table_text(&table);
        let ids: Vec<&str> = text.lines().filter_map(|l| l.split('\t').next()).collect();
        assert_eq!(ids, vec!["EQDS0Q", "EQDS1Q"]);
        assert!(text.lines().nth(1).is_some_and(|l| l.contains("\\nz\\n")));
    }
}

// ============================================================================
// Rendering
// ============================================================================

#[cfg(unix)]
mod rendering {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = "\\documentclass{article}\n\\begin{document}\n\\[ x \\]\n\\end{document}\n";

    fn config_with(convert: StageCommand) -> RenderConfig {
        RenderConfig {
            convert,
            post: StageCommand::new("cat", &[], Duration::from_secs(10)),
        }
    }

    #[test]
    fn test_timeout_is_logged_and_nothing_written() {
        let dir = corpus(&[("slow.tex", DOC)]);
        let out = tempfile::tempdir().expect("tempdir");
        let config = PipelineConfig::new(dir.path())
            .with_output(OutputTarget::Mirror(out.path().to_path_buf()));
        let render = config_with(StageCommand::shell("exec sleep 5", Duration::from_millis(100)));

        let log = render_corpus(&config, &render).expect("render run");
        let text = log.render();
        let line = text.lines().nth(1).expect("failure line");
        assert!(line.contains("slow.tex"));
        assert!(line.contains("timeout"));
        assert!(!out.path().join("slow.xhtml").exists());
    }

    #[test]
    fn test_render_writes_xhtml_and_skips_existing() {
        let dir = corpus(&[("ok.tex", DOC), ("empty.tex", "no math here\n")]);
        let out = tempfile::tempdir().expect("tempdir");
        let config = PipelineConfig::new(dir.path())
            .with_output(OutputTarget::Mirror(out.path().to_path_buf()));
        let render = config_with(StageCommand::new("cat", &[], Duration::from_secs(10)));

        let log = render_corpus(&config, &render).expect("render run");
        assert_eq!(log.processed, 1);
        assert!(log.failures.is_empty());
        let xhtml = read(&out.path().join("ok.xhtml"));
        assert!(xhtml.starts_with("\\documentclass{article}\n"));
        assert!(xhtml.contains("\\[ x \\]"));

        let again = render_corpus(&config, &render).expect("second run");
        assert!(again.failures.is_empty());
    }

    #[test]
    fn test_missing_document_body_is_structural_miss() {
        let dir = corpus(&[("frag.tex", "\\[ x \\]\n")]);
        let out = tempfile::tempdir().expect("tempdir");
        let config = PipelineConfig::new(dir.path())
            .with_output(OutputTarget::Mirror(out.path().to_path_buf()));
        let render = config_with(StageCommand::new("cat", &[], Duration::from_secs(10)));

        let log = render_corpus(&config, &render).expect("render run");
        assert!(log
            .render()
            .contains("frag.tex: Error: \\begin{document} error"));
    }
}
