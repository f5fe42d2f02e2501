//! `e` — a line- and content-addressed file editor: set, insert, delete, or
//! replace text by line number or by matching pattern, printing a unified
//! diff or a dry-run preview instead of writing when asked.
//!
//! Ordinary string manipulation, included so agents can pair it with
//! `lsp-cli` (navigate with one tool, edit with the other); it carries none
//! of the crate's normative engineering weight.

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use regex::Regex;
use similar::{ChangeTag, TextDiff};

#[derive(Debug, thiserror::Error)]
enum EditError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("path escapes working directory: {0}")]
    OutsideRoot(PathBuf),
    #[error("invalid range `{0}`: lines are 1-indexed and end must be >= start")]
    InvalidRange(String),
    #[error("line {line} out of range (file has {total} lines)")]
    LineOutOfRange { line: usize, total: usize },
    #[error("line {line} out of range (file has {total} lines, insert accepts 1-{max})")]
    InsertOutOfRange { line: usize, total: usize, max: usize },
    #[error("missing text argument (use --stdin for multiline content)")]
    MissingText,
    #[error("invalid regex `{pattern}`: {source}")]
    InvalidRegex { pattern: String, source: regex::Error },
    #[error("pattern `{0}` not found")]
    PatternNotFound(String),
    #[error("text `{0}` not found")]
    TextNotFound(String),
}

#[derive(Parser)]
#[command(name = "e", about = "Line- and content-addressed file editing")]
struct Cli {
    /// Directory every `file` argument must resolve inside of. Defaults to
    /// the current directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Replace/match every occurrence instead of just the first.
    #[arg(long, global = true)]
    all: bool,

    /// Treat match strings as regular expressions.
    #[arg(long, global = true)]
    regex: bool,

    /// Preview the result without writing.
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,

    /// Print a unified diff instead of writing (implies --dry-run).
    #[arg(long, global = true)]
    diff: bool,

    /// Read the text argument from stdin, for multi-line content.
    #[arg(long, global = true)]
    stdin: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replace a single line
    Set { file: PathBuf, line: usize, text: Option<String> },
    /// Replace a range of lines
    #[command(name = "setrange")]
    SetRange { file: PathBuf, range: String, text: Option<String> },
    /// Delete line(s)
    #[command(alias = "del")]
    Delete { file: PathBuf, range: String },
    /// Insert text before a line
    #[command(alias = "ins")]
    Insert { file: PathBuf, line: usize, text: Option<String> },
    /// Insert text after a line
    #[command(alias = "app")]
    Append { file: PathBuf, line: usize, text: Option<String> },
    /// Replace matching text (first match, or every match with --all)
    #[command(alias = "rep")]
    Replace { file: PathBuf, old: String, new: Option<String> },
    /// Insert text after the line matching `pattern`
    After { file: PathBuf, pattern: String, text: Option<String> },
    /// Insert text before the line matching `pattern`
    Before { file: PathBuf, pattern: String, text: Option<String> },
    /// Print a file with line numbers, optionally restricted to a range
    Show { file: PathBuf, range: Option<String> },
}

fn resolve_path(root: &Path, requested: &Path) -> Result<PathBuf, EditError> {
    let full_path = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };

    let root_canonical = root.canonicalize()?;

    if !full_path.exists() {
        let parent = full_path.parent().unwrap_or(root);
        if parent.exists() {
            let parent_canonical = parent.canonicalize()?;
            if !parent_canonical.starts_with(&root_canonical) {
                return Err(EditError::OutsideRoot(requested.to_path_buf()));
            }
        }
        return Ok(full_path);
    }

    let canonical = full_path.canonicalize()?;
    if !canonical.starts_with(&root_canonical) {
        return Err(EditError::OutsideRoot(requested.to_path_buf()));
    }
    Ok(canonical)
}

/// Writes via a temp file in the same directory, then renames, so a reader
/// never observes a partially written file.
fn atomic_write(path: &Path, content: &str) -> Result<(), EditError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp.e-edit");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp_path);
    })?;
    Ok(())
}

/// Splits file content into lines, dropping a single trailing newline (the
/// form every line-addressed command operates on).
fn to_lines(content: &str) -> Vec<String> {
    let trimmed = content.strip_suffix('\n').unwrap_or(content);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('\n').map(str::to_string).collect()
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, EditError> {
    Ok(to_lines(&std::fs::read_to_string(path)?))
}

/// The inverse of [`to_lines`]: always ends in exactly one newline.
fn content_of(lines: &[String]) -> String {
    format!("{}\n", lines.join("\n"))
}

fn get_text(explicit: Option<&str>, use_stdin: bool) -> Result<String, EditError> {
    if use_stdin {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf.strip_suffix('\n').unwrap_or(&buf).to_string())
    } else {
        explicit.map(str::to_string).ok_or(EditError::MissingText)
    }
}

/// Parses `"N"` or `"N-M"` into a 1-indexed, inclusive `(start, end)` pair.
fn parse_range(s: &str) -> Result<(usize, usize), EditError> {
    let (start, end) = match s.split_once('-') {
        Some((a, b)) => {
            let start: usize = a.parse().map_err(|_| EditError::InvalidRange(s.to_string()))?;
            let end: usize = b.parse().map_err(|_| EditError::InvalidRange(s.to_string()))?;
            (start, end)
        }
        None => {
            let n: usize = s.parse().map_err(|_| EditError::InvalidRange(s.to_string()))?;
            (n, n)
        }
    };
    if start < 1 || end < start {
        return Err(EditError::InvalidRange(s.to_string()));
    }
    Ok((start, end))
}

fn validate_line(line: usize, total: usize) -> Result<(), EditError> {
    if line < 1 || line > total {
        return Err(EditError::LineOutOfRange { line, total });
    }
    Ok(())
}

enum Matcher {
    Literal(String),
    Regex(Regex),
}

impl Matcher {
    fn new(pattern: &str, use_regex: bool) -> Result<Self, EditError> {
        if use_regex {
            Regex::new(pattern)
                .map(Matcher::Regex)
                .map_err(|source| EditError::InvalidRegex { pattern: pattern.to_string(), source })
        } else {
            Ok(Matcher::Literal(pattern.to_string()))
        }
    }

    fn matches(&self, line: &str) -> bool {
        match self {
            Matcher::Literal(needle) => line.contains(needle.as_str()),
            Matcher::Regex(re) => re.is_match(line),
        }
    }
}

fn unified_diff(path: &Path, old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut out = String::new();
    out.push_str(&format!("--- {}\n", path.display()));
    out.push_str(&format!("+++ {}\n", path.display()));
    for group in diff.grouped_ops(3) {
        for op in group {
            for change in diff.iter_changes(&op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                    ChangeTag::Equal => ' ',
                };
                out.push(sign);
                out.push_str(&change.to_string());
            }
        }
    }
    out
}

fn preview(content: &str) -> String {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:4}\t{}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Common tail of every mutating command: print a diff, print a dry-run
/// preview, or write the file, depending on the global flags.
fn finish(path: &Path, cli: &Cli, old_content: &str, new_content: &str) -> Result<String, EditError> {
    if cli.diff {
        return Ok(unified_diff(path, old_content, new_content));
    }
    if cli.dry_run {
        return Ok(preview(new_content));
    }
    atomic_write(path, new_content)?;
    Ok(format!("wrote {}", path.display()))
}

fn run(cli: &Cli) -> Result<String, EditError> {
    let root = cli
        .root
        .clone()
        .map(Ok)
        .unwrap_or_else(std::env::current_dir)?;

    match &cli.command {
        Command::Set { file, line, text } => {
            let path = resolve_path(&root, file)?;
            let text = get_text(text.as_deref(), cli.stdin)?;
            let mut lines = read_lines(&path)?;
            validate_line(*line, lines.len())?;
            let original = content_of(&lines);
            lines[*line - 1] = text;
            finish(&path, cli, &original, &content_of(&lines))
        }
        Command::SetRange { file, range, text } => {
            let path = resolve_path(&root, file)?;
            let (start, end) = parse_range(range)?;
            let text = get_text(text.as_deref(), cli.stdin)?;
            let lines = read_lines(&path)?;
            validate_line(start, lines.len())?;
            validate_line(end, lines.len())?;
            let original = content_of(&lines);
            let mut modified = Vec::with_capacity(lines.len() - (end - start + 1) + 1);
            modified.extend_from_slice(&lines[..start - 1]);
            modified.extend(text.split('\n').map(str::to_string));
            modified.extend_from_slice(&lines[end..]);
            finish(&path, cli, &original, &content_of(&modified))
        }
        Command::Delete { file, range } => {
            let path = resolve_path(&root, file)?;
            let (start, end) = parse_range(range)?;
            let lines = read_lines(&path)?;
            validate_line(start, lines.len())?;
            validate_line(end, lines.len())?;
            let original = content_of(&lines);
            let mut modified = Vec::with_capacity(lines.len() - (end - start + 1));
            modified.extend_from_slice(&lines[..start - 1]);
            modified.extend_from_slice(&lines[end..]);
            finish(&path, cli, &original, &content_of(&modified))
        }
        Command::Insert { file, line, text } => {
            let path = resolve_path(&root, file)?;
            let text = get_text(text.as_deref(), cli.stdin)?;
            let lines = read_lines(&path)?;
            let max = lines.len() + 1;
            if *line < 1 || *line > max {
                return Err(EditError::InsertOutOfRange { line: *line, total: lines.len(), max });
            }
            let original = content_of(&lines);
            let mut modified = Vec::with_capacity(lines.len() + 1);
            modified.extend_from_slice(&lines[..*line - 1]);
            modified.extend(text.split('\n').map(str::to_string));
            modified.extend_from_slice(&lines[*line - 1..]);
            finish(&path, cli, &original, &content_of(&modified))
        }
        Command::Append { file, line, text } => {
            let path = resolve_path(&root, file)?;
            let text = get_text(text.as_deref(), cli.stdin)?;
            let lines = read_lines(&path)?;
            validate_line(*line, lines.len())?;
            let original = content_of(&lines);
            let mut modified = Vec::with_capacity(lines.len() + 1);
            modified.extend_from_slice(&lines[..*line]);
            modified.extend(text.split('\n').map(str::to_string));
            modified.extend_from_slice(&lines[*line..]);
            finish(&path, cli, &original, &content_of(&modified))
        }
        Command::Replace { file, old, new } => {
            let path = resolve_path(&root, file)?;
            let new_text = get_text(new.as_deref(), cli.stdin)?;
            let original_content = std::fs::read_to_string(&path)?;

            let new_content = if cli.regex {
                let re = Regex::new(old)
                    .map_err(|source| EditError::InvalidRegex { pattern: old.clone(), source })?;
                if !re.is_match(&original_content) {
                    return Err(EditError::PatternNotFound(old.clone()));
                }
                if cli.all {
                    re.replace_all(&original_content, new_text.as_str()).into_owned()
                } else {
                    re.replacen(&original_content, 1, new_text.as_str()).into_owned()
                }
            } else {
                if !original_content.contains(old.as_str()) {
                    return Err(EditError::TextNotFound(old.clone()));
                }
                if cli.all {
                    original_content.replace(old.as_str(), &new_text)
                } else {
                    original_content.replacen(old.as_str(), &new_text, 1)
                }
            };

            if new_content == original_content {
                eprintln!("no changes");
                return Ok(String::new());
            }
            finish(&path, cli, &original_content, &new_content)
        }
        Command::After { file, pattern, text } => {
            let path = resolve_path(&root, file)?;
            let text = get_text(text.as_deref(), cli.stdin)?;
            let lines = read_lines(&path)?;
            let original = content_of(&lines);
            let matcher = Matcher::new(pattern, cli.regex)?;
            let new_lines: Vec<String> = text.split('\n').map(str::to_string).collect();
            let mut modified = Vec::with_capacity(lines.len() + new_lines.len());
            let mut matched = false;
            for line in &lines {
                modified.push(line.clone());
                if matcher.matches(line) && (cli.all || !matched) {
                    modified.extend(new_lines.iter().cloned());
                    matched = true;
                }
            }
            if !matched {
                return Err(EditError::PatternNotFound(pattern.clone()));
            }
            finish(&path, cli, &original, &content_of(&modified))
        }
        Command::Before { file, pattern, text } => {
            let path = resolve_path(&root, file)?;
            let text = get_text(text.as_deref(), cli.stdin)?;
            let lines = read_lines(&path)?;
            let original = content_of(&lines);
            let matcher = Matcher::new(pattern, cli.regex)?;
            let new_lines: Vec<String> = text.split('\n').map(str::to_string).collect();
            let mut modified = Vec::with_capacity(lines.len() + new_lines.len());
            let mut matched = false;
            for line in &lines {
                if matcher.matches(line) && (cli.all || !matched) {
                    modified.extend(new_lines.iter().cloned());
                    matched = true;
                }
                modified.push(line.clone());
            }
            if !matched {
                return Err(EditError::PatternNotFound(pattern.clone()));
            }
            finish(&path, cli, &original, &content_of(&modified))
        }
        Command::Show { file, range } => {
            let path = resolve_path(&root, file)?;
            let lines = read_lines(&path)?;
            let (start, end) = match range {
                Some(r) => parse_range(r)?,
                None => (1, usize::MAX),
            };
            let mut out = String::new();
            for (i, line) in lines.iter().enumerate() {
                let n = i + 1;
                if n < start {
                    continue;
                }
                if n > end {
                    break;
                }
                out.push_str(&format!("{n:4}\t{line}\n"));
            }
            Ok(out.trim_end_matches('\n').to_string())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(message) => {
            if !message.is_empty() {
                println!("{message}");
            }
            ExitCode::from(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cli(dir: &Path, command: Command) -> Cli {
        Cli {
            root: Some(dir.to_path_buf()),
            all: false,
            regex: false,
            dry_run: false,
            diff: false,
            stdin: false,
            command,
        }
    }

    #[test]
    fn set_replaces_a_single_line() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.rs"), "fn old() {}\n").unwrap();
        let c = cli(
            dir.path(),
            Command::Set { file: PathBuf::from("f.rs"), line: 1, text: Some("fn new() {}".to_string()) },
        );
        run(&c).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("f.rs")).unwrap(), "fn new() {}\n");
    }

    #[test]
    fn set_rejects_out_of_range_line() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "one\ntwo\n").unwrap();
        let c = cli(
            dir.path(),
            Command::Set { file: PathBuf::from("f.txt"), line: 5, text: Some("x".to_string()) },
        );
        assert!(matches!(run(&c), Err(EditError::LineOutOfRange { line: 5, total: 2 })));
    }

    #[test]
    fn delete_removes_a_range() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\nb\nc\nd\n").unwrap();
        let c = cli(dir.path(), Command::Delete { file: PathBuf::from("f.txt"), range: "2-3".to_string() });
        run(&c).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "a\nd\n");
    }

    #[test]
    fn insert_accepts_one_past_end_of_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\nb\n").unwrap();
        let c = cli(
            dir.path(),
            Command::Insert { file: PathBuf::from("f.txt"), line: 3, text: Some("c".to_string()) },
        );
        run(&c).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn append_inserts_after_the_given_line() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\nb\n").unwrap();
        let c = cli(
            dir.path(),
            Command::Append { file: PathBuf::from("f.txt"), line: 1, text: Some("inserted".to_string()) },
        );
        run(&c).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "a\ninserted\nb\n");
    }

    #[test]
    fn replace_without_all_flag_rewrites_only_first_match() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "foo bar foo").unwrap();
        let mut c = cli(
            dir.path(),
            Command::Replace { file: PathBuf::from("f.txt"), old: "foo".to_string(), new: Some("qux".to_string()) },
        );
        run(&c).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "qux bar foo");

        std::fs::write(dir.path().join("f.txt"), "foo bar foo").unwrap();
        c.all = true;
        run(&c).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "qux bar qux");
    }

    #[test]
    fn replace_reports_no_changes_without_writing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "same").unwrap();
        let c = cli(
            dir.path(),
            Command::Replace { file: PathBuf::from("f.txt"), old: "same".to_string(), new: Some("same".to_string()) },
        );
        let out = run(&c).unwrap();
        assert_eq!(out, "");
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "same");
    }

    #[test]
    fn replace_with_regex_matches_pattern() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "v1.2.3").unwrap();
        let mut c = cli(
            dir.path(),
            Command::Replace {
                file: PathBuf::from("f.txt"),
                old: r"\d+\.\d+\.\d+".to_string(),
                new: Some("2.0.0".to_string()),
            },
        );
        c.regex = true;
        run(&c).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "v2.0.0");
    }

    #[test]
    fn after_inserts_following_matching_line() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "import (\n)\n").unwrap();
        let c = cli(
            dir.path(),
            Command::After {
                file: PathBuf::from("f.txt"),
                pattern: "import (".to_string(),
                text: Some("    \"context\"".to_string()),
            },
        );
        run(&c).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "import (\n    \"context\"\n)\n"
        );
    }

    #[test]
    fn after_fails_when_pattern_absent() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\nb\n").unwrap();
        let c = cli(
            dir.path(),
            Command::After { file: PathBuf::from("f.txt"), pattern: "nope".to_string(), text: Some("x".to_string()) },
        );
        assert!(matches!(run(&c), Err(EditError::PatternNotFound(_))));
    }

    #[test]
    fn show_restricts_to_a_range() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\nb\nc\nd\n").unwrap();
        let c = cli(
            dir.path(),
            Command::Show { file: PathBuf::from("f.txt"), range: Some("2-3".to_string()) },
        );
        assert_eq!(run(&c).unwrap(), "   2\tb\n   3\tc");
    }

    #[test]
    fn diff_flag_prints_unified_diff_without_writing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "old\n").unwrap();
        let mut c = cli(
            dir.path(),
            Command::Set { file: PathBuf::from("f.txt"), line: 1, text: Some("new".to_string()) },
        );
        c.diff = true;
        let out = run(&c).unwrap();
        assert!(out.contains("-old"));
        assert!(out.contains("+new"));
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "old\n");
    }

    #[test]
    fn path_outside_root_is_rejected_even_when_absolute() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("escaped.txt"), "x\n").unwrap();
        let c = cli(
            dir.path(),
            Command::Set { file: outside.path().join("escaped.txt"), line: 1, text: Some("y".to_string()) },
        );
        assert!(matches!(run(&c), Err(EditError::OutsideRoot(_))));
    }
}
