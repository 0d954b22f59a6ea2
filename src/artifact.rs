//! Plain-text persistence of one backend's [`RunResult`].
//!
//! ```text
//! # repobench run result
//! Repository=In Memory
//! NodeCrudSuite=18233411,17109223,16988102
//! Initialization=81234
//! ```
//!
//! One `key=value` pair per line; `#` and `!` lines are comments. Values for
//! operation keys are comma-separated nanosecond durations in recording
//! order. `\`, `=`, `:`, tabs and line breaks inside keys or values are
//! escaped with a backslash. Keys also escape every space and a leading `#`
//! or `!`; values escape leading and trailing spaces. Blanks around the
//! separator are not part of the key or value.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ArtifactError;
use crate::recorder::RunResult;

/// Reserved key carrying the backend display name.
pub const REPOSITORY_KEY: &str = "Repository";

pub const ARTIFACT_EXTENSION: &str = "csv";

/// Contents of one artifact file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArtifact {
    pub backend: String,
    pub samples: BTreeMap<String, Vec<u64>>,
}

/// `In Memory` -> `in-memory`.
pub fn artifact_file_stem(backend: &str) -> String {
    backend
        .trim()
        .chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' {
                '-'
            } else {
                c
            }
        })
        .collect::<String>()
        .to_lowercase()
}

/// `In Memory` -> `in-memory.csv`.
pub fn artifact_file_name(backend: &str) -> String {
    format!("{}.{ARTIFACT_EXTENSION}", artifact_file_stem(backend))
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '\\' => out.push_str("\\\\"),
        '=' => out.push_str("\\="),
        ':' => out.push_str("\\:"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c => out.push(c),
    }
}

pub fn escape_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        match c {
            ' ' => out.push_str("\\ "),
            '#' | '!' if i == 0 => {
                out.push('\\');
                out.push(c);
            }
            c => push_escaped(&mut out, c),
        }
    }
    out
}

pub fn escape_value(raw: &str) -> String {
    let body = raw.trim_matches(' ');
    let (leading, trailing) = if body.is_empty() {
        (raw.len(), 0)
    } else {
        let start = raw.len() - raw.trim_start_matches(' ').len();
        (start, raw.len() - start - body.len())
    };
    let mut out = String::with_capacity(raw.len() + leading + trailing);
    out.push_str(&"\\ ".repeat(leading));
    for c in body.chars() {
        push_escaped(&mut out, c);
    }
    out.push_str(&"\\ ".repeat(trailing));
    out
}

pub fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Splits at the first unescaped `=` or `:`.
fn split_pair(line: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' | ':' => return Some((&line[..i], &line[i + 1..])),
            _ => {}
        }
    }
    None
}

/// Trims trailing whitespace, keeping a blank that follows an unescaped
/// backslash.
fn trim_unescaped_end(s: &str) -> &str {
    let trimmed = s.trim_end();
    let backslashes = trimmed.chars().rev().take_while(|&c| c == '\\').count();
    if backslashes % 2 == 0 {
        return trimmed;
    }
    match s[trimmed.len()..].chars().next() {
        Some(blank) => &s[..trimmed.len() + blank.len_utf8()],
        None => trimmed,
    }
}

/// Renders the artifact text. Operations without any successful sample are
/// left out.
pub fn render(result: &RunResult) -> String {
    let mut out = String::from("# repobench run result\n");
    out.push_str(&format!("{REPOSITORY_KEY}={}\n", escape_value(&result.backend)));
    for (operation, durations) in result.samples() {
        let joined = durations
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&format!("{}={joined}\n", escape_key(&operation)));
    }
    out
}

/// Writes `result` into `dir` (created if needed) under its default file
/// name and returns the file path.
pub fn write_run_result(dir: &Path, result: &RunResult) -> io::Result<PathBuf> {
    write_run_result_named(dir, &artifact_file_name(&result.backend), result)
}

pub fn write_run_result_named(
    dir: &Path,
    file_name: &str,
    result: &RunResult,
) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    fs::write(&path, render(result))?;
    Ok(path)
}

/// Parses artifact text. `path` is only used in error messages.
pub fn parse_artifact(path: &Path, text: &str) -> Result<ParsedArtifact, ArtifactError> {
    let mut backend = None;
    let mut samples = BTreeMap::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = split_pair(line).ok_or_else(|| ArtifactError::MalformedLine {
            path: path.to_path_buf(),
            line: line_no,
        })?;
        let key = unescape(trim_unescaped_end(key));
        let value = unescape(trim_unescaped_end(value.trim_start()));

        if key == REPOSITORY_KEY {
            if backend.replace(value).is_some() {
                return Err(ArtifactError::DuplicateKey {
                    path: path.to_path_buf(),
                    line: line_no,
                    key,
                });
            }
            continue;
        }

        let durations = parse_durations(&value).map_err(|bad| ArtifactError::InvalidDuration {
            path: path.to_path_buf(),
            line: line_no,
            operation: key.clone(),
            value: bad.to_string(),
        })?;
        if samples.contains_key(&key) {
            return Err(ArtifactError::DuplicateKey {
                path: path.to_path_buf(),
                line: line_no,
                key,
            });
        }
        samples.insert(key, durations);
    }

    let backend = backend.ok_or_else(|| ArtifactError::MissingBackend {
        path: path.to_path_buf(),
        key: REPOSITORY_KEY,
    })?;
    Ok(ParsedArtifact { backend, samples })
}

fn parse_durations(value: &str) -> Result<Vec<u64>, &str> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    value
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<u64>().map_err(|_| part)
        })
        .collect()
}

pub fn read_artifact(path: &Path) -> Result<ParsedArtifact, ArtifactError> {
    let text = fs::read_to_string(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_artifact(path, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::TimingRecorder;
    use tempfile::tempdir;

    fn sample_result() -> RunResult {
        let mut recorder = TimingRecorder::new("In Memory");
        recorder.record_success("Initialization", 512, 1);
        recorder.record_success("NodeCrudSuite", 30, 1);
        recorder.record_success("NodeCrudSuite", 10, 2);
        recorder.record_success("NodeCrudSuite", 20, 3);
        recorder.record_failure("TreeImportSuite", "boom", 1);
        recorder.into_run_result()
    }

    #[test]
    fn test_file_name() {
        assert_eq!(artifact_file_name("In Memory"), "in-memory.csv");
        assert_eq!(artifact_file_name("File System"), "file-system.csv");
        assert_eq!(artifact_file_name("a/b"), "a-b.csv");
    }

    #[test]
    fn test_escape_roundtrip() {
        let raw = "a=b:c\\d\nnext\tend";
        for escaped in [escape_key(raw), escape_value(raw)] {
            assert!(!escaped.contains('\n'));
            assert!(!escaped.contains('\t'));
            assert_eq!(unescape(&escaped), raw);
        }
        assert_eq!(escape_key("#a b"), "\\#a\\ b");
        assert_eq!(escape_value("  a b "), "\\ \\ a b\\ ");
        assert_eq!(escape_value("   "), "\\ \\ \\ ");
    }

    #[test]
    fn test_edge_blank_and_comment_names_survive() {
        let mut recorder = TimingRecorder::new(" Trailing ");
        recorder.record_success("#HashSuite", 1, 1);
        recorder.record_success("!Bang", 2, 1);
        recorder.record_success(" Leading", 3, 1);
        recorder.record_success("Trailing\t ", 4, 1);
        recorder.record_success("ends\\", 5, 1);
        let result = recorder.into_run_result();

        let parsed = parse_artifact(Path::new("mem"), &render(&result)).unwrap();
        assert_eq!(parsed.backend, " Trailing ");
        assert_eq!(parsed.samples, result.samples());
        assert_eq!(parsed.samples["#HashSuite"], vec![1]);
        assert_eq!(parsed.samples[" Leading"], vec![3]);
    }

    #[test]
    fn test_blank_around_separator_ignored() {
        let text = "Repository = r  \n  op\\  =  4 ,5\t\n";
        let parsed = parse_artifact(Path::new("x"), text).unwrap();
        assert_eq!(parsed.backend, "r");
        assert_eq!(parsed.samples["op "], vec![4, 5]);
    }

    #[test]
    fn test_write_then_read_preserves_sequences() {
        let dir = tempdir().unwrap();
        let result = sample_result();
        let path = write_run_result(&dir.path().join("run-1"), &result).unwrap();
        assert_eq!(path.file_name().unwrap(), "in-memory.csv");

        let parsed = read_artifact(&path).unwrap();
        assert_eq!(parsed.backend, "In Memory");
        assert_eq!(parsed.samples["NodeCrudSuite"], vec![30, 10, 20]);
        assert_eq!(parsed.samples["Initialization"], vec![512]);
        // Failed-only operations are not persisted.
        assert!(!parsed.samples.contains_key("TreeImportSuite"));
        assert_eq!(parsed.samples, result.samples());
    }

    #[test]
    fn test_escaped_keys_survive() {
        let mut recorder = TimingRecorder::new("odd=name: x");
        recorder.record_success("ns::Suite=1", 7, 1);
        let result = recorder.into_run_result();

        let parsed = parse_artifact(Path::new("mem"), &render(&result)).unwrap();
        assert_eq!(parsed.backend, "odd=name: x");
        assert_eq!(parsed.samples["ns::Suite=1"], vec![7]);
    }

    #[test]
    fn test_comments_and_colon_separator() {
        let text = "# header\n! bang\n\nRepository: Legacy\nop: 1, 2 ,3\n";
        let parsed = parse_artifact(Path::new("legacy"), text).unwrap();
        assert_eq!(parsed.backend, "Legacy");
        assert_eq!(parsed.samples["op"], vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_backend_rejected() {
        let err = parse_artifact(Path::new("x"), "op=1,2\n").unwrap_err();
        assert!(matches!(err, ArtifactError::MissingBackend { .. }));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let err = parse_artifact(Path::new("x"), "Repository=r\nop=1,abc\n").unwrap_err();
        match err {
            ArtifactError::InvalidDuration {
                line,
                operation,
                value,
                ..
            } => {
                assert_eq!(line, 2);
                assert_eq!(operation, "op");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_and_duplicate_lines() {
        assert!(matches!(
            parse_artifact(Path::new("x"), "Repository=r\njunk\n"),
            Err(ArtifactError::MalformedLine { line: 2, .. })
        ));
        assert!(matches!(
            parse_artifact(Path::new("x"), "Repository=r\nop=1\nop=2\n"),
            Err(ArtifactError::DuplicateKey { line: 3, .. })
        ));
    }
}
