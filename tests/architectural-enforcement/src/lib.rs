//! Architectural Enforcement
//!
//! Source scanners backing the integration tests in `tests/`:
//! - No blocking I/O inside async functions
//! - No sleeping outside the designated timer modules
//!
//! The scanners are line-based. Everything from a file's `#[cfg(test)]` module
//! onwards is test code and ignored, as is anything after `//` on a line.

use std::path::{Path, PathBuf};

/// Production source trees checked by every rule, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["companion/core/src", "companion/daemon/src"];

/// A rule violation at one source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the violation
    pub path: PathBuf,
    /// One-based line number
    pub line: usize,
    /// What was violated
    pub rule: &'static str,
    /// The offending line, trimmed
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.rule,
            self.text
        )
    }
}

/// One production line with the context the rules need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeLine<'a> {
    /// One-based line number
    pub number: usize,
    /// The line with any `//` comment removed
    pub code: &'a str,
    /// Whether the nearest enclosing `fn` is `async`
    pub in_async_fn: bool,
}

/// Workspace root (two levels above this crate)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// Every `.rs` file below `dir`
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("rs"))
        .collect()
}

/// Production lines of a source file, stopping at its test module
#[must_use]
pub fn production_lines(content: &str) -> Vec<CodeLine<'_>> {
    let mut lines = Vec::new();
    let mut in_async_fn = false;

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }

        let code = line.split("//").next().unwrap_or(line);
        if let Some(is_async) = fn_declaration(code) {
            in_async_fn = is_async;
        }

        lines.push(CodeLine {
            number: idx + 1,
            code,
            in_async_fn,
        });
    }
    lines
}

/// `Some(is_async)` when the line declares a function
fn fn_declaration(code: &str) -> Option<bool> {
    let mut rest = code.trim_start();
    for prefix in ["pub(crate) ", "pub(super) ", "pub ", "const ", "unsafe "] {
        rest = rest.strip_prefix(prefix).unwrap_or(rest);
    }
    if rest.starts_with("async fn ") {
        Some(true)
    } else if rest.starts_with("fn ") {
        Some(false)
    } else {
        None
    }
}

/// Run `check` over every production line of every production file
pub fn scan_production<F>(mut check: F) -> Vec<Violation>
where
    F: FnMut(&Path, &CodeLine<'_>) -> Option<&'static str>,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        let dir = root.join(dir);
        assert!(dir.exists(), "production source dir missing: {}", dir.display());

        for path in rust_files(&dir) {
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let relative = path.strip_prefix(&root).unwrap_or(&path).to_path_buf();
            for line in production_lines(&content) {
                if let Some(rule) = check(&relative, &line) {
                    violations.push(Violation {
                        path: relative.clone(),
                        line: line.number,
                        rule,
                        text: line.code.trim().to_string(),
                    });
                }
            }
        }
    }
    violations
}

/// Blocking I/O that must not run inside async functions
#[must_use]
pub fn blocking_io(code: &str) -> Option<&'static str> {
    if code.contains("std::fs::") || code.trim_start().starts_with("use std::fs") {
        Some("Blocking file I/O")
    } else if code.contains("std::net::") || code.trim_start().starts_with("use std::net") {
        Some("Blocking network I/O")
    } else if code.contains("std::process::Command") {
        Some("Blocking process I/O")
    } else {
        None
    }
}

/// Any sleep call
#[must_use]
pub fn sleep_call(code: &str) -> Option<&'static str> {
    if code.contains("std::thread::sleep") || code.contains("thread::sleep(") {
        Some("Thread sleep")
    } else if code.contains("::sleep(") || code.contains(".sleep(") {
        Some("Sleep call")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_context_tracking() {
        let source = "\
fn load() {
    let s = std::fs::read_to_string(\"a\");
}

pub async fn serve() {
    let s = std::fs::read_to_string(\"a\"); // bad
}

pub(crate) fn sync_again() {}
";
        let lines = production_lines(source);
        assert!(!lines[1].in_async_fn);
        assert!(lines[5].in_async_fn);
        assert!(!lines[8].in_async_fn);
        assert!(!lines[5].code.contains("bad"));
    }

    #[test]
    fn test_stops_at_test_module() {
        let source = "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() {}\n}\n";
        assert_eq!(production_lines(source).len(), 1);
    }

    #[test]
    fn test_detectors() {
        assert!(blocking_io("    std::fs::write(p, b)").is_some());
        assert!(blocking_io("use std::fs;").is_some());
        assert!(blocking_io("    tokio::fs::write(p, b).await").is_none());
        assert!(sleep_call("std::thread::sleep(d)").is_some());
        assert!(sleep_call("tokio::time::sleep(delay).await").is_some());
        assert!(sleep_call("let asleep = true;").is_none());
    }
}
