//! Architectural Enforcement
//!
//! Source scanners shared by the integration tests in `tests/`. Each test
//! walks the production sources of the workspace and reports violations of
//! one rule:
//!
//! - No blocking I/O inside async functions on the server path
//! - No sleeping in production code
//! - No `unwrap()` / `expect()` in production code
//!
//! Scanning is line based. Everything from the first `#[cfg(test)]` line of
//! a file onwards is treated as test code.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source roots, relative to the workspace root
pub const PRODUCTION_ROOTS: &[&str] = &["chat/core/src", "chat/server/src", "client/src"];

/// Source roots on the request-serving path
pub const SERVER_PATH_ROOTS: &[&str] = &["chat/core/src", "chat/server/src"];

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the line
    pub path: PathBuf,
    /// 1-based line number
    pub line_number: usize,
    /// Rule that was broken
    pub rule: &'static str,
    /// Trimmed source line
    pub line: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line_number,
            self.rule,
            self.line
        )
    }
}

/// Workspace root (two levels above this crate)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// All `.rs` files under the given roots
#[must_use]
pub fn rust_files(roots: &[&str]) -> Vec<PathBuf> {
    let base = workspace_root();
    let mut files = Vec::new();
    for root in roots {
        let dir = base.join(root);
        if !dir.exists() {
            continue;
        }
        files.extend(
            walkdir::WalkDir::new(dir)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
                .map(|e| e.into_path()),
        );
    }
    files.sort();
    files
}

/// Lines of a file before its test module
#[must_use]
pub fn production_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .take_while(|line| line.trim() != "#[cfg(test)]")
        .collect()
}

/// Code portion of a line (line comments and doc comments removed)
#[must_use]
pub fn code_part(line: &str) -> &str {
    let trimmed = line.trim_start();
    if trimmed.starts_with("//") {
        return "";
    }
    line.split(" //").next().unwrap_or(line)
}

/// Whether `idx` sits inside an `async fn` (nearest enclosing `fn` wins)
#[must_use]
pub fn is_in_async_function(lines: &[&str], idx: usize) -> bool {
    for line in lines[..=idx].iter().rev() {
        let line = line.trim();
        if line.contains("async fn ") {
            return true;
        }
        if line.contains("fn ") {
            return false;
        }
    }
    false
}

/// Apply `check` to every production line of every file under `roots`
pub fn scan<F>(roots: &[&str], mut check: F) -> Vec<Violation>
where
    F: FnMut(&[&str], usize, &str) -> Option<&'static str>,
{
    let mut violations = Vec::new();
    for path in rust_files(roots) {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let lines = production_lines(&content);
        for (idx, line) in lines.iter().enumerate() {
            let code = code_part(line);
            if code.trim().is_empty() {
                continue;
            }
            if let Some(rule) = check(&lines, idx, code) {
                violations.push(Violation {
                    path: path.clone(),
                    line_number: idx + 1,
                    rule,
                    line: line.trim().to_string(),
                });
            }
        }
    }
    violations
}

/// Print violations and fail the calling test
///
/// # Panics
///
/// Panics when `violations` is not empty.
pub fn report(title: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let content = "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() { x.unwrap(); }\n}\n";
        assert_eq!(production_lines(content), vec!["fn a() {}"]);
    }

    #[test]
    fn test_async_function_detection() {
        let code = vec![
            "async fn handler() {",
            "    let body = std::fs::read_to_string(\"x\");",
            "}",
            "fn helper() {",
            "    let body = std::fs::read_to_string(\"x\");",
            "}",
        ];
        assert!(is_in_async_function(&code, 1));
        assert!(!is_in_async_function(&code, 4));
    }

    #[test]
    fn test_comments_are_not_code() {
        assert_eq!(code_part("    // std::thread::sleep"), "");
        assert_eq!(code_part("/// calls unwrap()"), "");
        assert_eq!(code_part("let x = 1; // note"), "let x = 1;");
    }

    #[test]
    fn test_roots_exist() {
        assert!(!rust_files(PRODUCTION_ROOTS).is_empty());
    }
}
