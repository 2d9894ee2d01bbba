//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code propagates errors. `unwrap()`, `expect()`,
//! `panic!`, `todo!` and `unimplemented!` are reserved for tests.
//!
//! **Exceptions**: `expect` on compile-time constant regexes, whose failure
//! is a programming error caught by the first test run.

use architectural_enforcement::{report, scan, PRODUCTION_ROOTS};

fn panic_rule(lines: &[&str], idx: usize, code: &str) -> Option<&'static str> {
    if code.contains(".unwrap()") {
        return Some("unwrap() in production code");
    }
    if code.contains(".expect(") {
        let constant_regex = code.contains("Regex::new(")
            || idx
                .checked_sub(1)
                .is_some_and(|prev| lines[prev].contains("Regex::new("));
        if !constant_regex {
            return Some("expect() in production code");
        }
    }
    if ["panic!(", "todo!(", "unimplemented!("]
        .iter()
        .any(|m| code.contains(m))
    {
        return Some("Explicit panic in production code");
    }
    None
}

/// Test that production code does not panic on recoverable errors
#[test]
fn test_no_panics_in_production_code() {
    let violations = scan(PRODUCTION_ROOTS, panic_rule);

    report(
        "CRITICAL: Panicking calls found in production code!\n\
         Return a Result and propagate with `?`.",
        &violations,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_detection() {
        let lines = vec![
            "let v = x.unwrap();",
            "LazyLock::new(|| Regex::new(r\"a\").expect(\"valid regex\"));",
            "let y = z.expect(\"present\");",
            "let w = x.unwrap_or_default();",
        ];
        assert!(panic_rule(&lines, 0, lines[0]).is_some());
        assert!(panic_rule(&lines, 1, lines[1]).is_none());
        assert!(panic_rule(&lines, 2, lines[2]).is_some());
        assert!(panic_rule(&lines, 3, lines[3]).is_none());
    }
}
