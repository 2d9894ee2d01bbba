//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async functions on the request-serving path (chat core and
//! chat server) MUST NOT use blocking I/O. A stalled file read or socket call
//! there stalls every reply streaming on the same worker.
//!
//! **Allowed**: Blocking calls in non-async functions (config loading before
//! the runtime serves requests) and in test code.

use architectural_enforcement::{is_in_async_function, report, scan, SERVER_PATH_ROOTS};

fn blocking_rule(code: &str) -> Option<&'static str> {
    if code.contains("std::fs::") {
        return Some("Blocking file I/O");
    }
    if ["std::net::TcpStream", "std::net::TcpListener", "std::net::UdpSocket"]
        .iter()
        .any(|p| code.contains(p))
    {
        return Some("Blocking network I/O");
    }
    if code.contains("std::process::Command") {
        return Some("Blocking process I/O");
    }
    if code.contains("reqwest::blocking") {
        return Some("Blocking HTTP client");
    }
    if code.contains("std::io::stdin()") {
        return Some("Blocking stdin");
    }
    None
}

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = scan(SERVER_PATH_ROOTS, |lines, idx, code| {
        // Importing the blocking client is never right, async or not
        if code.contains("reqwest::blocking") {
            return Some("Blocking HTTP client");
        }
        if !is_in_async_function(lines, idx) {
            return None;
        }
        blocking_rule(code)
    });

    report(
        "CRITICAL: Blocking I/O calls found in async production code!\n\
         Use tokio::fs, tokio::net and reqwest's async client instead.",
        &violations,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_rule_detection() {
        assert!(blocking_rule("let s = std::fs::read_to_string(path)?;").is_some());
        assert!(blocking_rule("let l = std::net::TcpListener::bind(addr)?;").is_some());
        assert!(blocking_rule("use std::net::SocketAddr;").is_none());
        assert!(blocking_rule("let l = tokio::net::TcpListener::bind(addr).await?;").is_none());
    }
}
