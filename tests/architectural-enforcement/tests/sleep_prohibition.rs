//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT sleep. Waiting is done on I/O, and
//! time limits are expressed with `tokio::time::timeout` around the awaited
//! operation (see the idle timeout on reply streams).
//!
//! **Exceptions**: Test code.

use architectural_enforcement::{report, scan, PRODUCTION_ROOTS};

fn sleep_rule(code: &str) -> Option<&'static str> {
    if code.contains("thread::sleep") {
        return Some("Blocking sleep");
    }
    if code.contains("time::sleep") || code.contains("sleep_until(") {
        return Some("Async sleep");
    }
    None
}

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(PRODUCTION_ROOTS, |_, _, code| sleep_rule(code));

    report(
        "CRITICAL: Sleep calls found in production code!\n\
         Wait on I/O or wrap the awaited operation in tokio::time::timeout.",
        &violations,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_detection() {
        assert!(sleep_rule("std::thread::sleep(Duration::from_millis(10));").is_some());
        assert!(sleep_rule("tokio::time::sleep(d).await;").is_some());
        assert!(sleep_rule("tokio::time::timeout(d, body.next()).await").is_none());
    }
}
