//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: production code in the core and the daemon must not block the
//! runtime. Inside `async fn`s use `tokio::fs` / `tokio::net`, never `std::fs`,
//! `std::net` or `std::process::Command`.
//!
//! **Acceptable**: blocking calls in plain (non-async) functions, such as
//! settings loading and socket file housekeeping, and anything in test code.

use architectural_enforcement::{blocking_io, scan_production};

#[test]
fn test_no_blocking_io_in_async_functions() {
    let violations = scan_production(|_, line| {
        if line.in_async_fn {
            blocking_io(line.code)
        } else {
            None
        }
    });

    assert!(
        violations.is_empty(),
        "Blocking I/O inside async functions:\n{}",
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    );
}

#[test]
fn test_no_module_level_blocking_imports() {
    let violations = scan_production(|_, line| {
        let code = line.code.trim_start();
        if code.starts_with("use std::fs") || code.starts_with("use std::net") {
            blocking_io(code)
        } else {
            None
        }
    });

    assert!(
        violations.is_empty(),
        "Blocking I/O imported at module level (call it fully qualified from a sync fn):\n{}",
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    );
}
