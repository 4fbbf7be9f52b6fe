//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code waits on events, not on the clock. The only
//! sleeps allowed are the single-shot timers that *are* the feature: the
//! correlator's timer slots and the overlay auto-dismiss.
//!
//! Thread sleeps are never allowed in production code.

use std::path::Path;

use architectural_enforcement::sleep_call;

/// Modules whose job is to wait for a deadline
const TIMER_MODULES: &[&str] = &["companion/core/src/correlator/timer.rs", "companion/core/src/display.rs"];

fn is_timer_module(path: &Path) -> bool {
    TIMER_MODULES.iter().any(|allowed| path.ends_with(allowed))
}

#[test]
fn test_no_sleep_outside_timer_modules() {
    let violations = architectural_enforcement::scan_production(|path, line| {
        match sleep_call(line.code) {
            Some("Thread sleep") => Some("Thread sleep"),
            Some(rule) if !is_timer_module(path) => Some(rule),
            _ => None,
        }
    });

    assert!(
        violations.is_empty(),
        "Sleep calls in production code (use a TimerSlot or wait on a channel):\n{}",
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    );
}

#[test]
fn test_timer_modules_exist() {
    let root = architectural_enforcement::workspace_root();
    for module in TIMER_MODULES {
        assert!(root.join(module).exists(), "{module} moved; update TIMER_MODULES");
    }
}
