//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Gateway production code MUST NOT call sleep methods.
//! **Exceptions**: exponential backoff in retry logic, periodic work driven by
//! `tokio::time::interval`.
//!
//! Timed behaviour in the gateway (debounce windows, telemetry polls) is
//! driven by sample timestamps and intervals, never by sleeping.

use std::path::Path;

use architectural_enforcement::{
    code_part, production_source_dirs, read_source, rust_files, Violation,
};

#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();
    for dir in production_source_dirs() {
        for file in rust_files(&dir) {
            check_file(&file, &mut violations);
        }
    }

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nAcceptable:");
        eprintln!("  - Exponential backoff in retry logic");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("\nForbidden:");
        eprintln!("  - Sleep in polling loops or as synchronization");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}

fn check_file(path: &Path, violations: &mut Vec<Violation>) {
    let Some(content) = read_source(path) else {
        return;
    };
    let lines: Vec<&str> = content.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        if !(code.contains("::sleep(") || code.contains(".sleep(")) {
            continue;
        }
        if is_backoff_context(&lines, idx) || is_interval_pattern(&lines, idx) {
            continue;
        }
        violations.push(Violation {
            path: path.to_path_buf(),
            line: idx + 1,
            kind: "Sleep call",
            text: line.trim().to_string(),
        });
    }
}

/// Check if sleep is used for exponential backoff
fn is_backoff_context(lines: &[&str], current_idx: usize) -> bool {
    let range = current_idx.saturating_sub(15)..(current_idx + 5).min(lines.len());

    let mut has_backoff_calc = false;
    let mut has_retry_context = false;
    for line in &lines[range] {
        let line = line.to_lowercase();
        if line.contains("<<") || line.contains("pow") || line.contains("* 2") {
            has_backoff_calc = true;
        }
        if line.contains("retry")
            || line.contains("reconnect")
            || line.contains("backoff")
            || line.contains("attempt")
        {
            has_retry_context = true;
        }
    }

    has_backoff_calc && has_retry_context
}

/// Check if sleep sits next to an interval-driven loop
fn is_interval_pattern(lines: &[&str], current_idx: usize) -> bool {
    let start = current_idx.saturating_sub(20);
    let end = (current_idx + 5).min(lines.len());
    lines[start..end]
        .iter()
        .any(|line| line.contains(".tick()") || line.contains("tokio::time::interval"))
}

#[test]
fn test_backoff_detection() {
    let code = [
        "fn reconnect() {",
        "    let delay = base_delay * (1 << attempt);",
        "    tokio::time::sleep(Duration::from_millis(delay)).await;",
        "}",
    ];
    assert!(is_backoff_context(&code, 2));
}

#[test]
fn test_plain_sleep_is_not_excused() {
    let code = [
        "async fn wait_for_sensor() {",
        "    tokio::time::sleep(Duration::from_millis(10)).await;",
        "}",
    ];
    assert!(!is_backoff_context(&code, 1));
    assert!(!is_interval_pattern(&code, 1));
}
