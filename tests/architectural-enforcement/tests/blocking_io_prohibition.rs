//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Gateway production code MUST NOT use blocking I/O inside async code.
//! **Required**: Use `tokio::fs`, `tokio::net`, `tokio::process` and async `reqwest`.
//!
//! Synchronous functions that run before the runtime starts (configuration
//! loading) are exempt.

use std::path::Path;

use architectural_enforcement::{
    code_part, is_in_async_function, is_in_non_async_function, is_in_test_function,
    production_source_dirs, read_source, rust_files, Violation,
};

#[test]
fn test_no_blocking_io_in_production_code() {
    let mut violations = Vec::new();
    for dir in production_source_dirs() {
        for file in rust_files(&dir) {
            check_file(&file, &mut violations);
        }
    }

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nForbidden in async code:");
        eprintln!("  - std::fs::*, std::net::*, std::process::Command");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("\nUse instead:");
        eprintln!("  - tokio::fs, tokio::net, tokio::process");
        eprintln!("  - reqwest::Client with .await");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
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

        if is_in_test_function(&lines, idx) || is_in_non_async_function(&lines, idx) {
            continue;
        }

        let kind = if code.contains("std::fs::") || code.contains("use std::fs") {
            Some("Blocking file I/O")
        } else if code.contains("std::net::") || code.contains("use std::net") {
            Some("Blocking network I/O")
        } else if code.contains("std::process::Command") {
            Some("Blocking process I/O")
        } else if code.contains("reqwest::blocking") {
            Some("Blocking HTTP client")
        } else if (code.contains("std::io::stdin()") || code.contains("std::io::stdout()"))
            && is_in_async_function(&lines, idx)
        {
            Some("Blocking stdin/stdout in async")
        } else {
            None
        };

        if let Some(kind) = kind {
            violations.push(Violation {
                path: path.to_path_buf(),
                line: idx + 1,
                kind,
                text: line.trim().to_string(),
            });
        }
    }
}
