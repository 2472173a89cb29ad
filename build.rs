use std::path::{Path, PathBuf};
use std::process::Command;

/// Source tree scanned by the repository rules.
const SOURCE_DIR: &str = "src";

type Violations = Vec<(PathBuf, Vec<(usize, String)>)>;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");
    println!("cargo:rerun-if-changed=.git/packed-refs");
    println!("cargo:rerun-if-changed={}", SOURCE_DIR);

    let sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=SHIFT_MONITOR_GIT_SHA={}", sha);

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set");
    let root = PathBuf::from(&manifest_dir);
    let sources = rust_sources(&root);

    enforce_no_dead_code_allows(&root, &sources);
    enforce_no_test_skips(&root, &sources);
    enforce_serial_for_env_mutations(&root, &sources);
}

fn rust_sources(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    walk_directory(&root.join(SOURCE_DIR), &mut files);
    files.sort();
    files
}

fn walk_directory(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_directory(&path, files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
            files.push(path);
        }
    }
}

/// A `#[test]`/`#[tokio::test]` function located by a line scan.
struct TestFn<'a> {
    name: String,
    start_line: usize,
    attributes: Vec<&'a str>,
    body: Vec<&'a str>,
}

/// Finds test functions and their bodies by brace counting.
fn test_functions(content: &str) -> Vec<TestFn<'_>> {
    let lines: Vec<&str> = content.lines().collect();
    let mut tests = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim();
        if trimmed != "#[test]" && !trimmed.starts_with("#[tokio::test") {
            i += 1;
            continue;
        }

        let start_line = i + 1;
        let mut attributes = vec![trimmed];
        let mut j = i + 1;
        while j < lines.len() && lines[j].trim().starts_with("#[") {
            attributes.push(lines[j].trim());
            j += 1;
        }
        // Attributes written above the test attribute.
        let mut k = i;
        while k > 0 && lines[k - 1].trim().starts_with("#[") {
            attributes.push(lines[k - 1].trim());
            k -= 1;
        }

        let name = lines
            .get(j)
            .and_then(|line| line.split("fn ").nth(1))
            .and_then(|rest| rest.split('(').next())
            .unwrap_or("")
            .trim()
            .to_string();

        let mut body = Vec::new();
        let mut depth = 0i32;
        let mut opened = false;
        while j < lines.len() {
            let line = lines[j];
            body.push(line);
            for c in line.chars() {
                match c {
                    '{' => {
                        depth += 1;
                        opened = true;
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            j += 1;
            if opened && depth <= 0 {
                break;
            }
        }

        tests.push(TestFn {
            name,
            start_line,
            attributes,
            body,
        });
        i = j;
    }

    tests
}

fn enforce_no_dead_code_allows(root: &Path, sources: &[PathBuf]) {
    let mut violations: Violations = Vec::new();

    for file in sources {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let found: Vec<(usize, String)> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let trimmed = line.trim();
                (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                    && trimmed.contains("dead_code")
            })
            .map(|(n, line)| (n + 1, line.trim().to_string()))
            .collect();
        if !found.is_empty() {
            violations.push((relative(root, file), found));
        }
    }

    fail_on(
        &violations,
        "#[allow(dead_code)] IS NOT ALLOWED",
        &[
            "Delete unused code instead of silencing the warning.",
            "Code needed only by tests belongs behind #[cfg(test)].",
        ],
    );
}

fn enforce_no_test_skips(root: &Path, sources: &[PathBuf]) {
    const SKIP_PATTERNS: &[&str] = &["Skipping test", "skipping test", "Test skipped", "test skipped"];
    let mut violations: Violations = Vec::new();

    for file in sources {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let mut found = Vec::new();
        for test in test_functions(&content) {
            let skips = test
                .body
                .iter()
                .any(|line| SKIP_PATTERNS.iter().any(|p| line.contains(p)));
            // A bare `return;` inside a nested block is a conditional early exit.
            let early_return = test
                .body
                .iter()
                .skip(1)
                .any(|line| line.trim() == "return;" && line.starts_with("        "));
            if skips || early_return {
                found.push((
                    test.start_line,
                    format!("test `{}` can pass without running", test.name),
                ));
            }
        }
        if !found.is_empty() {
            violations.push((relative(root, file), found));
        }
    }

    fail_on(
        &violations,
        "SILENT TEST SKIPS ARE NOT ALLOWED",
        &["Tests must fail if they cannot run, not silently pass."],
    );
}

/// Environment variables are process-global; tests touching them run serially.
fn enforce_serial_for_env_mutations(root: &Path, sources: &[PathBuf]) {
    let mut violations: Violations = Vec::new();

    for file in sources {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let mut found = Vec::new();
        for test in test_functions(&content) {
            let serial = test
                .attributes
                .iter()
                .any(|a| *a == "#[serial]" || *a == "#[serial_test::serial]");
            let mutates = test.body.iter().any(|line| {
                let trimmed = line.trim();
                !trimmed.starts_with("//")
                    && (trimmed.contains("env::set_var") || trimmed.contains("env::remove_var"))
            });
            if mutates && !serial {
                found.push((
                    test.start_line,
                    format!("test `{}` mutates env without #[serial]", test.name),
                ));
            }
        }
        if !found.is_empty() {
            violations.push((relative(root, file), found));
        }
    }

    fail_on(
        &violations,
        "ENV MUTATIONS REQUIRE #[serial]",
        &["Add #[serial] from serial_test to every test that calls set_var/remove_var."],
    );
}

fn relative(root: &Path, file: &Path) -> PathBuf {
    file.strip_prefix(root).unwrap_or(file).to_path_buf()
}

fn fail_on(violations: &Violations, title: &str, advice: &[&str]) {
    if violations.is_empty() {
        return;
    }
    let total: usize = violations.iter().map(|(_, v)| v.len()).sum();

    eprintln!("\n========================================");
    eprintln!("{}", title);
    eprintln!("========================================");
    eprintln!();
    for (path, entries) in violations {
        for (line, message) in entries {
            eprintln!("  {}:{}", path.display(), line);
            eprintln!("    {}", message);
            eprintln!();
        }
    }
    eprintln!("========================================");
    for line in advice {
        eprintln!("{}", line);
    }
    eprintln!("========================================\n");
    panic!("Build failed: {} violation(s) of: {}", total, title);
}
