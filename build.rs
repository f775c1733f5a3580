use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_LINES: usize = 750;

const SKIP_PATTERNS: &[&str] = &["Skipping test", "skipping test", "Test skipped", "test skipped"];

/// One offending spot in a source file.
struct Violation {
    path: PathBuf,
    line: usize,
    detail: String,
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");
    println!("cargo:rerun-if-changed=src");

    let sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=TERMINAL_SESSIONS_GIT_SHA={}", sha);

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set");
    let root = PathBuf::from(manifest_dir);
    let mut files = Vec::new();
    collect_rust_files(&root.join("src"), &mut files);

    let sources: Vec<(PathBuf, String)> = files
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            let rel = path.strip_prefix(&root).unwrap_or(&path).to_path_buf();
            Some((rel, content))
        })
        .collect();

    report(
        "FILE LINE LIMIT EXCEEDED",
        "Split these files into smaller modules.",
        check_line_limits(&sources),
    );
    report(
        "#[allow(dead_code)] IS NOT ALLOWED",
        "Delete unused code, or gate test-only code behind #[cfg(test)].",
        check_dead_code_allows(&sources),
    );
    report(
        "SILENT TEST SKIPS ARE NOT ALLOWED",
        "Tests must fail if they cannot run. Use assert!() on preconditions.",
        check_test_skips(&sources),
    );
    report(
        "NESTED TOKIO RUNTIMES ARE NOT ALLOWED",
        "Use tokio::spawn or spawn_blocking from the main runtime instead.",
        check_nested_runtimes(&sources),
    );
    report(
        "GLOBAL STATE MUTATIONS REQUIRE #[serial]",
        "Add #[serial] from serial_test to tests that touch env vars or the home override.",
        check_serial_for_global_mutations(&sources),
    );
}

fn collect_rust_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
            println!("cargo:rerun-if-changed={}", path.display());
            files.push(path);
        }
    }
}

fn report(title: &str, hint: &str, violations: Vec<Violation>) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n========================================");
    eprintln!("{}", title);
    eprintln!("========================================");
    for v in &violations {
        eprintln!("  {}:{}", v.path.display(), v.line);
        eprintln!("    {}", v.detail);
    }
    eprintln!("========================================");
    eprintln!("{}\n", hint);
    panic!("Build failed: {} ({} occurrence(s))", title, violations.len());
}

fn check_line_limits(sources: &[(PathBuf, String)]) -> Vec<Violation> {
    sources
        .iter()
        .filter_map(|(path, content)| {
            let count = content.lines().filter(|l| !l.trim().is_empty()).count();
            (count > MAX_LINES).then(|| Violation {
                path: path.clone(),
                line: 1,
                detail: format!("{} non-empty lines (max {})", count, MAX_LINES),
            })
        })
        .collect()
}

fn check_dead_code_allows(sources: &[(PathBuf, String)]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (path, content) in sources {
        for (i, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                && trimmed.contains("dead_code")
            {
                violations.push(Violation {
                    path: path.clone(),
                    line: i + 1,
                    detail: trimmed.to_string(),
                });
            }
        }
    }
    violations
}

/// A test function: attribute line, name, and body lines.
struct TestFn<'a> {
    start: usize,
    name: String,
    attrs: Vec<&'a str>,
    body: Vec<(usize, &'a str)>,
}

/// Splits a file into its test functions by tracking brace depth after each
/// `#[test]` / `#[tokio::test]` attribute.
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
        let start = i + 1;
        let mut attrs = vec![trimmed];
        let mut j = i + 1;
        while j < lines.len() && !lines[j].contains("fn ") {
            attrs.push(lines[j].trim());
            j += 1;
        }
        let name = lines
            .get(j)
            .and_then(|l| l.split("fn ").nth(1))
            .and_then(|rest| rest.split('(').next())
            .unwrap_or("")
            .trim()
            .to_string();

        let mut depth: i32 = 0;
        let mut opened = false;
        let mut body = Vec::new();
        while j < lines.len() {
            for c in lines[j].chars() {
                match c {
                    '{' => {
                        depth += 1;
                        opened = true;
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            body.push((j + 1, lines[j]));
            j += 1;
            if opened && depth <= 0 {
                break;
            }
        }
        tests.push(TestFn {
            start,
            name,
            attrs,
            body,
        });
        i = j;
    }
    tests
}

fn check_test_skips(sources: &[(PathBuf, String)]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (path, content) in sources {
        for test in test_functions(content) {
            let skipped = test.body.iter().find(|(_, line)| {
                let trimmed = line.trim();
                SKIP_PATTERNS.iter().any(|p| line.contains(p)) || trimmed == "return;"
            });
            if let Some((line, _)) = skipped {
                violations.push(Violation {
                    path: path.clone(),
                    line: *line,
                    detail: format!("test `{}` returns early or skips", test.name),
                });
            }
        }
    }
    violations
}

fn check_nested_runtimes(sources: &[(PathBuf, String)]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (path, content) in sources {
        let lines: Vec<&str> = content.lines().collect();
        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with("//") || !trimmed.contains("thread::") {
                continue;
            }
            if !(trimmed.contains("thread::spawn(") || trimmed.contains("thread::Builder")) {
                continue;
            }
            let end = (i + 20).min(lines.len());
            let nearby = lines.get(i..end).unwrap_or_default().join("\n");
            if nearby.contains("Runtime::new()") || nearby.contains("runtime::Builder") {
                violations.push(Violation {
                    path: path.clone(),
                    line: i + 1,
                    detail: trimmed.to_string(),
                });
            }
        }
    }
    violations
}

fn check_serial_for_global_mutations(sources: &[(PathBuf, String)]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (path, content) in sources {
        for test in test_functions(content) {
            let serial = test
                .attrs
                .iter()
                .any(|a| *a == "#[serial]" || *a == "#[serial_test::serial]");
            if serial {
                continue;
            }
            let mutates = test.body.iter().any(|(_, line)| {
                let trimmed = line.trim();
                !trimmed.starts_with("//")
                    && (trimmed.contains("env::set_var")
                        || trimmed.contains("env::remove_var")
                        || trimmed.contains("set_home_for_test("))
            });
            if mutates {
                violations.push(Violation {
                    path: path.clone(),
                    line: test.start,
                    detail: format!("test `{}` mutates global state without #[serial]", test.name),
                });
            }
        }
    }
    violations
}
