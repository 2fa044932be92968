//! Test-file discovery and ecosystem classification.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

/// Directories never descended into, in addition to every hidden directory.
pub const SKIP_DIRS: [&str; 12] = [
    ".git",
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    "env",
    ".env",
    "dist",
    "build",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
];

const SUFFIX_PATTERNS: [&str; 9] = [
    "_test.py",
    ".test.js",
    ".spec.js",
    ".test.ts",
    ".spec.ts",
    ".test.jsx",
    ".spec.jsx",
    ".test.tsx",
    ".spec.tsx",
];

/// First pattern hit wins; a file is counted once no matter how many
/// patterns it matches.
pub fn is_test_file(name: &str) -> bool {
    (name.starts_with("test_") && name.ends_with(".py"))
        || SUFFIX_PATTERNS.iter().any(|s| name.ends_with(s))
}

fn prunable(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIP_DIRS.contains(&name.as_ref())
}

/// Walk `workdir` and return workdir-relative paths of every test file,
/// pruning [`SKIP_DIRS`] and hidden directories without descending.
pub fn discover_test_files(workdir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let walker = WalkDir::new(workdir)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !prunable(e));
    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if is_test_file(&name) {
            if let Ok(rel) = entry.path().strip_prefix(workdir) {
                found.push(rel.to_path_buf());
            }
        }
    }
    found.sort();
    found
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    Python,
    TypeScript,
    JavaScript,
}

/// Python wins over TypeScript wins over JavaScript; a repo with no
/// recognizable extension is treated as Python.
pub fn classify(test_files: &[PathBuf]) -> Ecosystem {
    let ext = |f: &PathBuf| {
        f.extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    if test_files.iter().any(|f| ext(f) == "py") {
        Ecosystem::Python
    } else if test_files.iter().any(|f| matches!(ext(f).as_str(), "ts" | "tsx")) {
        Ecosystem::TypeScript
    } else if test_files.iter().any(|f| matches!(ext(f).as_str(), "js" | "jsx")) {
        Ecosystem::JavaScript
    } else {
        Ecosystem::Python
    }
}

/// Image and install-then-test command lines for one ecosystem.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub image: &'static str,
    /// Shell line run inside the container, repo mounted at /repo.
    pub container_command: String,
    /// Equivalent shell line for the host-subprocess fallback, run with the
    /// repo as the working directory.
    pub host_command: String,
}

pub fn run_plan(eco: Ecosystem) -> RunPlan {
    match eco {
        Ecosystem::Python => RunPlan {
            image: "python:3.11-slim",
            container_command:
                "pip install pytest --quiet --no-cache-dir && python -m pytest /repo --tb=short -v"
                    .to_string(),
            host_command: "if [ -f requirements.txt ]; then python3 -m pip install -r requirements.txt --quiet --no-cache-dir; fi && python3 -m pip install pytest --quiet --no-cache-dir && python3 -m pytest . --tb=short -v".to_string(),
        },
        Ecosystem::TypeScript => RunPlan {
            image: "node:20-slim",
            container_command:
                "cd /repo && npm install --silent && npx jest --passWithNoTests || npm test"
                    .to_string(),
            host_command: "npm install --silent && npx jest --passWithNoTests || npm test"
                .to_string(),
        },
        Ecosystem::JavaScript => RunPlan {
            image: "node:20-slim",
            container_command: "cd /repo && npm install --silent && npm test".to_string(),
            host_command: "npm install --silent && npm test".to_string(),
        },
    }
}
