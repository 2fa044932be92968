//! Stage 2: turn failing test logs into bug reports and replacement files.
//!
//! The model is held to a strict two-section contract: grammar-checked bug
//! lines, then a single fenced json block mapping file paths to complete
//! corrected contents. Anything off-contract is dropped rather than
//! guessed at.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::HealError;
use crate::events::{EmitHandle, EventTag};
use crate::model::FixModel;
use crate::types::BugReport;

#[allow(clippy::unwrap_used)]
static SOURCE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z0-9_./:@\-]+\.(?:py|jsx|tsx|js|ts))").unwrap());

#[allow(clippy::unwrap_used)]
static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").unwrap());

#[derive(Deserialize)]
struct FixPayload {
    #[serde(default)]
    fixes: BTreeMap<String, String>,
}

/// What the model produced for one attempt.
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    /// Canonical bug lines, re-rendered from the parsed form.
    pub bug_reports: Vec<String>,
    pub fixes: BTreeMap<String, String>,
    /// Set only when the model call itself failed.
    pub error: Option<HealError>,
}

pub struct Synthesizer {
    pub model: Arc<dyn FixModel>,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn FixModel>) -> Self {
        Self { model }
    }

    pub async fn synthesize(&self, workdir: &Path, logs: &str, emit: &EmitHandle) -> Synthesis {
        let context = collect_source_context(workdir, logs);
        let prompt = build_prompt(logs, &context);

        emit.log(
            EventTag::Agent,
            format!("Sending {} chars of failing output to the model", logs.len()),
        );

        let raw = match self.model.generate(&prompt).await {
            Ok(r) => r,
            Err(e) => {
                warn!("model call failed: {e}");
                emit.log(EventTag::Error, format!("Model call failed: {e}"));
                return Synthesis {
                    error: Some(HealError::SynthesisCall(e.to_string())),
                    ..Synthesis::default()
                };
            }
        };

        let bug_reports: Vec<String> = BugReport::extract_all(&raw)
            .iter()
            .map(BugReport::canonical)
            .collect();
        for line in &bug_reports {
            emit.log(EventTag::Bug, line.clone());
        }

        let fixes = match extract_fixes(&raw) {
            Ok(fixes) => fixes,
            Err(e) => {
                // Off-contract output costs this attempt its fixes, nothing more.
                warn!("fix payload unparseable: {e}");
                emit.log(EventTag::Error, format!("Fix payload unparseable: {e}"));
                BTreeMap::new()
            }
        };

        info!(
            bugs = bug_reports.len(),
            fixes = fixes.len(),
            "synthesis complete"
        );
        emit.log(
            EventTag::Agent,
            format!(
                "Model reported {} bug(s) and {} fix(es)",
                bug_reports.len(),
                fixes.len()
            ),
        );

        Synthesis {
            bug_reports,
            fixes,
            error: None,
        }
    }
}

/// Pull source-file paths out of the failing logs and inline each file that
/// resolves under the workdir (or absolutely), as `=== path ===` blocks.
pub fn collect_source_context(workdir: &Path, logs: &str) -> String {
    let mut seen: Vec<String> = Vec::new();
    let mut blocks = String::new();

    for caps in SOURCE_PATH.captures_iter(logs) {
        let raw = caps[1].to_string();
        if seen.contains(&raw) {
            continue;
        }
        seen.push(raw.clone());

        let candidate = PathBuf::from(&raw);
        let resolved = if candidate.is_absolute() {
            candidate
        } else {
            workdir.join(&candidate)
        };
        if !resolved.is_file() {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&resolved) else {
            continue;
        };
        let display = resolved
            .strip_prefix(workdir)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or(raw);
        blocks.push_str(&format!("=== {display} ===\n{content}\n"));
    }
    blocks
}

fn extract_fixes(raw: &str) -> Result<BTreeMap<String, String>, HealError> {
    let caps = FENCED_JSON
        .captures(raw)
        .ok_or_else(|| HealError::SynthesisParse("no fenced json block in output".to_string()))?;
    let payload: FixPayload = serde_json::from_str(&caps[1])
        .map_err(|e| HealError::SynthesisParse(e.to_string()))?;
    Ok(payload.fixes)
}

fn build_prompt(logs: &str, context: &str) -> String {
    format!(
        "You are an autonomous repair agent for a failing test suite.\n\
         Analyze the test output and source files below, then respond in EXACTLY two sections.\n\
         \n\
         Section 1, one line per defect, in this exact format:\n\
         [KIND] error in <file path> line <line number> → Fix: <short description>\n\
         KIND must be one of LINTING, SYNTAX, LOGIC, TYPE_ERROR, IMPORT, INDENTATION.\n\
         Use the arrow character → (U+2192), never ->.\n\
         Example:\n\
         [SYNTAX] error in src/app.py line 14 → Fix: close the unterminated string literal\n\
         \n\
         Section 2, exactly one fenced json block with the complete corrected content of every file you change:\n\
         ```json\n\
         {{\"fixes\": {{\"path/to/file.py\": \"<entire corrected file content>\"}}}}\n\
         ```\n\
         Return the full content of each fixed file, never a fragment.\n\
         \n\
         === TEST OUTPUT ===\n\
         {logs}\n\
         \n\
         === SOURCE FILES ===\n\
         {context}\n"
    )
}
