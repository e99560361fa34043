use crate::document::DocumentFormat;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Furthest pipeline stage a file reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovered,
    Normalized,
    Parsed,
    Planned,
    Executed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum SkipReason {
    UnsupportedFormat,
    OutputConflict(String),
    Bridge(String),
    Parse(String),
    EmptyDocument,
    Plan(String),
    EmptyPlan,
    Exec(String),
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnsupportedFormat => f.write_str("unsupported-format"),
            SkipReason::OutputConflict(name) => write!(f, "output-conflict: {name}"),
            SkipReason::Bridge(e) => write!(f, "bridge: {e}"),
            SkipReason::Parse(e) => write!(f, "parse: {e}"),
            SkipReason::EmptyDocument => f.write_str("empty-document"),
            SkipReason::Plan(e) => write!(f, "plan: {e}"),
            SkipReason::EmptyPlan => f.write_str("empty-plan"),
            SkipReason::Exec(e) => write!(f, "exec: {e}"),
            SkipReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineResult {
    Success { output_path: PathBuf },
    Skipped { reason: SkipReason },
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub format: Option<DocumentFormat>,
    pub stage: Stage,
    pub outcome: PipelineResult,
    pub actions: usize,
    pub input_sha256: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started: String,
    pub finished: String,
    pub input_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub output_dir: PathBuf,
    pub instruction_sha256: String,
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.outcome.is_success()).count()
    }

    pub fn skipped(&self) -> usize {
        self.files.len() - self.succeeded()
    }

    pub fn outcome_of(&self, file: &str) -> Option<&PipelineResult> {
        self.files.iter().find(|f| f.file == file).map(|f| &f.outcome)
    }

    /// One status line per file followed by the counts.
    pub fn render_summary(&self) -> String {
        let width = self.files.iter().map(|f| f.file.len()).max().unwrap_or(4).max(4);
        let mut out = String::new();
        for f in &self.files {
            let (status, detail) = match &f.outcome {
                PipelineResult::Success { output_path } => {
                    ("OK", output_path.display().to_string())
                }
                PipelineResult::Skipped { reason } => ("SKIPPED", reason.to_string()),
            };
            out.push_str(&format!("{status:<8} {:<width$}  {detail}\n", f.file));
        }
        out.push_str(&format!(
            "{} file(s): {} succeeded, {} skipped",
            self.files.len(),
            self.succeeded(),
            self.skipped()
        ));
        out
    }
}
