use crate::{
    bridge::FormatBridge,
    config::Config,
    container::{self, render_blocks},
    document::{DocumentFormat, DocumentHandle},
    executor::Executor,
    host::AutomationHost,
    plan::{ModificationPlan, PlanError, Planner},
    report::{BatchReport, FileReport, PipelineResult, SkipReason, Stage},
    util::{ensure_dir, hash_file, now_rfc3339, remove_file_quiet, sha256_hex},
};
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sequential driver over one input directory. Every per-file failure is
/// turned into a skip; only the run's directories failing to materialize
/// aborts the batch.
pub struct Batch<H: AutomationHost, P: Planner> {
    cfg: Config,
    host: H,
    planner: P,
    cancel: Option<Arc<AtomicBool>>,
}

struct RunDirs {
    staging: PathBuf,
    output: PathBuf,
}

/// Per-run bookkeeping shared across files.
#[derive(Default)]
struct RunState {
    /// Lower-cased names already published this run.
    published: HashSet<String>,
    staged: Vec<PathBuf>,
}

impl<H: AutomationHost, P: Planner> Batch<H, P> {
    pub fn new(cfg: &Config, host: H, planner: P) -> Self {
        Self {
            cfg: cfg.clone(),
            host,
            planner,
            cancel: None,
        }
    }

    /// Once set, files not yet started are skipped as cancelled.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    pub fn run(&mut self, input_dir: &Path, instruction: &str) -> Result<BatchReport> {
        let started = now_rfc3339();
        let dirs = RunDirs {
            staging: input_dir.join(&self.cfg.paths.staging_dir),
            output: input_dir.join(&self.cfg.paths.output_dir),
        };
        ensure_dir(&dirs.staging)?;
        ensure_dir(&dirs.output)?;
        check_run_dirs(input_dir, &dirs)?;

        let entries = list_input_files(input_dir)?;
        info!(
            "batch start dir={} files={} staging={} output={}",
            input_dir.display(),
            entries.len(),
            dirs.staging.display(),
            dirs.output.display()
        );

        let mut state = RunState::default();
        let mut files = Vec::with_capacity(entries.len());
        for (i, path) in entries.iter().enumerate() {
            let name = file_name(path);
            if self.is_cancelled() {
                files.push(skipped_report(name, SkipReason::Cancelled));
                continue;
            }

            info!("[{}/{}] {}", i + 1, entries.len(), name);
            let report = self.process_file(path, instruction, &dirs, &mut state);
            match &report.outcome {
                PipelineResult::Success { output_path } => {
                    info!("[{}/{}] OK {} -> {}", i + 1, entries.len(), name, output_path.display())
                }
                PipelineResult::Skipped { reason } => {
                    warn!("[{}/{}] SKIPPED {}: {}", i + 1, entries.len(), name, reason)
                }
            }
            files.push(report);
        }

        if !self.cfg.global.keep_intermediates {
            for p in &state.staged {
                if let Err(e) = remove_file_quiet(p) {
                    warn!("cleanup failed: {e:#}");
                }
            }
        }

        let report = BatchReport {
            started,
            finished: now_rfc3339(),
            input_dir: input_dir.to_path_buf(),
            staging_dir: dirs.staging.clone(),
            output_dir: dirs.output.clone(),
            instruction_sha256: sha256_hex(instruction.as_bytes()),
            files,
        };
        info!(
            "batch done: {} succeeded, {} skipped",
            report.succeeded(),
            report.skipped()
        );

        if self.cfg.output.write_report_json {
            let path = dirs.staging.join(&self.cfg.output.report_filename);
            let written = serde_json::to_string_pretty(&report)
                .map_err(anyhow::Error::from)
                .and_then(|raw| std::fs::write(&path, raw).map_err(anyhow::Error::from));
            if let Err(e) = written {
                warn!("cannot write batch report {}: {e:#}", path.display());
            }
        }

        Ok(report)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn process_file(
        &mut self,
        path: &Path,
        instruction: &str,
        dirs: &RunDirs,
        state: &mut RunState,
    ) -> FileReport {
        let started = Instant::now();
        let mut report = FileReport {
            file: file_name(path),
            format: None,
            stage: Stage::Discovered,
            outcome: PipelineResult::Skipped {
                reason: SkipReason::UnsupportedFormat,
            },
            actions: 0,
            input_sha256: None,
            elapsed_ms: 0,
        };

        let outcome = match self.drive(path, instruction, dirs, state, &mut report) {
            Ok(output_path) => PipelineResult::Success { output_path },
            Err(reason) => PipelineResult::Skipped { reason },
        };
        report.outcome = outcome;
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report
    }

    fn drive(
        &mut self,
        path: &Path,
        instruction: &str,
        dirs: &RunDirs,
        state: &mut RunState,
        report: &mut FileReport,
    ) -> Result<PathBuf, SkipReason> {
        let format =
            DocumentFormat::classify(&self.cfg, path).ok_or(SkipReason::UnsupportedFormat)?;
        report.format = Some(format);
        report.input_sha256 = match hash_file(path) {
            Ok(h) => Some(h),
            Err(e) => {
                warn!("cannot hash {}: {e:#}", path.display());
                None
            }
        };

        let mut handle = DocumentHandle::new(path.to_path_buf(), format);
        let out_name = handle.output_file_name(&self.cfg);
        let out_key = out_name.to_lowercase();
        if state.published.contains(&out_key) {
            return Err(SkipReason::OutputConflict(out_name));
        }

        let staged = FormatBridge::new(&self.cfg, &dirs.staging)
            .normalize(&mut self.host, &mut handle)
            .map_err(|e| SkipReason::Bridge(e.to_string()))?;
        state.staged.push(staged.clone());
        report.stage = Stage::Normalized;

        let blocks = container::parse(&self.cfg.container, &staged)
            .map_err(|e| SkipReason::Parse(e.to_string()))?;
        let text = render_blocks(&blocks);
        report.stage = Stage::Parsed;
        debug!("{} blocks, {} chars of extracted text", blocks.len(), text.chars().count());

        if self.cfg.output.write_markdown {
            write_artifact(&dirs.staging.join(format!("{}.md", handle.stem())), &text);
        }
        if text.trim().is_empty() && self.cfg.batch.skip_empty_documents {
            return Err(SkipReason::EmptyDocument);
        }

        let plan = self
            .propose_with_retry(&text, instruction)
            .map_err(|e| SkipReason::Plan(e.to_string()))?;
        report.actions = plan.len();
        report.stage = Stage::Planned;

        if self.cfg.output.write_plan_json {
            match serde_json::to_string_pretty(&plan) {
                Ok(raw) => write_artifact(
                    &dirs.staging.join(format!("{}.plan.json", handle.stem())),
                    &raw,
                ),
                Err(e) => warn!("cannot encode plan: {e}"),
            }
        }
        if plan.is_empty() && self.cfg.batch.skip_empty_plans {
            return Err(SkipReason::EmptyPlan);
        }

        let output = Executor::new(&self.cfg, &dirs.staging, &dirs.output)
            .apply(&mut self.host, &staged, &plan)
            .map_err(|e| SkipReason::Exec(e.to_string()))?;
        state.published.insert(out_key);
        report.stage = Stage::Executed;
        Ok(output)
    }

    fn propose_with_retry(
        &self,
        text: &str,
        instruction: &str,
    ) -> Result<ModificationPlan, PlanError> {
        let attempts = self.cfg.batch.plan_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.planner.propose(text, instruction) {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!("plan attempt {attempt}/{attempts} failed: {e}; retrying");
                    std::thread::sleep(Duration::from_secs(self.cfg.batch.retry_delay_seconds));
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Staging and output must be distinct directories, neither of them the
/// input directory itself.
fn check_run_dirs(input_dir: &Path, dirs: &RunDirs) -> Result<()> {
    let resolve = |p: &Path| {
        std::fs::canonicalize(p).with_context(|| format!("resolving {}", p.display()))
    };
    let input = resolve(input_dir)?;
    let staging = resolve(&dirs.staging)?;
    let output = resolve(&dirs.output)?;
    if staging == input {
        bail!("staging directory must not be the input directory: {}", input.display());
    }
    if output == input {
        bail!("output directory must not be the input directory: {}", input.display());
    }
    if staging == output {
        bail!("staging and output directories must differ: {}", staging.display());
    }
    Ok(())
}

/// Regular files directly inside `dir`, sorted by name.
fn list_input_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read_dir {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read_dir entry in {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn skipped_report(file: String, reason: SkipReason) -> FileReport {
    FileReport {
        file,
        format: None,
        stage: Stage::Discovered,
        outcome: PipelineResult::Skipped { reason },
        actions: 0,
        input_sha256: None,
        elapsed_ms: 0,
    }
}

fn write_artifact(path: &Path, contents: &str) {
    if let Err(e) = std::fs::write(path, contents) {
        warn!("cannot write {}: {e}", path.display());
    }
}
