use crate::{
    batch::Batch,
    config::Config,
    container,
    document::DocumentFormat,
    host::{python::PythonHost, AutomationHost},
    llm::{Credentials, LlmPlanner},
    plan::Planner,
    util::ensure_dir,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "hwpx-edit")]
#[command(about = "Batch review-and-edit of HWP/HWPX documents (container parsing + LLM edit plans)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./hwpx-edit.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check the automation host bridge and planner credentials.
    Doctor {},
    /// Print the text extracted from one container file.
    Extract {
        #[arg(long)]
        input: PathBuf,
    },
    /// Ask the planner for an edit plan for one container file and print it.
    Plan {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        instruction: InstructionArgs,
    },
    /// Process every supported file in a directory.
    Run {
        #[arg(long)]
        input_dir: PathBuf,
        #[command(flatten)]
        instruction: InstructionArgs,
    },
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
pub struct InstructionArgs {
    /// Edit instruction applied to every document.
    #[arg(long)]
    pub instruction: Option<String>,
    /// Read the edit instruction from a UTF-8 file.
    #[arg(long)]
    pub instruction_file: Option<PathBuf>,
}

impl InstructionArgs {
    pub fn resolve(&self) -> Result<String> {
        let raw = match (&self.instruction, &self.instruction_file) {
            (Some(s), _) => s.clone(),
            (None, Some(p)) => std::fs::read_to_string(p)
                .with_context(|| format!("reading instruction file: {}", p.display()))?,
            (None, None) => bail!("an instruction is required"),
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            bail!("instruction is empty");
        }
        Ok(trimmed.to_string())
    }
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(p) => Config::load(&p)?,
        None => Config::default(),
    };

    match &args.cmd {
        Command::Doctor {} => {
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg, None).as_deref())?;
            doctor(&cfg)
        }
        Command::Extract { input } => {
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg, None).as_deref())?;
            extract(&cfg, input)
        }
        Command::Plan { input, instruction } => {
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg, None).as_deref())?;
            plan(&cfg, input, &instruction.resolve()?)
        }
        Command::Run {
            input_dir,
            instruction,
        } => run(&args, &cfg, input_dir, &instruction.resolve()?),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["hwpx-edit.toml", "hwpx-edit.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config, staging_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    staging_dir.map(|d| d.join("hwpx-edit.log"))
}

fn doctor(cfg: &Config) -> Result<()> {
    let host = PythonHost::new(&cfg.host).and_then(|mut h| h.doctor());
    let host_json = match host {
        Ok(diag) => serde_json::to_value(&diag)?,
        Err(e) => serde_json::json!({ "ok": false, "error": format!("{e:#}") }),
    };
    let credential_present = Credentials::from_env(&cfg.llm.api_key_env).is_some();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "host": host_json,
            "planner": {
                "base_url": cfg.llm.base_url,
                "model": cfg.llm.model,
                "credential_env": cfg.llm.api_key_env,
                "credential_present": credential_present,
            },
        }))?
    );
    Ok(())
}

fn require_container(cfg: &Config, input: &Path) -> Result<()> {
    if !input.is_file() {
        bail!("input does not exist: {}", input.display());
    }
    match DocumentFormat::classify(cfg, input) {
        Some(DocumentFormat::Container) => Ok(()),
        Some(DocumentFormat::LegacyBinary) => bail!(
            "{} is a legacy binary; use `run` so the host can normalize it",
            input.display()
        ),
        None => bail!("unsupported input format: {}", input.display()),
    }
}

fn extract(cfg: &Config, input: &Path) -> Result<()> {
    require_container(cfg, input)?;
    let text = container::extract_markdown(&cfg.container, input)?;
    println!("{text}");
    Ok(())
}

fn plan(cfg: &Config, input: &Path, instruction: &str) -> Result<()> {
    require_container(cfg, input)?;
    let text = container::extract_markdown(&cfg.container, input)?;
    let planner = LlmPlanner::new(&cfg.llm, Credentials::from_env(&cfg.llm.api_key_env))?;
    let plan = planner.propose(&text, instruction)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn run(args: &Args, cfg: &Config, input_dir: &Path, instruction: &str) -> Result<()> {
    if !input_dir.is_dir() {
        bail!("input directory does not exist: {}", input_dir.display());
    }
    let staging = input_dir.join(&cfg.paths.staging_dir);
    ensure_dir(&staging)?;

    let log_path = resolve_log_path(cfg, Some(&staging));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    let host = PythonHost::new(&cfg.host)?;
    let planner = LlmPlanner::new(&cfg.llm, Credentials::from_env(&cfg.llm.api_key_env))?;
    if !planner.is_configured() {
        warn!(
            "{} is not set; every file will be skipped at the plan stage",
            cfg.llm.api_key_env
        );
    }

    info!("run input_dir={}", input_dir.display());
    let mut batch = Batch::new(cfg, host, planner);
    let report = batch.run(input_dir, instruction)?;

    if cfg.global.print_summary {
        println!("{}", report.render_summary());
    }
    Ok(())
}
