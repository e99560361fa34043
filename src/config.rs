use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub formats: Formats,
    #[serde(default)]
    pub container: Container,
    #[serde(default)]
    pub llm: Llm,
    #[serde(default)]
    pub host: Host,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub batch: Batch,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub print_summary: bool,
    pub keep_intermediates: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
            keep_intermediates: true,
        }
    }
}

/// Directories are resolved relative to the batch input directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub staging_dir: String,
    pub output_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            staging_dir: "temp_hwpx".into(),
            output_dir: "final_output".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formats {
    pub legacy_extensions: Vec<String>,
    pub container_extensions: Vec<String>,
    /// Format name handed to the host when normalizing legacy files.
    pub container_save_format: String,
}
impl Default for Formats {
    fn default() -> Self {
        Self {
            legacy_extensions: vec!["hwp".into()],
            container_extensions: vec!["hwpx".into()],
            container_save_format: "HWPX".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub body_part: String,
    pub body_tags: Vec<String>,
    pub paragraph_tag: String,
    pub table_tag: String,
    pub row_tag: String,
    pub cell_tag: String,
}
impl Default for Container {
    fn default() -> Self {
        Self {
            body_part: "Contents/section0.xml".into(),
            body_tags: vec!["body".into(), "sec".into()],
            paragraph_tag: "p".into(),
            table_tag: "tbl".into(),
            row_tag: "tr".into(),
            cell_tag: "tc".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Llm {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    /// 0 disables the local request size check.
    pub max_request_bytes: u64,
    pub json_response_format: bool,
    pub system_prompt: String,
    pub user_template: String,
}
impl Default for Llm {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".into(),
            model: "mistralai/mistral-7b-instruct:free".into(),
            api_key_env: "OPENROUTER_API_KEY".into(),
            temperature: 0.1,
            timeout_seconds: 600,
            max_request_bytes: 0,
            json_response_format: true,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            user_template: DEFAULT_USER_TEMPLATE.into(),
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an extremely competent document editing expert. \
Respond only with a JSON object that has exactly one key, \"actions\": a list of objects, \
each with a \"find\" string and a \"replace\" string. Do not add any other text.";

pub const DEFAULT_USER_TEMPLATE: &str = "Based on the [USER_REQUEST] below, create a specific modification plan for the [ORIGINAL_DOCUMENT].
The plan must be a JSON object containing a single key \"actions\", which is a list of replacement operations.
Each operation is an object with two keys: \"find\" (the exact text to find in the original document) and \"replace\" (the text to replace it with).

[USER_REQUEST]
{request}

[ORIGINAL_DOCUMENT]
{document}
";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub python_exe: String,
    pub script: String,
    pub visible: bool,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
impl Default for Host {
    fn default() -> Self {
        Self {
            python_exe: "python".into(),
            script: "scripts/hwp_host.py".into(),
            visible: false,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub suffix: String,
    pub extension: String,
    pub save_format: String,
    pub write_markdown: bool,
    pub write_plan_json: bool,
    pub write_report_json: bool,
    pub report_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            suffix: "_edited".into(),
            extension: "hwp".into(),
            save_format: "HWP".into(),
            write_markdown: true,
            write_plan_json: true,
            write_report_json: true,
            report_filename: "batch-report.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// 1 means a single round trip.
    pub plan_attempts: u32,
    pub retry_delay_seconds: u64,
    pub skip_empty_plans: bool,
    pub skip_empty_documents: bool,
}
impl Default for Batch {
    fn default() -> Self {
        Self {
            plan_attempts: 1,
            retry_delay_seconds: 2,
            skip_empty_plans: true,
            skip_empty_documents: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}
