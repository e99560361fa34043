use crate::{config::Config, util::extension_lower};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    /// Closed binary format; needs the host to produce a container.
    LegacyBinary,
    /// Zipped XML container, parseable directly.
    Container,
}

impl DocumentFormat {
    /// Classifies by extension. `None` means unsupported.
    pub fn classify(cfg: &Config, path: &Path) -> Option<Self> {
        let ext = extension_lower(path)?;
        let matches = |list: &[String]| list.iter().any(|e| e.eq_ignore_ascii_case(&ext));
        if matches(&cfg.formats.legacy_extensions) {
            Some(DocumentFormat::LegacyBinary)
        } else if matches(&cfg.formats.container_extensions) {
            Some(DocumentFormat::Container)
        } else {
            None
        }
    }
}

/// One input file for the duration of its pipeline run.
#[derive(Debug, Clone)]
pub struct DocumentHandle {
    pub source: PathBuf,
    pub format: DocumentFormat,
    pub container: Option<PathBuf>,
}

impl DocumentHandle {
    pub fn new(source: PathBuf, format: DocumentFormat) -> Self {
        Self {
            source,
            format,
            container: None,
        }
    }

    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    pub fn stem(&self) -> String {
        self.source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name())
    }

    /// Name of the edited result, e.g. `form_edited.hwp`.
    pub fn output_file_name(&self, cfg: &Config) -> String {
        format!(
            "{}{}.{}",
            self.stem(),
            cfg.output.suffix,
            cfg.output.extension.trim_start_matches('.')
        )
    }
}

