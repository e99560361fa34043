//! Normalizes each input into a container inside the staging directory.
//!
//! Legacy binaries are converted by the automation host; container inputs
//! are copied, so later stages never hold the original file open. The staged
//! container keeps the source's stem.

use crate::{
    config::Config,
    document::{DocumentFormat, DocumentHandle},
    host::AutomationHost,
    util::remove_file_quiet,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("host failed to convert {path}: {source:#}")]
    Host {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("host reported success but {0} was not produced")]
    NoOutput(String),
    #[error("cannot stage {path}: {source}")]
    Stage {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct FormatBridge<'a> {
    cfg: &'a Config,
    staging_dir: &'a Path,
}

impl<'a> FormatBridge<'a> {
    pub fn new(cfg: &'a Config, staging_dir: &'a Path) -> Self {
        Self { cfg, staging_dir }
    }

    /// Staging location for `handle`'s container.
    pub fn staged_path(&self, handle: &DocumentHandle) -> PathBuf {
        let ext = self
            .cfg
            .formats
            .container_extensions
            .first()
            .map(String::as_str)
            .unwrap_or("hwpx");
        self.staging_dir.join(format!("{}.{}", handle.stem(), ext))
    }

    /// Produces the container and records it on the handle.
    pub fn normalize<H: AutomationHost + ?Sized>(
        &self,
        host: &mut H,
        handle: &mut DocumentHandle,
    ) -> Result<PathBuf, BridgeError> {
        let target = self.staged_path(handle);
        let stage_err = |source: std::io::Error| BridgeError::Stage {
            path: target.display().to_string(),
            source,
        };
        if let Err(e) = remove_file_quiet(&target) {
            return Err(stage_err(std::io::Error::other(format!("{e:#}"))));
        }

        match handle.format {
            DocumentFormat::Container => {
                std::fs::copy(&handle.source, &target).map_err(stage_err)?;
                debug!("staged {} -> {}", handle.source.display(), target.display());
            }
            DocumentFormat::LegacyBinary => {
                self.convert(host, &handle.source, &target)?;
                info!(
                    "converted {} -> {}",
                    handle.file_name(),
                    target.display()
                );
            }
        }

        handle.container = Some(target.clone());
        Ok(target)
    }

    fn convert<H: AutomationHost + ?Sized>(
        &self,
        host: &mut H,
        source: &Path,
        target: &Path,
    ) -> Result<(), BridgeError> {
        let host_err = |source_err: anyhow::Error| BridgeError::Host {
            path: source.display().to_string(),
            source: source_err,
        };
        let converted = host.open(source).and_then(|_| {
            host.save_as(target, Some(&self.cfg.formats.container_save_format))
        });
        let closed = host.close();
        converted.map_err(host_err)?;
        closed.map_err(host_err)?;

        if !target.exists() {
            return Err(BridgeError::NoOutput(target.display().to_string()));
        }
        Ok(())
    }
}
