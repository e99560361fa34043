//! Applies a [`ModificationPlan`] to a staged container through the
//! automation host and publishes the saved result.

use crate::{
    config::Config,
    host::AutomationHost,
    plan::ModificationPlan,
    util::remove_file_quiet,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("host could not open {path}: {source:#}")]
    Open {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("replace #{index} ({find:?}) failed: {source:#}")]
    Replace {
        index: usize,
        find: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("host could not save {path}: {source:#}")]
    Save {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("host session did not close cleanly: {source:#}")]
    Close {
        #[source]
        source: anyhow::Error,
    },
    #[error("cannot publish {path}: {source:#}")]
    Publish {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

pub struct Executor<'a> {
    cfg: &'a Config,
    staging_dir: &'a Path,
    output_dir: &'a Path,
}

impl<'a> Executor<'a> {
    pub fn new(cfg: &'a Config, staging_dir: &'a Path, output_dir: &'a Path) -> Self {
        Self {
            cfg,
            staging_dir,
            output_dir,
        }
    }

    /// `<container-stem><suffix>.<extension>`
    pub fn output_file_name(&self, container: &Path) -> String {
        let stem = container
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".into());
        format!(
            "{}{}.{}",
            stem,
            self.cfg.output.suffix,
            self.cfg.output.extension.trim_start_matches('.')
        )
    }

    /// Opens `container`, applies every action in order, saves into staging
    /// and moves the file into the output directory. The session is closed
    /// on every path; nothing is left in the output directory on failure.
    pub fn apply<H: AutomationHost + ?Sized>(
        &self,
        host: &mut H,
        container: &Path,
        plan: &ModificationPlan,
    ) -> Result<PathBuf, ExecError> {
        let name = self.output_file_name(container);
        let staged = self.staging_dir.join(&name);
        let published = self.output_dir.join(&name);
        let _ = remove_file_quiet(&staged);

        if let Err(source) = host.open(container) {
            let _ = host.close();
            return Err(ExecError::Open {
                path: container.display().to_string(),
                source,
            });
        }

        let edited = self.edit_and_save(host, plan, &staged);
        let closed = host.close();

        if let Err(e) = edited {
            let _ = remove_file_quiet(&staged);
            return Err(e);
        }
        if let Err(source) = closed {
            let _ = remove_file_quiet(&staged);
            return Err(ExecError::Close { source });
        }

        self.publish(&staged, &published)?;
        info!(
            "applied {} action(s) -> {}",
            plan.len(),
            published.display()
        );
        Ok(published)
    }

    fn edit_and_save<H: AutomationHost + ?Sized>(
        &self,
        host: &mut H,
        plan: &ModificationPlan,
        staged: &Path,
    ) -> Result<(), ExecError> {
        for (index, action) in plan.actions().iter().enumerate() {
            debug!("replace #{index}: {:?} -> {:?}", action.find(), action.replace());
            host.replace_all(action.find(), action.replace())
                .map_err(|source| ExecError::Replace {
                    index,
                    find: action.find().to_string(),
                    source,
                })?;
        }

        let format = Some(self.cfg.output.save_format.as_str()).filter(|f| !f.is_empty());
        host.save_as(staged, format)
            .map_err(|source| ExecError::Save {
                path: staged.display().to_string(),
                source,
            })?;
        if !staged.exists() {
            return Err(ExecError::Save {
                path: staged.display().to_string(),
                source: anyhow::anyhow!("host reported success but wrote no file"),
            });
        }
        Ok(())
    }

    fn publish(&self, staged: &Path, published: &Path) -> Result<(), ExecError> {
        let publish_err = |source: anyhow::Error| ExecError::Publish {
            path: published.display().to_string(),
            source,
        };
        if published.exists() {
            warn!("overwriting existing output {}", published.display());
        }
        if std::fs::rename(staged, published).is_ok() {
            return Ok(());
        }

        // Different filesystems: copy next to the target, then rename there.
        let partial = published.with_extension("partial");
        let copied = std::fs::copy(staged, &partial)
            .and_then(|_| std::fs::rename(&partial, published));
        if let Err(e) = copied {
            let _ = remove_file_quiet(&partial);
            let _ = remove_file_quiet(staged);
            return Err(publish_err(e.into()));
        }
        remove_file_quiet(staged).map_err(publish_err)
    }
}
