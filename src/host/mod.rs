pub mod python;
pub mod types;

use anyhow::Result;
use std::path::Path;

pub use types::{HostDiag, HostReply, HostRequest};

/// A word-processor automation host modeled as a single interactive
/// application: at most one document session is open at a time, and every
/// call blocks until the host answers.
pub trait AutomationHost {
    fn doctor(&mut self) -> Result<HostDiag>;
    fn open(&mut self, path: &Path) -> Result<()>;
    fn extract_text(&mut self) -> Result<String>;
    /// Whole-document replace of every occurrence, without confirmation prompts.
    fn replace_all(&mut self, find: &str, replace: &str) -> Result<()>;
    fn save_as(&mut self, path: &Path, format: Option<&str>) -> Result<()>;
    /// Ends the session. Closing with no open session is a no-op.
    fn close(&mut self) -> Result<()>;
}
