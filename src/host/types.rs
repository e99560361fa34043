use serde::{Deserialize, Serialize};

/// One line on the bridge process's stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum HostRequest {
    Doctor,
    Open { path: String, visible: bool },
    ExtractText,
    ReplaceAll { find: String, replace: String },
    SaveAs {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    Close,
}

/// One line on the bridge process's stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostReply {
    pub ok: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub diag: Option<HostDiag>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostDiag {
    pub python_version: String,
    pub host_available: bool,
    #[serde(default)]
    pub host_version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
