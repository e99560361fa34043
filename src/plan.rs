//! Edit-plan protocol: the request handed to a planner and the validated
//! action list that comes back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("planner is not configured: {0}")]
    Unconfigured(String),
    #[error("planner request is too large ({size} bytes): {detail}")]
    TooLarge { size: u64, detail: String },
    #[error("planner request timed out after {0}s")]
    Timeout(u64),
    #[error("planner service unreachable: {0}")]
    Unreachable(String),
    #[error("planner service returned HTTP {status}: {body}")]
    Service { status: u16, body: String },
    #[error("invalid planner response: {0}")]
    InvalidResponse(String),
    #[error("cannot encode planner request: {0}")]
    Encode(String),
    #[error("edit action has an empty find string")]
    EmptyFind,
}

impl PlanError {
    /// Transient failures worth another round trip.
    pub fn is_retryable(&self) -> bool {
        match self {
            PlanError::Timeout(_) | PlanError::Unreachable(_) => true,
            PlanError::Service { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Replace every non-overlapping occurrence of `find` with `replace`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditAction {
    find: String,
    replace: String,
}

impl EditAction {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Result<Self, PlanError> {
        let find = find.into();
        if find.is_empty() {
            return Err(PlanError::EmptyFind);
        }
        Ok(Self {
            find,
            replace: replace.into(),
        })
    }

    pub fn find(&self) -> &str {
        &self.find
    }

    pub fn replace(&self) -> &str {
        &self.replace
    }
}

/// Ordered actions for one document, applied front to back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModificationPlan {
    actions: Vec<EditAction>,
}

impl ModificationPlan {
    pub fn new(actions: Vec<EditAction>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> &[EditAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// What a planner receives for one document.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub system_instruction: &'a str,
    pub user_instruction: &'a str,
    pub document_text: &'a str,
}

pub trait Planner {
    fn propose(&self, extracted_text: &str, instruction: &str)
        -> Result<ModificationPlan, PlanError>;
}

#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    find: Option<String>,
    #[serde(default)]
    replace: Option<String>,
}

/// Validates a planner's JSON payload.
///
/// The top level must be an object with an `actions` array. Elements that
/// lack a string `find` or `replace`, carry an `action` other than
/// `replace_text`, or have an empty `find` are dropped with a warning.
pub fn parse_plan_response(content: &str) -> Result<ModificationPlan, PlanError> {
    let payload = strip_code_fence(content);
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| PlanError::InvalidResponse(format!("not JSON: {e}")))?;

    let items = value
        .get("actions")
        .and_then(Value::as_array)
        .ok_or_else(|| PlanError::InvalidResponse("missing top-level `actions` array".into()))?;

    let mut actions = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let raw: RawAction = match serde_json::from_value(item.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("dropping plan element {i}: {e}");
                continue;
            }
        };
        if let Some(kind) = raw.action.as_deref() {
            if kind != "replace_text" {
                warn!("dropping plan element {i}: unsupported action {kind:?}");
                continue;
            }
        }
        let (Some(find), Some(replace)) = (raw.find, raw.replace) else {
            warn!("dropping plan element {i}: needs string `find` and `replace`");
            continue;
        };
        match EditAction::new(find, replace) {
            Ok(a) => actions.push(a),
            Err(e) => warn!("dropping plan element {i}: {e}"),
        }
    }

    debug!("plan accepted {} of {} elements", actions.len(), items.len());
    Ok(ModificationPlan::new(actions))
}

fn strip_code_fence(content: &str) -> &str {
    let t = content.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // optional language tag on the opening fence line
    let (first, tail) = rest.split_once('\n').unwrap_or((rest, ""));
    let first = first.trim();
    if first.is_empty() || first.starts_with('{') {
        rest.trim()
    } else {
        tail.trim()
    }
}
