//! Blocking chat-completions client that turns a document and an
//! instruction into a [`ModificationPlan`].

use crate::{
    config,
    plan::{parse_plan_response, ModificationPlan, PlanError, PlanRequest, Planner},
};
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// API key for the planner service. Never printed.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    /// Reads the named variable once; unset or blank yields `None`.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(Self::new)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: std::borrow::Cow<'a, str>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct LlmPlanner {
    cfg: config::Llm,
    credentials: Option<Credentials>,
    client: Client,
    placeholder: Regex,
}

impl LlmPlanner {
    pub fn new(cfg: &config::Llm, credentials: Option<Credentials>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds.max(1)))
            .build()
            .with_context(|| "building HTTP client")?;
        let placeholder =
            Regex::new(r"\{(request|document)\}").with_context(|| "compiling template regex")?;
        Ok(Self {
            cfg: cfg.clone(),
            credentials,
            client,
            placeholder,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Fills `{request}` and `{document}` in a single pass, so neither value
    /// is ever re-scanned for placeholders.
    pub fn render_user_prompt(&self, req: &PlanRequest<'_>) -> String {
        self.placeholder
            .replace_all(&self.cfg.user_template, |caps: &Captures<'_>| match &caps[1] {
                "request" => req.user_instruction.to_string(),
                _ => req.document_text.to_string(),
            })
            .into_owned()
    }

    /// Serialized request body. The document is included verbatim.
    pub fn request_body(&self, extracted_text: &str, instruction: &str) -> Result<Vec<u8>, PlanError> {
        let req = PlanRequest {
            system_instruction: &self.cfg.system_prompt,
            user_instruction: instruction,
            document_text: extracted_text,
        };
        let chat = ChatRequest {
            model: &self.cfg.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: req.system_instruction.into(),
                },
                ChatMessage {
                    role: "user",
                    content: self.render_user_prompt(&req).into(),
                },
            ],
            temperature: self.cfg.temperature,
            response_format: self
                .cfg
                .json_response_format
                .then_some(ResponseFormat { kind: "json_object" }),
        };
        serde_json::to_vec(&chat).map_err(|e| PlanError::Encode(e.to_string()))
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'))
    }

    fn transport_error(&self, e: reqwest::Error) -> PlanError {
        if e.is_timeout() {
            PlanError::Timeout(self.cfg.timeout_seconds)
        } else {
            PlanError::Unreachable(e.to_string())
        }
    }
}

impl Planner for LlmPlanner {
    fn propose(
        &self,
        extracted_text: &str,
        instruction: &str,
    ) -> Result<ModificationPlan, PlanError> {
        let creds = self.credentials.as_ref().ok_or_else(|| {
            PlanError::Unconfigured(format!("{} is not set", self.cfg.api_key_env))
        })?;

        let body = self.request_body(extracted_text, instruction)?;
        let size = body.len() as u64;
        if self.cfg.max_request_bytes > 0 && size > self.cfg.max_request_bytes {
            return Err(PlanError::TooLarge {
                size,
                detail: format!("limit is {} bytes", self.cfg.max_request_bytes),
            });
        }

        info!("requesting edit plan model={} bytes={}", self.cfg.model, size);
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&creds.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let text = resp.text().map_err(|e| self.transport_error(e))?;
        debug!("planner HTTP {} ({} bytes)", status.as_u16(), text.len());

        if status == StatusCode::PAYLOAD_TOO_LARGE || looks_like_context_overflow(status, &text) {
            return Err(PlanError::TooLarge {
                size,
                detail: truncate(&text, 300),
            });
        }
        if !status.is_success() {
            return Err(PlanError::Service {
                status: status.as_u16(),
                body: truncate(&text, 500),
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| PlanError::InvalidResponse(format!("completion envelope: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PlanError::InvalidResponse("completion has no content".into()))?;

        parse_plan_response(&content)
    }
}

fn looks_like_context_overflow(status: StatusCode, body: &str) -> bool {
    status == StatusCode::BAD_REQUEST && {
        let b = body.to_ascii_lowercase();
        b.contains("context_length") || b.contains("maximum context length")
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
