use std::time::Duration;

use rand::Rng;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::settings::{ModelConfig, ModelRole, Settings};
use crate::engine::extractor::parse_lenient_json;
use crate::engine::prompt_builder::PromptBuilder;
use crate::engine::sse_decoder::WireDialect;
use crate::model::ending::EndingVerdict;
use crate::model::game_context::{EndingRequest, JudgeRequest, NarrateRequest};
use crate::model::message::ChatMessage;

pub const NARRATE_PATH: &str = "/api/game/narrate/stream";
pub const JUDGE_PATH: &str = "/api/game/judge/stream";
pub const ENDING_PATH: &str = "/api/game/ending";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("session expired; please sign in again")]
    SessionExpired,
    #[error("server unreachable: {0}")]
    Unreachable(String),
    #[error("server is at capacity (HTTP {0}); try again later")]
    AtCapacity(u16),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("token refresh failed: {0}")]
    Refresh(String),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Request(reqwest::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            TransportError::Unreachable(e.to_string())
        } else {
            TransportError::Request(e)
        }
    }
}

/// Produces a fresh bearer token after the server rejected the current one.
pub trait AuthRefresh: Send {
    fn refresh(&mut self) -> anyhow::Result<String>;
}

impl<F> AuthRefresh for F
where
    F: FnMut() -> anyhow::Result<String> + Send,
{
    fn refresh(&mut self) -> anyhow::Result<String> {
        self()
    }
}

/// Authenticated connection to the game backend.
///
/// Carries its own token so independent sessions never share auth state.
pub struct Session {
    client: Client,
    base_url: String,
    token: Option<String>,
    refresher: Option<Box<dyn AuthRefresh>>,
}

impl Session {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: trim_base_url(&base_url.into()),
            token: None,
            refresher: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_refresher(mut self, refresher: impl AuthRefresh + 'static) -> Self {
        self.refresher = Some(Box::new(refresher));
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body and hand back the streaming response.
    ///
    /// A 401 triggers one token refresh and one retry; a second 401 is a
    /// [`TransportError::SessionExpired`].
    pub fn post_stream<B: Serialize>(&mut self, path: &str, body: &B) -> Result<Response, TransportError> {
        let body = serde_json::to_value(body)
            .map_err(|e| TransportError::InvalidResponse(format!("unserializable request: {}", e)))?;

        let resp = self.send(path, &body)?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return check_status(resp);
        }

        let Some(refresher) = self.refresher.as_mut() else {
            return Err(TransportError::SessionExpired);
        };
        tracing::info!(target: "survival_narrator", "token rejected on {}; refreshing once", path);
        let token = refresher
            .refresh()
            .map_err(|e| TransportError::Refresh(e.to_string()))?;
        self.token = Some(token);

        let retry = self.send(path, &body)?;
        check_status(retry)
    }

    pub fn post_json<B: Serialize>(&mut self, path: &str, body: &B) -> Result<Value, TransportError> {
        let resp = self.post_stream(path, body)?;
        resp.json::<Value>()
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }

    fn send(&self, path: &str, body: &Value) -> Result<Response, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req: RequestBuilder = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        tracing::debug!(target: "survival_narrator", "POST {}", url);
        Ok(req.send()?)
    }
}

#[derive(Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
}

#[derive(Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
}

#[derive(Deserialize)]
pub struct Choice {
    pub message: ChatMessageResponse,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatMessageResponse {
    #[serde(default)]
    pub content: Option<String>,
}

/// Direct OpenAI-compatible chat endpoint used in custom mode.
pub struct CustomEndpoint {
    client: Client,
    config: ModelConfig,
}

impl CustomEndpoint {
    pub fn new(config: ModelConfig, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", trim_base_url(&self.config.base_url))
    }

    fn post(&self, req: &ChatCompletionRequest<'_>) -> Result<Response, TransportError> {
        let resp = self
            .client
            .post(self.url())
            .bearer_auth(&self.config.api_key)
            .json(req)
            .send()?;
        check_status(resp)
    }

    pub fn chat_stream(&self, messages: &[ChatMessage]) -> Result<Response, TransportError> {
        tracing::info!(
            target: "survival_narrator",
            "streaming from {} (model={}, messages={})",
            self.url(),
            self.config.model,
            messages.len()
        );
        self.post(&ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            stream: true,
            max_tokens: None,
            response_format: None,
        })
    }

    /// One-shot call in JSON mode; the reply is parsed leniently.
    pub fn chat_json(&self, messages: &[ChatMessage]) -> Result<Value, TransportError> {
        let resp = self.post(&ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            stream: false,
            max_tokens: None,
            response_format: Some(serde_json::json!({"type": "json_object"})),
        })?;

        let completion: ChatCompletionResponse = resp
            .json()
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::InvalidResponse("empty choices list".into()))?;

        let content = choice.message.content.unwrap_or_default();
        if content.trim().is_empty() {
            let reason = choice.finish_reason.unwrap_or_else(|| "unknown".into());
            return Err(TransportError::InvalidResponse(format!(
                "empty content (finish_reason: {})",
                reason
            )));
        }

        parse_lenient_json(&content).map_err(|e| {
            TransportError::InvalidResponse(format!("{}; content: {:.500}", e, content))
        })
    }

    /// Send a tiny "Hello" request to verify key, URL and model.
    pub fn test_connection(&self) -> Result<String, TransportError> {
        let messages = [ChatMessage::user("Hello")];
        let resp = self.post(&ChatCompletionRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: self.config.temperature,
            stream: false,
            max_tokens: Some(5),
            response_format: None,
        })?;

        let completion: ChatCompletionResponse = resp
            .json()
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        let reply = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_else(|| "<no content>".into());

        Ok(format!("Connected to {} (model replied: \"{}\")", self.config.model, reply.trim()))
    }
}

/// Where narrative streams come from.
pub enum NarrativeSource {
    Backend(Session),
    Custom {
        narrator: CustomEndpoint,
        judge: CustomEndpoint,
        ending: CustomEndpoint,
    },
}

impl NarrativeSource {
    pub fn from_settings(settings: &Settings) -> Result<Self, TransportError> {
        let timeout = settings.request_timeout();
        if settings.is_custom_mode() {
            let endpoint = |role: ModelRole| {
                let config = settings.model_config(role);
                tracing::debug!(target: "survival_narrator", "{} model: {}", role.name(), config.model);
                CustomEndpoint::new(config, timeout)
            };
            tracing::info!(target: "survival_narrator", "custom mode: calling the model endpoint directly");
            Ok(NarrativeSource::Custom {
                narrator: endpoint(ModelRole::Narrator)?,
                judge: endpoint(ModelRole::Judge)?,
                ending: endpoint(ModelRole::Ending)?,
            })
        } else {
            let mut session = Session::new(&settings.backend_url, timeout)?;
            if !settings.auth_token.trim().is_empty() {
                session = session.with_token(settings.auth_token.trim());
            }
            Ok(NarrativeSource::Backend(session))
        }
    }

    pub fn dialect(&self) -> WireDialect {
        match self {
            NarrativeSource::Backend(_) => WireDialect::Backend,
            NarrativeSource::Custom { .. } => WireDialect::OpenAiCompatible,
        }
    }

    pub fn narrate(&mut self, req: &NarrateRequest) -> Result<Response, TransportError> {
        match self {
            NarrativeSource::Backend(session) => session.post_stream(NARRATE_PATH, req),
            NarrativeSource::Custom { narrator, .. } => {
                narrator.chat_stream(&PromptBuilder::narrator_messages(req))
            }
        }
    }

    pub fn judge(&mut self, req: &JudgeRequest) -> Result<Response, TransportError> {
        match self {
            NarrativeSource::Backend(session) => session.post_stream(JUDGE_PATH, req),
            NarrativeSource::Custom { judge, .. } => {
                let luck = rand::thread_rng().gen_range(0..=100u8);
                judge.chat_stream(&PromptBuilder::judge_messages(req, luck))
            }
        }
    }

    pub fn ending(&mut self, req: &EndingRequest) -> Result<EndingVerdict, TransportError> {
        let value = match self {
            NarrativeSource::Backend(session) => session.post_json(ENDING_PATH, req)?,
            NarrativeSource::Custom { ending, .. } => {
                ending.chat_json(&PromptBuilder::ending_messages(req))?
            }
        };
        Ok(EndingVerdict::from_value(&value))
    }
}

fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Map a non-success response onto the failure the caller can act on.
fn check_status(resp: Response) -> Result<Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let code = status.as_u16();
    match status {
        StatusCode::UNAUTHORIZED => Err(TransportError::SessionExpired),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            Err(TransportError::AtCapacity(code))
        }
        _ => {
            let body = resp.text().unwrap_or_default();
            Err(TransportError::Status {
                status: code,
                message: error_message(&body)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string()),
            })
        }
    }
}

/// Pull a human-readable message out of an error body, if it has one.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("detail"))
        .or_else(|| value.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
