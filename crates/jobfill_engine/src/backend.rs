use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::record::{FailureKind, RequestContext, RequestFailure, RequestKind};
use crate::types::{AnswerSet, ParsedResume};

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_bytes: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub parsed_resume: ParsedResume,
    pub jd_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GistRequest {
    pub resume: String,
    pub jd: String,
    pub labels: Vec<String>,
}

/// Body of one backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RequestPayload {
    ResumeScore(ScoreRequest),
    GetGist(GistRequest),
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestPayload::ResumeScore(_) => RequestKind::ResumeScore,
            RequestPayload::GetGist(_) => RequestKind::GetGist,
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            RequestPayload::ResumeScore(_) => "resume-score",
            RequestPayload::GetGist(_) => "get-gist",
        }
    }

    pub fn context(&self) -> RequestContext {
        match self {
            RequestPayload::ResumeScore(request) => RequestContext {
                jd_url: Some(request.jd_url.clone()),
                label_count: None,
            },
            RequestPayload::GetGist(request) => RequestContext {
                jd_url: None,
                label_count: Some(request.labels.len()),
            },
        }
    }

    fn body(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            RequestPayload::ResumeScore(request) => serde_json::to_vec(request),
            RequestPayload::GetGist(request) => serde_json::to_vec(request),
        }
    }
}

/// Resume/job match. Fields the service adds beyond these are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: f64,
    #[serde(default)]
    pub common_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GistAnswers {
    #[serde(default)]
    pub answers: AnswerSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestData {
    Score(ScoreResult),
    Answers(GistAnswers),
}

#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn call(&self, payload: &RequestPayload) -> Result<RequestData, RequestFailure>;
}

#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    settings: BackendSettings,
}

impl ReqwestBackend {
    pub fn new(settings: BackendSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn build_client(&self) -> Result<reqwest::Client, RequestFailure> {
        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .build()
            .map_err(|err| RequestFailure::new(FailureKind::Network, err.to_string()))
    }

    fn endpoint_url(&self, payload: &RequestPayload) -> Result<Url, RequestFailure> {
        let mut base = Url::parse(&self.settings.base_url)
            .map_err(|err| RequestFailure::new(FailureKind::InvalidUrl, err.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(payload.endpoint())
            .map_err(|err| RequestFailure::new(FailureKind::InvalidUrl, err.to_string()))
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Vec<u8>, RequestFailure> {
        let max_bytes = self.settings.max_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(too_large(max_bytes, Some(content_len)));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(too_large(max_bytes, Some(next_len)));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

#[async_trait::async_trait]
impl Backend for ReqwestBackend {
    async fn call(&self, payload: &RequestPayload) -> Result<RequestData, RequestFailure> {
        let url = self.endpoint_url(payload)?;
        let body = payload
            .body()
            .map_err(|err| RequestFailure::new(FailureKind::InvalidResponse, err.to_string()))?;
        let client = self.build_client()?;

        jobfill_logging::fill_debug!("POST {} ({} bytes)", url, body.len());
        let response = client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RequestFailure::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let bytes = self.read_body(response).await?;
        decode_response(payload.kind(), &bytes)
    }
}

pub fn decode_response(kind: RequestKind, bytes: &[u8]) -> Result<RequestData, RequestFailure> {
    let invalid = |err: serde_json::Error| {
        RequestFailure::new(FailureKind::InvalidResponse, format!("{kind} response: {err}"))
    };
    match kind {
        RequestKind::ResumeScore => serde_json::from_slice(bytes)
            .map(RequestData::Score)
            .map_err(invalid),
        RequestKind::GetGist => serde_json::from_slice(bytes)
            .map(RequestData::Answers)
            .map_err(invalid),
    }
}

fn too_large(max_bytes: u64, actual: Option<u64>) -> RequestFailure {
    RequestFailure::new(
        FailureKind::TooLarge { max_bytes, actual },
        "response too large",
    )
}

fn map_reqwest_error(err: reqwest::Error) -> RequestFailure {
    if err.is_timeout() {
        return RequestFailure::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return RequestFailure::new(FailureKind::InvalidResponse, err.to_string());
    }
    RequestFailure::new(FailureKind::Network, err.to_string())
}
