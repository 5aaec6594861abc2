//! Rewrite-service boundary: trait + HTTP chat-completions provider + mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::StyleProfile;
use crate::error::RewriteServiceError;

/// Request sent to the rewrite service: raw text plus the style profile.
#[derive(Debug, Clone, Serialize)]
pub struct RewriteRequest {
    pub title: String,
    pub content: String,
    pub category: String,
    pub language: String,
    pub tone: Vec<String>,
    pub target_length_min: usize,
    pub target_length_max: usize,
}

impl RewriteRequest {
    pub fn new(
        title: &str,
        content: &str,
        category: &str,
        profile: &StyleProfile,
        target: (usize, usize),
    ) -> Self {
        Self {
            title: title.to_string(),
            content: content.to_string(),
            category: category.to_string(),
            language: profile.language.clone(),
            tone: profile.tone.clone(),
            target_length_min: target.0,
            target_length_max: target.1,
        }
    }
}

/// What the service returns before local style enforcement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewriteResponse {
    pub title: String,
    pub body: String,
    pub summary: String,
}

#[async_trait]
pub trait RewriteClient: Send + Sync {
    async fn rewrite(&self, req: &RewriteRequest) -> Result<RewriteResponse, RewriteServiceError>;
    fn name(&self) -> &'static str;
}

/// Chat-completions rewrite provider. Requires `REWRITE_API_KEY`.
pub struct HttpRewriteClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl HttpRewriteClient {
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("REWRITE_API_KEY").unwrap_or_default();
        let endpoint = std::env::var("REWRITE_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
        let http = reqwest::Client::builder()
            .user_agent("travel-content-pipeline/0.1 (+globaltravelreport.com)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: model_override.unwrap_or("gpt-4o-mini").to_string(),
            endpoint,
        }
    }

    fn system_prompt(req: &RewriteRequest) -> String {
        format!(
            "You are a travel news sub-editor. Rewrite the provided article in {} \
             with a {} tone for the {} section, {}-{} words. \
             Respond with JSON only: {{\"title\": ..., \"summary\": ..., \"body\": ...}}.",
            req.language,
            req.tone.join(", "),
            req.category,
            req.target_length_min,
            req.target_length_max,
        )
    }
}

#[async_trait]
impl RewriteClient for HttpRewriteClient {
    async fn rewrite(&self, req: &RewriteRequest) -> Result<RewriteResponse, RewriteServiceError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ChatReq<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct ChatResp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let sys = Self::system_prompt(req);
        let user = format!("Title: {}\n\n{}", req.title, req.content);
        let chat = ChatReq {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &sys,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.4,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&chat)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RewriteServiceError::Timeout
                } else {
                    RewriteServiceError::BadOutput(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(RewriteServiceError::Status(resp.status().as_u16()));
        }

        let body: ChatResp = resp
            .json()
            .await
            .map_err(|e| RewriteServiceError::BadOutput(e.to_string()))?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.trim())
            .unwrap_or("");

        // Tolerate a fenced JSON block.
        let json = content
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        let parsed: RewriteResponse = serde_json::from_str(json)
            .map_err(|e| RewriteServiceError::BadOutput(format!("unparseable response: {e}")))?;
        if parsed.title.trim().is_empty() || parsed.body.trim().is_empty() {
            return Err(RewriteServiceError::BadOutput("empty title or body".into()));
        }
        Ok(parsed)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Fixed-response client for tests and local runs.
#[derive(Clone)]
pub struct MockRewriteClient {
    pub fixed: RewriteResponse,
}

#[async_trait]
impl RewriteClient for MockRewriteClient {
    async fn rewrite(&self, _req: &RewriteRequest) -> Result<RewriteResponse, RewriteServiceError> {
        Ok(self.fixed.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
