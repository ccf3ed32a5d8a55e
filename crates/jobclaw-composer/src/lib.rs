//! # JobClaw Composer
//! Email drafting via any OpenAI-compatible chat-completion API.
//!
//! A composer failure is fatal for the send attempt — the engine never
//! falls back to a canned template, because a generic message to a named
//! contact does more harm than no message.

use async_trait::async_trait;
use serde_json::{Value, json};

use jobclaw_core::config::ComposerConfig;
use jobclaw_core::error::{JobClawError, Result};
use jobclaw_core::traits::Composer;
use jobclaw_core::types::{ComposeRequest, EmailDraft};

/// LLM-backed composer speaking the OpenAI chat-completions format.
pub struct LlmComposer {
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    client: reqwest::Client,
}

impl LlmComposer {
    /// Create from config. API key resolution: config value, then the
    /// OPENAI_API_KEY environment variable.
    pub fn new(config: &ComposerConfig) -> Self {
        let api_key = if config.api_key.is_empty() {
            std::env::var("OPENAI_API_KEY").unwrap_or_default()
        } else {
            config.api_key.clone()
        };
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            client: reqwest::Client::new(),
        }
    }

    fn build_prompt(request: &ComposeRequest) -> String {
        let mut prompt = String::new();
        if request.is_followup {
            prompt.push_str(&format!(
                "Write follow-up email #{} to {}",
                request.followup_number, request.contact_name
            ));
        } else {
            prompt.push_str(&format!(
                "Write a first outreach email to {}",
                request.contact_name
            ));
        }
        if let Some(role) = &request.role {
            prompt.push_str(&format!(", who works as {role}"));
        }
        if let Some(company) = &request.company {
            prompt.push_str(&format!(" at {company}"));
        }
        prompt.push_str(&format!(
            ". The sender is {} and is reaching out about job opportunities.",
            request.sender_name
        ));
        if request.attachment_url.is_some() {
            prompt.push_str(" Mention that a resume is attached.");
        }
        if request.is_followup {
            prompt.push_str(
                " Keep it short and polite; reference the earlier message without repeating it.",
            );
        }
        prompt.push_str(
            "\n\nRespond with the subject on the first line prefixed 'Subject: ', \
             then a blank line, then the plain-text body. No other commentary.",
        );
        prompt
    }

    /// Split a "Subject: ...\n\n<body>" completion into a draft.
    fn parse_draft(content: &str) -> Result<EmailDraft> {
        let content = content.trim();
        let (first_line, rest) = content
            .split_once('\n')
            .ok_or_else(|| JobClawError::Composer("Draft missing body".into()))?;
        let subject = first_line
            .trim()
            .strip_prefix("Subject:")
            .ok_or_else(|| JobClawError::Composer("Draft missing subject line".into()))?
            .trim()
            .to_string();
        let body = rest.trim().to_string();
        if subject.is_empty() || body.is_empty() {
            return Err(JobClawError::Composer("Empty subject or body".into()));
        }
        Ok(EmailDraft { subject, body })
    }
}

#[async_trait]
impl Composer for LlmComposer {
    async fn generate(&self, request: &ComposeRequest) -> Result<EmailDraft> {
        if self.api_key.is_empty() {
            return Err(JobClawError::Composer(
                "No composer API key configured".into(),
            ));
        }

        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {
                    "role": "system",
                    "content": "You write concise, personal outreach emails for job seekers."
                },
                { "role": "user", "content": Self::build_prompt(request) }
            ],
        });

        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| JobClawError::Composer(format!("Connection failed ({url}): {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(JobClawError::Composer(format!(
                "API error {status}: {text}"
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| JobClawError::Composer(e.to_string()))?;
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| JobClawError::Composer("No choices in response".into()))?;

        let draft = Self::parse_draft(content)?;
        tracing::debug!(
            "✍️ Draft for contact {} ({} chars)",
            request.contact_id,
            draft.body.len()
        );
        Ok(draft)
    }
}
