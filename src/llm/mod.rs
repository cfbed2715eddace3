//! LLM reply generation and urgency classification
//!
//! Talks to an OpenAI-compatible chat completions endpoint with typed
//! request/response structs. Callers treat every failure here as "degrade
//! to templates and keywords", never as a webhook failure.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::db::{Business, Faq};
use crate::{Error, Result};

/// Replies longer than this get clamped before sending; three SMS segments
/// is plenty for an auto-reply
const MAX_REPLY_CHARS: usize = 450;

/// A generated reply plus its token usage for the analytics feed
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Chat-completions client
pub struct LlmClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl LlmClient {
    /// Build a client from config, or None when no API key is set
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .ok()?;

        Some(Self {
            client,
            api_key,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Generate an SMS reply grounded in the business profile
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response has no content
    pub async fn generate_reply(
        &self,
        business: &Business,
        faqs: &[Faq],
        inbound: &str,
    ) -> Result<GeneratedReply> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt(business, faqs),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: inbound.to_string(),
                },
            ],
            max_tokens: Some(self.max_tokens),
            temperature: Some(0.4),
        };

        let response = self.complete(&request).await?;
        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .map(|t| clamp_reply(t.trim()))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Llm("completion returned no content".to_string()))?;

        let usage = response.usage.unwrap_or_default();
        Ok(GeneratedReply {
            text,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }

    /// Classify whether a customer text needs immediate owner attention
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the answer is not yes/no;
    /// callers fall back to the keyword verdict
    pub async fn classify_urgency(&self, text: &str) -> Result<bool> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You triage inbound SMS for a small business. Answer with exactly \
                              one word, yes or no: does this message describe an urgent, \
                              time-critical problem that needs the owner's immediate attention?"
                        .to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            max_tokens: Some(3),
            temperature: Some(0.0),
        };

        let response = self.complete(&request).await?;
        let answer = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or_default();

        parse_yes_no(answer)
            .ok_or_else(|| Error::Llm(format!("unexpected classification answer: {answer:?}")))
    }

    async fn complete(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("api error: {status} - {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("failed to parse response: {e}")))
    }
}

/// System prompt for reply generation
fn system_prompt(business: &Business, faqs: &[Faq]) -> String {
    let mut prompt = format!(
        "You are the SMS auto-responder for {}, a small business. Reply to the \
         customer's text in a friendly, concise tone. Keep it under 300 characters \
         and never invent prices, availability, or commitments. If you cannot \
         answer from the information below, say the owner will follow up shortly.",
        business.name
    );

    if !faqs.is_empty() {
        prompt.push_str("\n\nKnown answers:");
        for faq in faqs {
            prompt.push_str(&format!("\nQ: {}\nA: {}", faq.question, faq.answer));
        }
    }

    if let Some(url) = &business.ordering_url {
        prompt.push_str(&format!("\n\nOnline ordering link: {url}"));
    }

    prompt
}

/// Clamp a reply to SMS-friendly length on a char boundary
fn clamp_reply(text: &str) -> String {
    if text.chars().count() <= MAX_REPLY_CHARS {
        return text.to_string();
    }
    let clamped: String = text.chars().take(MAX_REPLY_CHARS - 1).collect();
    format!("{}…", clamped.trim_end())
}

/// Parse a yes/no answer, tolerating punctuation and casing
fn parse_yes_no(answer: &str) -> Option<bool> {
    let token: String = answer
        .trim()
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_lowercase();

    match token.as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}
