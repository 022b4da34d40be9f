//! Text-generation and search providers over OpenAI-compatible `/chat/completions`,
//! plus a deterministic mock generator for offline use.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vernon_core::{
    EndpointConfig, LlmMode, Named, Origin, ProviderChain, ProvidersConfig, SearchOptions,
    SearchProvider, SearchResult, TextGenerator, Utterance, VernonError, VernonResult,
};

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    /// Search-grounded models (Perplexity sonar) list their sources here.
    #[serde(default)]
    citations: Vec<String>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Default)]
struct TokenUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// One OpenAI-compatible endpoint with its key resolved.
#[derive(Debug, Clone)]
struct ChatEndpoint {
    name: String,
    base_url: String,
    model: String,
    api_key: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl ChatEndpoint {
    fn new(endpoint: &EndpointConfig, api_key: String, timeout: Duration) -> VernonResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VernonError::Config(format!("HTTP client for {}: {}", endpoint.name, e)))?;
        Ok(Self {
            name: endpoint.name.clone(),
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            model: endpoint.model.clone(),
            api_key,
            temperature: endpoint.temperature,
            max_tokens: endpoint.max_tokens,
            client,
        })
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> VernonResult<(String, Vec<String>)> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        debug!(provider = %self.name, model = %self.model, "dispatching chat completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-Title", "Vernon")
            .json(&body)
            .send()
            .await
            .map_err(|e| VernonError::provider(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VernonError::provider(
                &self.name,
                format!("HTTP {}: {}", status, error_text),
            ));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| VernonError::provider(&self.name, e))?;
        if let Some(usage) = &chat.usage {
            debug!(
                provider = %self.name,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat completion usage"
            );
        }
        let text = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(VernonError::ShortResult {
                provider: self.name.clone(),
                len: 0,
            });
        }
        Ok((text, chat.citations))
    }
}

/// Persona prompt for conversational replies.
fn persona(assistant_name: &str) -> String {
    format!(
        "You are {}, a friendly local guide who helps people find restaurants, bars, live music, \
         comedy and events, and books tables or tickets. Keep answers short and conversational; \
         they may be read aloud.",
        assistant_name
    )
}

/// Text generation over an OpenAI-compatible chat endpoint (OpenRouter, OpenAI, Groq, ...).
#[derive(Debug, Clone)]
pub struct ChatCompletionsGenerator {
    endpoint: ChatEndpoint,
    system_prompt: String,
}

impl ChatCompletionsGenerator {
    /// `Ok(None)` when the endpoint's API key env var is unset.
    pub fn from_endpoint(
        endpoint: &EndpointConfig,
        assistant_name: &str,
        timeout: Duration,
    ) -> VernonResult<Option<Self>> {
        let Some(api_key) = endpoint.api_key() else {
            info!(provider = %endpoint.name, key = %endpoint.api_key_env, "no API key, generator skipped");
            return Ok(None);
        };
        Ok(Some(Self {
            endpoint: ChatEndpoint::new(endpoint, api_key, timeout)?,
            system_prompt: persona(assistant_name),
        }))
    }
}

impl Named for ChatCompletionsGenerator {
    fn name(&self) -> &str {
        &self.endpoint.name
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &str, prior: &[Utterance]) -> VernonResult<String> {
        let mut messages = Vec::with_capacity(prior.len() + 2);
        messages.push(ChatMessage::new("system", self.system_prompt.as_str()));
        for utterance in prior {
            let role = match utterance.origin {
                Origin::User => "user",
                Origin::Assistant => "assistant",
            };
            messages.push(ChatMessage::new(role, utterance.text.as_str()));
        }
        messages.push(ChatMessage::new("user", prompt));
        let (text, _) = self.endpoint.complete(messages).await?;
        Ok(text.trim().to_string())
    }
}

/// Search through a search-grounded chat model (Perplexity `sonar` and friends).
#[derive(Debug, Clone)]
pub struct ChatSearchProvider {
    endpoint: ChatEndpoint,
}

impl ChatSearchProvider {
    /// `Ok(None)` when the endpoint's API key env var is unset.
    pub fn from_endpoint(endpoint: &EndpointConfig, timeout: Duration) -> VernonResult<Option<Self>> {
        let Some(api_key) = endpoint.api_key() else {
            info!(provider = %endpoint.name, key = %endpoint.api_key_env, "no API key, search provider skipped");
            return Ok(None);
        };
        Ok(Some(Self {
            endpoint: ChatEndpoint::new(endpoint, api_key, timeout)?,
        }))
    }
}

impl Named for ChatSearchProvider {
    fn name(&self) -> &str {
        &self.endpoint.name
    }
}

/// System instructions for a search call, shaped by its options.
fn search_instructions(options: &SearchOptions) -> String {
    let mut prompt = String::from(
        "You search the web for current local venues and events. Name specific places with \
         addresses, dates and times where known.",
    );
    if let Some(city) = &options.city {
        prompt.push_str(&format!(" Only consider {}.", city));
    }
    if let Some(topic) = &options.topic {
        prompt.push_str(&format!(" Focus on {}.", topic));
    }
    if options.detailed {
        prompt.push_str(" The question has several criteria; address every one and compare a few options.");
    }
    prompt
}

#[async_trait]
impl SearchProvider for ChatSearchProvider {
    async fn search(&self, query: &str, options: &SearchOptions) -> VernonResult<SearchResult> {
        let messages = vec![
            ChatMessage::new("system", search_instructions(options)),
            ChatMessage::new("user", query),
        ];
        let (text, citations) = self.endpoint.complete(messages).await?;
        Ok(SearchResult {
            text: text.trim().to_string(),
            citations,
        })
    }
}

/// Deterministic offline generator.
#[derive(Debug, Clone, Default)]
pub struct MockGenerator;

impl Named for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str, prior: &[Utterance]) -> VernonResult<String> {
        let preview: String = prompt.chars().take(80).collect();
        let ellipsis = if prompt.chars().count() > 80 { "…" } else { "" };
        Ok(format!(
            "[Mock reply] You said \"{}{}\" ({} earlier messages in context). I'm running without a \
             live language model, but I can still show venues in a city or book you a table.",
            preview.trim(),
            ellipsis,
            prior.len()
        ))
    }
}

/// Generators in fallback order. Mock mode, or live mode with no usable keys, yields the
/// mock generator alone.
pub fn build_generators(
    config: &ProvidersConfig,
    assistant_name: &str,
    timeout: Duration,
) -> VernonResult<ProviderChain<dyn TextGenerator>> {
    let mut links: Vec<Arc<dyn TextGenerator>> = Vec::new();
    if config.llm_mode == LlmMode::Live {
        for endpoint in &config.generators {
            if let Some(generator) =
                ChatCompletionsGenerator::from_endpoint(endpoint, assistant_name, timeout)?
            {
                links.push(Arc::new(generator));
            }
        }
        if links.is_empty() {
            warn!("live mode without any generator API key, using the mock generator");
        }
    }
    if links.is_empty() {
        links.push(Arc::new(MockGenerator));
    }
    Ok(ProviderChain::new(links).with_timeout(timeout))
}

/// Search providers in fallback order; empty in mock mode or when no key is set.
pub fn build_search_providers(
    config: &ProvidersConfig,
    timeout: Duration,
) -> VernonResult<ProviderChain<dyn SearchProvider>> {
    let mut links: Vec<Arc<dyn SearchProvider>> = Vec::new();
    if config.llm_mode == LlmMode::Live {
        for endpoint in &config.search {
            if let Some(provider) = ChatSearchProvider::from_endpoint(endpoint, timeout)? {
                links.push(Arc::new(provider));
            }
        }
    }
    Ok(ProviderChain::new(links).with_timeout(timeout))
}
