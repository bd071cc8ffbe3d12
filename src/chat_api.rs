use crate::thinking::{ParseResult, THINKING_CLOSE, THINKING_OPEN};
use crate::turn::{FinishedTurn, TextDelta, Turn};
use anyhow::{anyhow, Context, Result};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const SYSTEM_INSTRUCTION_STANDARD: &str = "You are Qalam, a precise bilingual assistant. \
Answer in the language the user writes in (Arabic or English). Be clear and concise.";

const SYSTEM_INSTRUCTION_REASONING: &str = "You are Qalam, a precise bilingual assistant. \
Answer in the language the user writes in (Arabic or English). Before answering, reason step \
by step inside <thinking></thinking> tags at the very start of your reply, then write the \
final answer after the closing tag. Never put the final answer inside the tags.";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Lite,
    Pro,
}

impl ModelType {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Lite => "Qalam Lite",
            Self::Pro => "Qalam Pro",
        }
    }

    pub fn default_model_id(self) -> &'static str {
        match self {
            Self::Lite => "qwen2.5:7b",
            Self::Pro => "qwen2.5:14b",
        }
    }

    pub fn system_instruction(self) -> &'static str {
        match self {
            Self::Lite => SYSTEM_INSTRUCTION_STANDARD,
            Self::Pro => SYSTEM_INSTRUCTION_REASONING,
        }
    }

    /// Whether replies are expected to carry a `<thinking>` trace.
    pub fn emits_thinking(self) -> bool {
        matches!(self, Self::Pro)
    }
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub host: String,
    pub model: String,
    pub system: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub reasoning_effort: Option<String>,
    pub num_ctx: Option<u32>,
    pub stop: Vec<String>,
    pub keep_alive: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::for_model(ModelType::Lite)
    }
}

impl ChatConfig {
    pub fn for_model(model: ModelType) -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: model.default_model_id().to_string(),
            system: model.system_instruction().to_string(),
            temperature: 0.2,
            max_tokens: if model.emits_thinking() { 4096 } else { 1024 },
            timeout_seconds: 600,
            reasoning_effort: None,
            num_ctx: None,
            stop: Vec::new(),
            keep_alive: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AssistantDelta {
    pub content: String,
    pub thinking: String,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Message {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            images: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    config: ChatConfig,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, config })
    }

    pub async fn oneshot_with_messages(&self, messages: Vec<Message>) -> Result<String> {
        let req = OpenAIChatCompletionsRequest {
            model: self.config.model.clone(),
            messages: messages.into_iter().map(OpenAIMessage::from).collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let resp = self
            .client
            .post(self.url("/v1/chat/completions"))
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, "Bearer ollama")
            .json(&req)
            .send()
            .await
            .context("HTTP request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP error {status}: {body}"));
        }

        let out: OpenAIChatCompletionsResponse = resp
            .json()
            .await
            .context("Unreadable JSON response (unexpected format)")?;

        Ok(extract_openai_text(&out))
    }

    pub async fn stream_with_messages<F>(
        &self,
        messages: Vec<Message>,
        mut on_chunk: F,
    ) -> Result<()>
    where
        F: FnMut(&str) + Send,
    {
        self.stream_with_messages_detailed(messages, move |delta| {
            if !delta.content.is_empty() {
                on_chunk(&delta.content);
            }
        })
        .await
    }

    /// Streams one model turn, re-classifying the whole response after every chunk.
    ///
    /// `on_update` sees the fresh classification and what changed since the previous
    /// one. Reasoning the backend reports in its own `thinking` field is wrapped in
    /// markers and folded into the same buffer as inline `<thinking>` text.
    pub async fn stream_turn<F>(
        &self,
        messages: Vec<Message>,
        mut on_update: F,
    ) -> Result<FinishedTurn>
    where
        F: FnMut(&ParseResult, &TextDelta) + Send,
    {
        let mut turn = Turn::new();
        let mut native_open = false;

        self.stream_with_messages_detailed(messages, |delta| {
            let text = fold_native_thinking(&delta, &mut native_open);
            let change = turn.push_delta(&text);
            on_update(turn.result(), &change);
        })
        .await?;

        if native_open {
            let change = turn.push_delta(THINKING_CLOSE);
            on_update(turn.result(), &change);
        }

        let finished = turn.finish();
        if !finished.is_complete() {
            warn!(chunks = finished.chunks, "stream ended inside an unclosed thinking trace");
        }
        Ok(finished)
    }

    pub async fn stream_with_messages_detailed<F>(
        &self,
        messages: Vec<Message>,
        mut on_delta: F,
    ) -> Result<()>
    where
        F: FnMut(AssistantDelta) + Send,
    {
        let req = OllamaChatRequest {
            model: self.config.model.clone(),
            messages,
            stream: true,
            think: self.config.reasoning_effort.clone(),
            keep_alive: self.config.keep_alive.clone(),
            options: OllamaChatOptions {
                num_predict: self.config.max_tokens,
                temperature: self.config.temperature,
                num_ctx: self.config.num_ctx,
                stop: self.config.stop.clone(),
            },
        };

        debug!(model = %req.model, messages = req.messages.len(), "opening chat stream");

        let resp = self
            .client
            .post(self.url("/api/chat"))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/x-ndjson")
            .json(&req)
            .send()
            .await
            .context("HTTP request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP error {status}: {body}"));
        }

        let mut http_stream = resp.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(item) = http_stream.next().await {
            let chunk = item.context("Failed to read HTTP stream")?;
            buffer.extend_from_slice(&chunk);

            for line in drain_ndjson_lines(&mut buffer) {
                let parsed = parse_ollama_chunk(&line)?;
                emit_delta(parsed.message, &mut on_delta);

                if parsed.done {
                    return Ok(());
                }
            }
        }

        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer);
            let line = line.trim();

            if !line.is_empty() {
                let parsed = parse_ollama_chunk(line)?;
                emit_delta(parsed.message, &mut on_delta);
            }
        }

        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.host.trim_end_matches('/'), path)
    }
}

fn emit_delta<F>(message: Option<OllamaMessage>, on_delta: &mut F)
where
    F: FnMut(AssistantDelta),
{
    if let Some(msg) = message {
        if !msg.content.is_empty() || !msg.thinking.is_empty() {
            on_delta(AssistantDelta {
                content: msg.content,
                thinking: msg.thinking,
            });
        }
    }
}

fn fold_native_thinking(delta: &AssistantDelta, native_open: &mut bool) -> String {
    let mut text = String::with_capacity(delta.thinking.len() + delta.content.len());
    if !delta.thinking.is_empty() {
        if !*native_open {
            text.push_str(THINKING_OPEN);
            *native_open = true;
        }
        text.push_str(&delta.thinking);
    }
    if !delta.content.is_empty() {
        if *native_open {
            text.push_str(THINKING_CLOSE);
            *native_open = false;
        }
        text.push_str(&delta.content);
    }
    text
}

#[derive(Serialize, Debug)]
struct OpenAIChatCompletionsRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// The OpenAI-compatible endpoint ignores Ollama's `images` field; images
/// travel as `image_url` content parts instead.
#[derive(Serialize, Debug)]
struct OpenAIMessage {
    role: String,
    content: OpenAIContent,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIContentPart>),
}

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAIContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAIImageUrl },
}

#[derive(Serialize, Debug)]
struct OpenAIImageUrl {
    url: String,
}

impl From<Message> for OpenAIMessage {
    fn from(message: Message) -> Self {
        let content = if message.images.is_empty() {
            OpenAIContent::Text(message.content)
        } else {
            let mut parts = Vec::with_capacity(message.images.len() + 1);
            parts.push(OpenAIContentPart::Text {
                text: message.content,
            });
            parts.extend(message.images.into_iter().map(|data| {
                OpenAIContentPart::ImageUrl {
                    image_url: OpenAIImageUrl {
                        url: format!("data:{};base64,{data}", sniff_image_mime(&data)),
                    },
                }
            }));
            OpenAIContent::Parts(parts)
        };

        Self {
            role: message.role,
            content,
        }
    }
}

/// Guesses the MIME type from the base64 of the file's magic bytes.
fn sniff_image_mime(data: &str) -> &'static str {
    const SIGNATURES: &[(&str, &str)] = &[
        ("iVBORw0KGgo", "image/png"),
        ("/9j/", "image/jpeg"),
        ("R0lGOD", "image/gif"),
        ("UklGR", "image/webp"),
        ("Qk", "image/bmp"),
    ];
    SIGNATURES
        .iter()
        .find(|(prefix, _)| data.starts_with(prefix))
        .map(|(_, mime)| *mime)
        .unwrap_or("image/png")
}

#[derive(Deserialize, Debug)]
struct OpenAIChatCompletionsResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize, Debug)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Serialize, Debug)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
    options: OllamaChatOptions,
}

#[derive(Serialize, Debug)]
struct OllamaChatOptions {
    num_predict: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct OllamaChatChunk {
    pub message: Option<OllamaMessage>,
    #[serde(default)]
    pub done: bool,
}

#[derive(Deserialize, Debug, Default)]
pub struct OllamaMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub thinking: String,
}

fn extract_openai_text(response: &OpenAIChatCompletionsResponse) -> String {
    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .unwrap_or_default()
}

pub fn drain_ndjson_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();

    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let bytes: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&bytes);
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }

    lines
}

pub fn parse_ollama_chunk(line: &str) -> Result<OllamaChatChunk> {
    serde_json::from_str(line).with_context(|| format!("Failed to parse NDJSON line: {line}"))
}
