//! LLM-backed collaborators
//!
//! An OpenAI-compatible chat completions client (Ollama speaks the same
//! protocol) and the stop decider, hop summarizer and report composer
//! built on it. Prompts are Vietnamese, matching the graph's data.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::reasoning::{HopSummarizer, ReportComposer, StopDecider, StopDecision};
use crate::store::Row;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_PROMPT: &str =
    "Bạn là trợ lý phân tích đồ thị tri thức về chính trị gia Việt Nam. \
     Chỉ dùng thông tin được cung cấp, không bịa đặt.";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

/// Chat completions client
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create LLM HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// One system + user exchange, returning the first choice's text
    pub async fn complete(&self, prompt: &str, max_tokens: Option<usize>) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: max_tokens.unwrap_or(self.config.max_tokens),
            temperature: self.config.temperature,
        };

        let mut builder = self.client.post(&self.config.endpoint).json(&request);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::LlmTimeout {
                    timeout_ms: self.config.timeout_secs * 1000,
                }
            } else {
                AppError::Llm {
                    message: format!("LLM API request failed: {}", e),
                }
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Llm {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| AppError::Llm {
            message: format!("Failed to parse LLM response: {}", e),
        })?;

        first_choice(chat_response)
    }
}

fn first_choice(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Llm {
            message: "Empty response from LLM".to_string(),
        })
}

/// Asks the model for `ĐỦ` or `CHƯA ĐỦ`
pub fn decision_prompt(question: &str, hop_count: usize, context: &str, max_hops: usize) -> String {
    format!(
        "Câu hỏi: \"{question}\"\n\n\
         Thông tin đã thu thập sau {hop_count} bước suy luận:\n{context}\n\n\
         Đã đủ thông tin để trả lời chính xác câu hỏi chưa?\n\
         - Đủ thông tin cụ thể để trả lời: trả lời \"ĐỦ\"\n\
         - Còn thiếu thông tin quan trọng: trả lời \"CHƯA ĐỦ\"\n\
         - Đã tới {max_hops} bước: trả lời với thông tin hiện có\n\n\
         CHỈ TRẢ LỜI MỘT TRONG HAI: \"ĐỦ\" hoặc \"CHƯA ĐỦ\""
    )
}

/// Summarize a hop's sample rows in one or two sentences
pub fn hop_summary_prompt(hop: usize, rows: &[Row]) -> String {
    let sample = rows
        .iter()
        .map(|r| serde_json::to_string(r).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Kết quả của bước suy luận {hop}:\n\n\
         Dữ liệu ({count} bản ghi đầu):\n{sample}\n\n\
         Tóm tắt ngắn gọn (1-2 câu) thông tin quan trọng: thực thể mới, \
         quan hệ đáng chú ý và thuộc tính nổi bật.\n\nTóm tắt:",
        count = rows.len(),
    )
}

/// Final report over all numbered steps
pub fn report_prompt(question: &str, steps: &[String], context: &str) -> String {
    format!(
        "Câu hỏi: \"{question}\"\n\n\
         Quy trình suy luận qua {total} bước:\n{steps}\n\n\
         Thông tin tổng hợp:\n{context}\n\n\
         Hãy tổng hợp toàn bộ thông tin đã tìm được, làm rõ quan hệ giữa các \
         thực thể và trình bày bằng tiếng Việt có cấu trúc.\n\nTóm tắt:",
        total = steps.len(),
        steps = steps.join("\n"),
    )
}

pub struct LlmStopDecider {
    client: Arc<LlmClient>,
}

impl LlmStopDecider {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StopDecider for LlmStopDecider {
    async fn decide(
        &self,
        question: &str,
        hop_count: usize,
        context: &str,
        max_hops: usize,
    ) -> Result<StopDecision> {
        let prompt = decision_prompt(question, hop_count, context, max_hops);
        let raw = self.client.complete(&prompt, Some(8)).await?;
        let decision = StopDecision::from_token(&raw);
        tracing::debug!(raw = %raw, decision = ?decision, "LLM stop decision");
        Ok(decision)
    }

    fn name(&self) -> &str {
        "llm"
    }
}

pub struct LlmHopSummarizer {
    client: Arc<LlmClient>,
}

impl LlmHopSummarizer {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HopSummarizer for LlmHopSummarizer {
    async fn summarize(&self, hop: usize, rows: &[Row]) -> Result<String> {
        self.client.complete(&hop_summary_prompt(hop, rows), Some(160)).await
    }

    fn name(&self) -> &str {
        "llm"
    }
}

pub struct LlmReportComposer {
    client: Arc<LlmClient>,
}

impl LlmReportComposer {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReportComposer for LlmReportComposer {
    async fn compose(&self, question: &str, steps: &[String], context: &str) -> Result<String> {
        self.client.complete(&report_prompt(question, steps, context), None).await
    }

    fn name(&self) -> &str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_prompt() {
        let prompt = decision_prompt("Ai kế nhiệm A?", 2, "[Bước 1] ...", 3);
        assert!(prompt.contains("\"Ai kế nhiệm A?\""));
        assert!(prompt.contains("sau 2 bước"));
        assert!(prompt.contains("tới 3 bước"));
        assert!(prompt.ends_with("\"ĐỦ\" hoặc \"CHƯA ĐỦ\""));
    }

    #[test]
    fn test_hop_summary_prompt_lists_rows() {
        let rows: Vec<Row> = vec![json!({"name": "A", "birth_place": "Huế"})
            .as_object()
            .cloned()
            .unwrap()];
        let prompt = hop_summary_prompt(1, &rows);
        assert!(prompt.contains("bước suy luận 1"));
        assert!(prompt.contains("\"birth_place\":\"Huế\""));
    }

    #[test]
    fn test_report_prompt() {
        let steps = vec!["Bước 1: Một".to_string(), "Bước 2: Hai".to_string()];
        let prompt = report_prompt("Q?", &steps, "ctx");
        assert!(prompt.contains("qua 2 bước"));
        assert!(prompt.contains("Bước 1: Một\nBước 2: Hai"));
    }

    #[test]
    fn test_first_choice() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "  ĐỦ \n"}}]
        }))
        .unwrap();
        assert_eq!(first_choice(response).unwrap(), "ĐỦ");

        let empty: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(first_choice(empty), Err(AppError::Llm { .. })));
    }

    #[test]
    fn test_client_from_default_config() {
        let client = LlmClient::new(LlmConfig::default()).unwrap();
        assert_eq!(client.config.model, "qwen2.5:0.5b");
    }
}
