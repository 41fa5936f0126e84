//! LLM-backed document extractor

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::llm::{ChatModel, Message};

use super::extraction::{DocumentExtractor, SourceDocument, extract_json_from_response};

/// Default cap on document text sent to the model, in characters
pub const DEFAULT_MAX_TEXT_CHARS: usize = 32_000;

/// Percentage of the character budget kept from the start of a long document
const HEAD_PERCENT: usize = 70;

/// System prompt for policy entity extraction
const POLICY_EXTRACTION_SYSTEM_PROMPT: &str = r#"你是一个专业的政策文件分析助手，擅长从政策法规文本中抽取实体和关系。

实体类型（type 字段取以下值之一）：
- authority：发文机关、主管部门、执行机构
- region：适用的地区或行政区划
- concept：政策工具、资金类型、专业术语（如“专项债”）
- project：具体项目或工程
- policy：被引用、修订或废止的其他政策文件

关系使用简短的中文动词或短语（如“发布”“适用于”“引用”“废止”“修订”“影响”）。
relations 中的 source 和 target 必须与 entities 中的 text 完全一致，或等于文档标题。

只返回 JSON，不要附加任何解释：
{"entities": [{"text": "...", "type": "...", "description": "..."}],
 "relations": [{"source": "...", "target": "...", "type": "..."}]}"#;

/// Extracts entities and relations from document text with a chat model
#[derive(Clone)]
pub struct LlmDocumentExtractor {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
    max_text_chars: usize,
}

impl LlmDocumentExtractor {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            system_prompt: POLICY_EXTRACTION_SYSTEM_PROMPT.to_string(),
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Character cap for document text; 0 sends the full text
    pub fn with_max_text_chars(mut self, max_text_chars: usize) -> Self {
        self.max_text_chars = max_text_chars;
        self
    }

    fn build_user_prompt(&self, document: &SourceDocument) -> String {
        let text = truncate_for_prompt(&document.text, self.max_text_chars);
        format!(
            "**文档标题**: {title}\n\n**文档内容**:\n{text}\n\n---\n\n请按照要求提取实体和关系，直接返回JSON格式结果。",
            title = document.title,
            text = text,
        )
    }
}

#[async_trait]
impl DocumentExtractor for LlmDocumentExtractor {
    async fn extract(&self, document: &SourceDocument) -> Result<Value> {
        info!(document_id = %document.document_id, title = %document.title, "Extracting entities from document");

        let messages = vec![
            Message::system(&self.system_prompt),
            Message::user(self.build_user_prompt(document)),
        ];
        let response = self.model.complete(messages).await?;

        let json = extract_json_from_response(&response.content);
        let value: Value = serde_json::from_str(json).map_err(|e| {
            debug!(response = %response.content, "Unparseable extraction response");
            Error::ExtractionFailed(format!(
                "model returned invalid JSON for '{}': {}",
                document.title, e
            ))
        })?;
        Ok(value)
    }
}

/// Shorten long text to `max_chars` by cutting out the middle
///
/// The first 70% of the budget comes from the head of the text and the rest
/// from the tail. `max_chars == 0` disables truncation.
pub fn truncate_for_prompt(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if max_chars == 0 || total <= max_chars {
        return text.to_string();
    }

    let head_chars = max_chars * HEAD_PERCENT / 100;
    let tail_chars = max_chars - head_chars;
    let omitted = total - head_chars - tail_chars;

    let head: String = text.chars().take(head_chars).collect();
    let tail: String = text.chars().skip(total - tail_chars).collect();
    format!("{head}\n\n...【已省略{omitted}字符】...\n\n{tail}")
}
