//! Entity mention extraction from user queries

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::error::Result;
use crate::llm::{ChatModel, Message};

/// Default cap on mentions taken from one query
pub const DEFAULT_MAX_MENTIONS: usize = 10;

/// Contiguous runs of 2 to 6 CJK ideographs
static CJK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\u{4e00}-\u{9fa5}]{2,6}").expect("cjk run regex"));

const STOPWORDS: &[&str] = &[
    "的", "有", "是", "对", "和", "与", "在", "了", "吗", "呢", "什么", "如何", "怎么", "为什么",
    "哪些", "可以", "需要", "应该", "能否", "关于", "这个", "那个", "这些", "那些", "我们", "你们",
    "他们", "我的", "你的", "他的",
];

const MENTION_PROMPT: &str = "从下面的问题中提取政策相关的实体（机构、地区、政策工具、项目、文件名称等），\
只返回实体列表，用逗号分隔，不要解释。如果没有实体，返回空。";

/// Produces candidate entity mentions for a query
#[async_trait]
pub trait MentionExtractor: Send + Sync {
    async fn extract_mentions(&self, query: &str) -> Result<Vec<String>>;
}

/// Mention extraction through a chat model returning a comma-separated list
#[derive(Clone)]
pub struct LlmMentionExtractor {
    model: Arc<dyn ChatModel>,
}

impl LlmMentionExtractor {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl MentionExtractor for LlmMentionExtractor {
    async fn extract_mentions(&self, query: &str) -> Result<Vec<String>> {
        let messages = vec![
            Message::system(MENTION_PROMPT),
            Message::user(format!("问题：{query}")),
        ];
        let response = self.model.complete(messages).await?;
        let mentions = split_mention_list(&response.content);
        debug!(count = mentions.len(), "Model returned mentions");
        Ok(mentions)
    }
}

/// Replies a model gives when it found no entities
const EMPTY_REPLIES: &[&str] = &["空", "无", "没有", "无实体", "none", "null", "n/a"];

/// Split a model reply on ASCII or CJK commas, enumeration marks and newlines
///
/// "No entities" replies, punctuation-only tokens and single characters are
/// dropped, so a model that found nothing yields an empty list.
pub fn split_mention_list(reply: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    reply
        .split([',', '，', '、', '\n'])
        .map(|m| m.trim_matches(|c: char| c.is_whitespace() || is_punctuation(c)))
        .filter(|m| m.chars().count() > 1 && m.chars().any(char::is_alphanumeric))
        .filter(|m| !EMPTY_REPLIES.contains(&m.to_lowercase().as_str()))
        .filter(|m| seen.insert(m.to_string()))
        .map(str::to_string)
        .collect()
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() || "。；：！？“”‘’「」《》（）…".contains(c)
}

/// Heuristic mentions: CJK runs of 2 to 6 characters that are not stopwords
///
/// Runs longer than six characters are chunked left to right by the pattern.
/// Results keep first-seen order without duplicates, capped at `cap`.
pub fn fallback_mentions(query: &str, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    CJK_RUN
        .find_iter(query)
        .map(|m| m.as_str())
        .filter(|m| !STOPWORDS.contains(m))
        .filter(|m| seen.insert(*m))
        .take(cap)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_extracts_cjk_runs() {
        let mentions = fallback_mentions("财政部 专项债 有什么要求？", 10);
        assert_eq!(mentions, vec!["财政部", "专项债", "有什么要求"]);
    }

    #[test]
    fn test_fallback_drops_stopwords_and_duplicates() {
        let mentions = fallback_mentions("什么，财政部，什么，财政部", 10);
        assert_eq!(mentions, vec!["财政部"]);
    }

    #[test]
    fn test_fallback_chunks_long_runs_and_caps() {
        let mentions = fallback_mentions("中华人民共和国财政部", 10);
        assert_eq!(mentions, vec!["中华人民共和", "国财政部"]);

        let many = "甲乙 丙丁 戊己 庚辛";
        assert_eq!(fallback_mentions(many, 2).len(), 2);
    }

    #[test]
    fn test_fallback_ignores_latin() {
        assert!(fallback_mentions("What about bonds?", 10).is_empty());
    }

    #[test]
    fn test_split_mention_list() {
        assert_eq!(
            split_mention_list("财政部，专项债、 交通运输部,\n财政部\n"),
            vec!["财政部", "专项债", "交通运输部"]
        );
        assert!(split_mention_list("  ").is_empty());
    }

    #[test]
    fn test_split_mention_list_drops_empty_replies() {
        assert!(split_mention_list("空").is_empty());
        assert!(split_mention_list("无。").is_empty());
        assert!(split_mention_list("None").is_empty());
        assert!(split_mention_list("……，省").is_empty());
        assert_eq!(split_mention_list("“专项债”。"), vec!["专项债"]);
    }
}
