//! Answer composition.
//!
//! The orchestrator talks to a [`Composer`] trait object, so the
//! composition backend is swappable: the deterministic
//! [`TemplateComposer`] (default, always available) or the
//! [`RemoteComposer`] speaking an Ollama-style JSON API over HTTP.
//! Composition must always produce non-empty output — "no answer" is
//! never an acceptable terminal state for a well-formed question.

use serde::{Deserialize, Serialize};

use crate::category::LegalCategory;
use crate::entry::EntryId;
use crate::error::ComposeError;

/// A retrieved entry offered to the composer, in citation order.
#[derive(Debug, Clone)]
pub struct Citation {
    pub entry_id: EntryId,
    pub title: String,
    /// Leading excerpt of the entry content.
    pub snippet: String,
}

/// Everything the composer needs for one answer.
#[derive(Debug)]
pub struct ComposeRequest<'a> {
    pub question: &'a str,
    pub context: Option<&'a str>,
    /// The resolved category for the question.
    pub category: LegalCategory,
    /// Retrieved supporting knowledge, rank order.
    pub citations: &'a [Citation],
    /// Remaining time budget in milliseconds.
    pub budget_ms: u64,
}

/// An answer composition backend.
pub trait Composer: Send + Sync {
    /// Compose an answer. Implementations should respect `budget_ms`.
    fn compose(&self, request: &ComposeRequest<'_>) -> Result<String, ComposeError>;

    /// Short backend name for logs and records.
    fn name(&self) -> &'static str;
}

/// Truncate content to a display snippet on a char boundary.
pub fn snippet(content: &str, max_chars: usize) -> String {
    let mut out: String = content.chars().take(max_chars).collect();
    if content.chars().count() > max_chars {
        out.push('…');
    }
    out
}

// ---------------------------------------------------------------------------
// Template composer
// ---------------------------------------------------------------------------

/// Deterministic composer: renders the retrieved entries into a structured
/// answer, falling back to a generic category-level response when
/// retrieval returned nothing.
#[derive(Debug, Default)]
pub struct TemplateComposer;

impl Composer for TemplateComposer {
    fn compose(&self, request: &ComposeRequest<'_>) -> Result<String, ComposeError> {
        Ok(render_template(request))
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

/// Render the template answer. Shared with the orchestrator as the
/// fallback when another backend returns empty output.
pub fn render_template(request: &ComposeRequest<'_>) -> String {
    let category_name = request.category.name();
    let mut answer = String::new();

    if request.citations.is_empty() {
        answer.push_str(&format!(
            "您的问题涉及{category_name}领域（{}）。知识库中暂未检索到与该问题直接相关的条目，\
             以下为一般性说明：{category_name}问题通常需要结合具体事实与现行法律规定分析，\
             建议补充更多细节后重新咨询，或向执业律师寻求针对性意见。",
            request.category.description()
        ));
        return answer;
    }

    answer.push_str(&format!(
        "针对您在{category_name}领域的问题，检索到 {} 条相关法律知识：\n",
        request.citations.len()
    ));
    for (i, citation) in request.citations.iter().enumerate() {
        answer.push_str(&format!(
            "{}. 《{}》：{}\n",
            i + 1,
            citation.title,
            citation.snippet
        ));
    }
    if let Some(context) = request.context {
        if !context.trim().is_empty() {
            answer.push_str(&format!("结合您补充的背景（{}），", snippet(context, 60)));
        }
    }
    answer.push_str(&format!(
        "综合上述检索结果，建议以《{}》为主要参考依据。以上内容仅供参考，具体案件请咨询执业律师。",
        request.citations[0].title
    ));
    answer
}

// ---------------------------------------------------------------------------
// Remote composer
// ---------------------------------------------------------------------------

/// Configuration for the remote composer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteComposerConfig {
    /// Base URL of the composition service.
    pub base_url: String,
    /// Model name to request.
    pub model: String,
    /// Per-request timeout ceiling in seconds (the consultation budget
    /// can only shorten it).
    pub timeout_secs: u64,
}

impl Default for RemoteComposerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "qwen2.5:7b".into(),
            timeout_secs: 60,
        }
    }
}

/// Client for an Ollama-style `/api/generate` composition service.
pub struct RemoteComposer {
    config: RemoteComposerConfig,
}

impl RemoteComposer {
    pub fn new(config: RemoteComposerConfig) -> Self {
        Self { config }
    }

    fn build_prompt(request: &ComposeRequest<'_>) -> (String, String) {
        let system = format!(
            "你是一名专业的法律咨询助手。当前问题分类：{}。\
             请基于提供的法律知识条目回答用户问题，引用条目标题，\
             不得虚构法律条文。",
            request.category.name()
        );
        let mut prompt = String::new();
        for (i, citation) in request.citations.iter().enumerate() {
            prompt.push_str(&format!(
                "[知识{}] 《{}》：{}\n",
                i + 1,
                citation.title,
                citation.snippet
            ));
        }
        if let Some(context) = request.context {
            prompt.push_str(&format!("背景：{context}\n"));
        }
        prompt.push_str(&format!("问题：{}", request.question));
        (system, prompt)
    }
}

impl Composer for RemoteComposer {
    fn compose(&self, request: &ComposeRequest<'_>) -> Result<String, ComposeError> {
        let timeout_ms = (self.config.timeout_secs * 1000).min(request.budget_ms.max(1));
        let url = format!("{}/api/generate", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build();

        let (system, prompt) = Self::build_prompt(request);
        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "system": system,
            "stream": false,
        });
        let body_str = serde_json::to_string(&body).map_err(|e| ComposeError::RequestFailed {
            message: format!("JSON serialize error: {e}"),
        })?;

        let resp = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body_str)
            .map_err(|e: ureq::Error| match e {
                ureq::Error::Transport(t) => {
                    // ureq reports both connect failures and timeouts as
                    // transport errors; inspect the message for the latter.
                    let message = t.to_string();
                    if message.contains("timed out") || message.contains("timeout") {
                        ComposeError::Timeout { timeout_ms }
                    } else {
                        ComposeError::Unreachable {
                            url: self.config.base_url.clone(),
                        }
                    }
                }
                other => ComposeError::RequestFailed {
                    message: other.to_string(),
                },
            })?;

        let resp_str = resp.into_string().map_err(|e| ComposeError::ParseError {
            message: e.to_string(),
        })?;
        let json: serde_json::Value =
            serde_json::from_str(&resp_str).map_err(|e| ComposeError::ParseError {
                message: e.to_string(),
            })?;

        json["response"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ComposeError::ParseError {
                message: "missing 'response' field".into(),
            })
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

impl std::fmt::Debug for RemoteComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteComposer")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}
