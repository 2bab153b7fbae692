//! Chat-log analysis: prompt construction, reply cleanup and parsing.
//!
//! The model is asked for a JSON object; whatever comes back is stripped of a markdown
//! fence and parsed into a [`CharacterReport`]. Replies that do not parse are kept as
//! [`Analysis::Unparsed`] so a bad reply never fails the request.

use chatlens_core::client::CompletionBackend;
use chatlens_core::errors::CompletionResult;
use chatlens_core::types::{ChatHistory, ChatMessage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const FENCE: &str = "```";

/// Analysis prompt; `{content}` is replaced with the chat log verbatim.
const ANALYSIS_PROMPT_TEMPLATE: &str = r#"다음은 단체 채팅방의 대화 기록입니다. 대화에 참여한 사람들의 성격과 말투를 분석해 주세요.

반드시 아래 형식의 JSON 객체 하나만 출력하세요. 설명이나 다른 텍스트는 붙이지 마세요.

{
  "character_analysis": ["참여자별 성격 분석 (한 항목에 한 명씩, '이름: 분석' 형식)"],
  "awards": ["재미있는 상 이름과 수상자 (예: '새벽 수다왕: 이름 - 이유')"],
  "if_category": ["'만약 이 단톡방이 ○○라면' 형식의 역할 배정 (예: '회사라면 사장은 이름')"]
}

각 배열은 문자열만 담아야 합니다. 대화 기록은 아래 세 개의 큰따옴표 사이에 있습니다.

"""
{content}
""""#;

/// Structured reply the model is asked to produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterReport {
    pub character_analysis: Vec<String>,
    pub awards: Vec<String>,
    pub if_category: Vec<String>,
}

/// Result of analyzing one upload, tagged with `kind` so clients never have to
/// guess the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Analysis {
    /// The reply parsed cleanly
    Report(CharacterReport),
    /// The reply was not the expected JSON; `raw` is the reply as received
    Unparsed { error: String, raw: String },
    /// One entry per analyzed `.txt` file, in archive order
    Archive { files: Vec<FileAnalysis> },
}

/// Analysis of a single archive entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub file: String,
    pub content: String,
    pub analysis: Analysis,
}

/// Outcome of the single-file prompt/parse flow
#[derive(Debug, Clone)]
pub struct TextAnalysis {
    pub analysis: Analysis,
    /// The prompt as sent, then the reply
    pub history: ChatHistory,
}

pub fn build_prompt(content: &str) -> String {
    ANALYSIS_PROMPT_TEMPLATE.replace("{content}", content)
}

/// Removes every surrounding markdown code fence (tagged or not), outermost first.
///
/// Text that carries no fence is returned untouched.
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text;
    while let Some(inner) = strip_one_fence(body) {
        body = inner;
    }
    body
}

fn strip_one_fence(text: &str) -> Option<&str> {
    let mut body = text.trim();
    let mut fenced = false;

    if let Some(after) = body.strip_prefix(FENCE) {
        fenced = true;
        body = match after.split_once('\n') {
            Some((tag, rest)) if is_fence_tag(tag) => rest,
            _ => after,
        };
    }
    if let Some(before) = body.strip_suffix(FENCE) {
        fenced = true;
        body = before;
    }

    fenced.then(|| body.trim())
}

fn is_fence_tag(tag: &str) -> bool {
    tag.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parses a model reply, downgrading anything unexpected to [`Analysis::Unparsed`]
pub fn parse_analysis(reply: &str) -> Analysis {
    match serde_json::from_str::<CharacterReport>(strip_code_fence(reply)) {
        Ok(report) => Analysis::Report(report),
        Err(e) => {
            warn!(error = %e, reply_len = reply.len(), "Model reply is not a valid report");
            Analysis::Unparsed {
                error: format!("Failed to parse analysis: {}", e),
                raw: reply.to_string(),
            }
        }
    }
}

/// Runs one completion over `content` and parses the reply
pub async fn analyze_text(
    backend: &dyn CompletionBackend,
    content: &str,
    max_tokens: u32,
) -> CompletionResult<TextAnalysis> {
    let prompt = ChatMessage::user(build_prompt(content));
    debug!(
        content_len = content.len(),
        model = backend.model_name(),
        "Requesting analysis"
    );

    let reply = backend
        .complete(std::slice::from_ref(&prompt), max_tokens)
        .await?
        .unwrap_or_default();

    Ok(TextAnalysis {
        analysis: parse_analysis(&reply),
        history: vec![prompt, ChatMessage::assistant(reply)],
    })
}
