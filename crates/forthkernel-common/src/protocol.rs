//! Notebook protocol message contents (kernel side of the request/reply and
//! iopub streams). Only the `content` part of each message is modelled; the
//! host owns headers, sessions and transport.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// A mime bundle (`{"text/plain": "..."}`).
pub type MimeBundle = BTreeMap<String, serde_json::Value>;

pub const MIME_TEXT_PLAIN: &str = "text/plain";

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub code: String,
    /// Cursor offset in Unicode scalar values.
    pub cursor_pos: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectRequest {
    pub code: String,
    pub cursor_pos: usize,
    #[serde(default)]
    pub detail_level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsCompleteRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommInfoRequest {
    #[serde(default)]
    pub target_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputReply {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommOpen {
    pub comm_id: String,
    pub target_name: String,
    #[serde(default)]
    pub data: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommMsg {
    pub comm_id: String,
    #[serde(default)]
    pub data: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommClose {
    pub comm_id: String,
    #[serde(default)]
    pub data: JsonMap,
}

// ============================================================================
// Replies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodemirrorMode {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub codemirror_mode: CodemirrorMode,
    pub file_extension: String,
    pub mimetype: String,
    pub name: String,
    pub nbconvert_exporter: String,
    pub pygments_lexer: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpLink {
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelInfoReply {
    pub implementation: String,
    pub implementation_version: String,
    pub language_info: LanguageInfo,
    pub protocol_version: String,
    pub status: ReplyStatus,
    pub banner: String,
    pub help_links: Vec<HelpLink>,
}

/// Reply to an execute request. Serialized with a `status` tag so the JSON
/// shape matches the protocol (`{"status": "ok", ...}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecuteReply {
    Ok {
        execution_count: u32,
        #[serde(default)]
        user_expressions: JsonMap,
    },
    Error {
        execution_count: u32,
        ename: String,
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },
}

impl ExecuteReply {
    pub fn status(&self) -> ReplyStatus {
        match self {
            ExecuteReply::Ok { .. } => ReplyStatus::Ok,
            ExecuteReply::Error { .. } => ReplyStatus::Error,
        }
    }

    pub fn execution_count(&self) -> u32 {
        match self {
            ExecuteReply::Ok {
                execution_count, ..
            }
            | ExecuteReply::Error {
                execution_count, ..
            } => *execution_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteReply {
    pub matches: Vec<String>,
    pub cursor_start: usize,
    pub cursor_end: usize,
    #[serde(default)]
    pub metadata: JsonMap,
    pub status: ReplyStatus,
}

// ============================================================================
// Events (iopub side effects)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub name: String,
    pub text: String,
}

impl StreamChunk {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            name: "stdout".to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub execution_count: u32,
    pub data: MimeBundle,
    #[serde(default)]
    pub metadata: JsonMap,
}

impl ExecuteResult {
    pub fn plain_text(execution_count: u32, text: impl Into<String>) -> Self {
        let mut data = MimeBundle::new();
        data.insert(
            MIME_TEXT_PLAIN.to_string(),
            serde_json::Value::String(text.into()),
        );
        Self {
            execution_count,
            data,
            metadata: JsonMap::new(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.data.get(MIME_TEXT_PLAIN).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteError {
    pub ename: String,
    pub evalue: String,
    #[serde(default)]
    pub traceback: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub message: String,
}

/// A side effect published by the kernel while handling a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type", content = "content", rename_all = "snake_case")]
pub enum KernelEvent {
    Stream(StreamChunk),
    ExecuteResult(ExecuteResult),
    #[serde(rename = "error")]
    ExecuteError(ExecuteError),
    Alert(Alert),
}
