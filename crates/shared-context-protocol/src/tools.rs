//! Tool argument/result schemas. Explicit request structs validated once
//! at the boundary rather than loose argument dicts.

use serde::{Deserialize, Serialize};

use crate::model::{MessageType, Visibility};

fn default_limit() -> u32 {
    50
}

fn default_search_limit() -> u32 {
    10
}

fn default_threshold() -> u32 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    pub purpose: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddMessageRequest {
    pub session_id: String,
    pub content: String,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub parent_message_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetMessagesRequest {
    pub session_id: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub visibility_filter: Option<Visibility>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetMessageRequest {
    pub message_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    All,
    Public,
    Private,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchContextRequest {
    pub session_id: String,
    pub query: String,
    #[serde(default = "default_threshold")]
    pub fuzzy_threshold: u32,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
    #[serde(default)]
    pub search_metadata: bool,
    #[serde(default)]
    pub search_scope: SearchScope,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListSessionsRequest {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetMemoryRequest {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default = "default_true")]
    pub overwrite: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetMemoryRequest {
    pub key: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListMemoryRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteMemoryRequest {
    pub key: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticateAgentRequest {
    pub agent_id: String,
    pub agent_type: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetUsageGuidanceRequest {
    #[serde(default)]
    pub guidance_type: Option<String>,
}

/// Generic success envelope: `{success: true, ...payload fields}`.
#[derive(Debug, Clone, Serialize)]
pub struct WireSuccess<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: T,
}

impl<T: Serialize> WireSuccess<T> {
    pub fn new(payload: T) -> Self {
        Self {
            success: true,
            payload,
        }
    }
}
