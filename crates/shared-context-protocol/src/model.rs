//! Entity model: the shapes persisted by the storage backend and
//! returned by every engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-message access classification. Drives read filtering in the Message
/// Engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    AgentOnly,
    AdminOnly,
}

impl Visibility {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            "agent_only" => Some(Self::AgentOnly),
            "admin_only" => Some(Self::AdminOnly),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::AgentOnly => "agent_only",
            Self::AdminOnly => "admin_only",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    AgentResponse,
    HumanInput,
    SystemStatus,
    ToolOutput,
    Coordination,
}

impl MessageType {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agent_response" => Some(Self::AgentResponse),
            "human_input" => Some(Self::HumanInput),
            "system_status" => Some(Self::SystemStatus),
            "tool_output" => Some(Self::ToolOutput),
            "coordination" => Some(Self::Coordination),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgentResponse => "agent_response",
            Self::HumanInput => "human_input",
            Self::SystemStatus => "system_status",
            Self::ToolOutput => "tool_output",
            Self::Coordination => "coordination",
        }
    }
}

impl Default for MessageType {
    fn default() -> Self {
        Self::AgentResponse
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Public
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub purpose: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub sender: String,
    pub content: String,
    pub visibility: Visibility,
    pub message_type: MessageType,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub parent_message_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMemory {
    pub agent_id: String,
    pub session_id: Option<String>,
    pub key: String,
    pub value: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Scope selector used by `Memory Engine::list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryScope {
    Global,
    Session,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub agent_id: String,
    pub session_id: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub result: String,
    pub metadata: serde_json::Value,
}

/// Internal record backing the Identity & Token Store. The plaintext
/// JWT is never persisted — only its AEAD-encrypted form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureToken {
    pub token_id: String,
    pub encrypted_jwt: Vec<u8>,
    pub nonce: Vec<u8>,
    pub agent_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
