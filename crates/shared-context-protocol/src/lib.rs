//! Shared wire/domain types for the shared-context coordination server:
//! the entity model, validated `Identity`, the error taxonomy, and the tool
//! argument schemas every other crate builds on.

pub mod error;
pub mod identity;
pub mod model;
pub mod sanitize;
pub mod tools;
pub mod validate;

pub use error::{CoreError, CoreResult, ErrorCode, Severity, WireError};
pub use identity::{Identity, Permission};
pub use model::{AgentMemory, AuditEvent, Message, MemoryScope, MessageType, SecureToken, Session, Visibility};
