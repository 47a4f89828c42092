//! Resource surface: URI-addressable, subscribable JSON snapshots.

use serde_json::{json, Value};
use shared_context_protocol::{CoreError, CoreResult, Identity, MemoryScope};

use crate::app::App;

pub async fn read(app: &App, identity: &Identity, uri: &str) -> CoreResult<Value> {
    if let Some(session_id) = uri.strip_prefix("session://") {
        let session = app.sessions.get(session_id).await?;
        let messages = app.messages.get_page(identity, session_id, 0, 1000, None).await?;
        return Ok(json!({"session": session, "messages": messages}));
    }

    if let Some(rest) = uri.strip_prefix("agent://") {
        if let Some(agent_id) = rest.strip_suffix("/memory") {
            if agent_id != identity.agent_id {
                return Err(CoreError::permission_denied("only the authenticated agent may read their own memory"));
            }
            let entries = app.memory.list(identity, None, MemoryScope::Global, None).await?;
            return Ok(json!({"agent_id": agent_id, "entries": entries}));
        }
    }

    Err(CoreError::not_found(format!("no such resource: {uri}")))
}

#[cfg(test)]
mod tests {
    #[test]
    fn agent_memory_uri_parses_agent_id() {
        let uri = "agent://agent-42/memory";
        let rest = uri.strip_prefix("agent://").unwrap();
        assert_eq!(rest.strip_suffix("/memory").unwrap(), "agent-42");
    }
}
