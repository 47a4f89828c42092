//! Tool surface: the 13 named tools, each taking a validated argument
//! object plus the caller's already-authenticated [`Identity`], returning
//! the wire success/error envelope.

use std::time::Duration;

use serde_json::{json, Value};
use shared_context_auth::VisibilityFilter;
use shared_context_protocol::tools::*;
use shared_context_protocol::{CoreError, CoreResult, Identity, MemoryScope, Permission, WireError};

use crate::app::App;

/// Dispatches a tool call by name and returns the wire JSON body (success or
/// error shape) — callers never see a `CoreError` directly.
pub async fn dispatch(app: &App, identity: &Identity, tool: &str, args: Value) -> Value {
    let result = dispatch_inner(app, identity, tool, args).await;
    match result {
        Ok(value) => value,
        Err(err) => serde_json::to_value(WireError::from(&err)).unwrap_or_else(|_| json!({"success": false})),
    }
}

async fn dispatch_inner(app: &App, identity: &Identity, tool: &str, args: Value) -> CoreResult<Value> {
    match tool {
        "create_session" => create_session(app, identity, args).await,
        "add_message" => add_message(app, identity, args).await,
        "get_messages" => get_messages(app, identity, args).await,
        "get_message" => get_message(app, identity, args).await,
        "search_context" => search_context(app, identity, args).await,
        "get_session" => get_session(app, identity, args).await,
        "list_sessions" => list_sessions(app, identity, args).await,
        "set_memory" => set_memory(app, identity, args).await,
        "get_memory" => get_memory(app, identity, args).await,
        "list_memory" => list_memory(app, identity, args).await,
        "delete_memory" => delete_memory(app, identity, args).await,
        "authenticate_agent" => authenticate_agent(app, identity, args).await,
        "refresh_token" => refresh_token(app, args).await,
        "get_usage_guidance" => get_usage_guidance(app, identity, args).await,
        other => Err(CoreError::validation(format!("unknown tool {other}"))),
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> CoreResult<T> {
    serde_json::from_value(args).map_err(|e| CoreError::validation(format!("invalid arguments: {e}")))
}

fn success<T: serde::Serialize>(payload: T) -> CoreResult<Value> {
    serde_json::to_value(WireSuccess::new(payload)).map_err(|e| CoreError::internal(format!("failed to encode response: {e}")))
}

async fn create_session(app: &App, identity: &Identity, args: Value) -> CoreResult<Value> {
    let req: CreateSessionRequest = parse_args(args)?;
    let session_id = app
        .sessions
        .create(identity, &req.purpose, req.metadata.unwrap_or(json!({})))
        .await?;
    success(json!({"session_id": session_id}))
}

async fn add_message(app: &App, identity: &Identity, args: Value) -> CoreResult<Value> {
    let req: AddMessageRequest = parse_args(args)?;
    let message_id = app
        .messages
        .append(
            identity,
            &req.session_id,
            &req.content,
            req.visibility.unwrap_or_default(),
            req.message_type.unwrap_or_default(),
            req.metadata.unwrap_or(json!({})),
            req.parent_message_id,
        )
        .await?;
    success(json!({"message_id": message_id}))
}

async fn get_messages(app: &App, identity: &Identity, args: Value) -> CoreResult<Value> {
    let req: GetMessagesRequest = parse_args(args)?;
    let filter = req.visibility_filter.map(|v| match v {
        shared_context_protocol::Visibility::Public => VisibilityFilter::Public,
        shared_context_protocol::Visibility::Private => VisibilityFilter::Private,
        shared_context_protocol::Visibility::AgentOnly => VisibilityFilter::AgentOnly,
        shared_context_protocol::Visibility::AdminOnly => VisibilityFilter::All,
    });

    if let Some(cursor) = req.cursor.as_deref() {
        let page = app
            .messages
            .get_page_cursor(identity, &req.session_id, Some(cursor), i64::from(req.limit), filter)
            .await?;
        success(json!({"messages": page.messages, "next_cursor": page.next_cursor}))
    } else {
        let messages = app
            .messages
            .get_page(identity, &req.session_id, i64::from(req.offset), i64::from(req.limit), filter)
            .await?;
        success(json!({"messages": messages}))
    }
}

async fn get_message(app: &App, identity: &Identity, args: Value) -> CoreResult<Value> {
    let req: GetMessageRequest = parse_args(args)?;
    let message = app.messages.get_by_id(identity, req.message_id).await?;
    success(json!({"message": message}))
}

async fn search_context(app: &App, identity: &Identity, args: Value) -> CoreResult<Value> {
    let req: SearchContextRequest = parse_args(args)?;
    let scope = match req.search_scope {
        SearchScope::All => None,
        SearchScope::Public => Some(VisibilityFilter::Public),
        SearchScope::Private => Some(VisibilityFilter::Private),
    };
    let threshold = req.fuzzy_threshold.min(100) as u8;
    let results = app
        .search
        .search(identity, &req.session_id, &req.query, threshold, req.limit as usize, req.search_metadata, scope)
        .await?;
    let payload: Vec<Value> = results
        .into_iter()
        .map(|scored| json!({"message": scored.message, "score": scored.score}))
        .collect();
    success(json!({"results": payload}))
}

async fn get_session(app: &App, identity: &Identity, args: Value) -> CoreResult<Value> {
    let req: GetSessionRequest = parse_args(args)?;
    let session = app.sessions.get(&req.session_id).await?;
    let messages = app.messages.get_page(identity, &req.session_id, 0, 1000, None).await?;
    success(json!({"session": session, "messages": messages}))
}

async fn list_sessions(app: &App, identity: &Identity, args: Value) -> CoreResult<Value> {
    let req: ListSessionsRequest = parse_args(args)?;
    let offset: i64 = req.cursor.as_deref().and_then(|c| c.parse().ok()).unwrap_or(0);
    let sessions = app.sessions.list(identity, offset, i64::from(req.limit)).await?;
    let next_cursor = if sessions.len() as u32 == req.limit {
        Some((offset + i64::from(req.limit)).to_string())
    } else {
        None
    };
    success(json!({"sessions": sessions, "next_cursor": next_cursor}))
}

async fn set_memory(app: &App, identity: &Identity, args: Value) -> CoreResult<Value> {
    let req: SetMemoryRequest = parse_args(args)?;
    let value = match &req.value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    app.memory
        .set(
            identity,
            &req.key,
            &value,
            req.session_id.as_deref(),
            req.expires_in.map(Duration::from_secs),
            req.overwrite,
            req.metadata.unwrap_or(json!({})),
        )
        .await?;
    success(json!({}))
}

async fn get_memory(app: &App, identity: &Identity, args: Value) -> CoreResult<Value> {
    let req: GetMemoryRequest = parse_args(args)?;
    let record = app.memory.get(identity, &req.key, req.session_id.as_deref()).await?;
    success(json!({"memory": record}))
}

async fn list_memory(app: &App, identity: &Identity, args: Value) -> CoreResult<Value> {
    let req: ListMemoryRequest = parse_args(args)?;
    let scope = match req.scope.as_deref() {
        Some("session") => MemoryScope::Session,
        Some("all") => MemoryScope::All,
        _ => MemoryScope::Global,
    };
    let records = app.memory.list(identity, req.session_id.as_deref(), scope, req.prefix.as_deref()).await?;
    success(json!({"entries": records}))
}

async fn delete_memory(app: &App, identity: &Identity, args: Value) -> CoreResult<Value> {
    let req: DeleteMemoryRequest = parse_args(args)?;
    let deleted = app.memory.delete(identity, &req.key, req.session_id.as_deref()).await?;
    success(json!({"deleted": deleted}))
}

async fn refresh_token(app: &App, args: Value) -> CoreResult<Value> {
    let req: RefreshTokenRequest = parse_args(args)?;
    let issued = app.tokens.refresh(&req.token).await?;
    success(json!({"token": issued.plaintext_token, "expires_at": issued.expires_at}))
}

/// Issues a new token for an already-authenticated admin on behalf of
/// another agent; requires the `admin` permission.
pub async fn authenticate_agent(app: &App, caller: &Identity, args: Value) -> CoreResult<Value> {
    if !caller.has(Permission::Admin) {
        app.audit
            .record("authorization", &caller.agent_id, None, None, Some("authenticate_agent"), "permission_denied", json!({}))
            .await
            .ok();
        return Err(CoreError::permission_denied("authenticate_agent requires admin permission"));
    }
    let req: AuthenticateAgentRequest = parse_args(args)?;
    let permissions = req.permissions.iter().filter_map(|p| shared_context_protocol::Permission::parse(p)).collect();
    let issued = app.tokens.issue(&req.agent_id, &req.agent_type, permissions, None).await?;
    success(json!({"token_id": issued.token_id, "token": issued.plaintext_token, "expires_at": issued.expires_at}))
}

async fn get_usage_guidance(_app: &App, identity: &Identity, args: Value) -> CoreResult<Value> {
    let _req: GetUsageGuidanceRequest = parse_args(args)?;
    let permissions: Vec<&str> = identity.permissions.iter().map(|p| p.as_str()).collect();
    success(json!({
        "agent_id": identity.agent_id,
        "agent_type": identity.agent_type,
        "permissions": permissions,
        "guidance": "Call create_session before add_message; use search_context for fuzzy recall across a session.",
    }))
}
