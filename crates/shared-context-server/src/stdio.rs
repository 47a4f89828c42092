//! STDIO transport: one JSON request per line on stdin, one JSON
//! response per line on stdout. Identity comes from a `token` field on each
//! request rather than a header, since there is no HTTP envelope here.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use shared_context_protocol::WireError;

use crate::app::App;
use crate::tools;

#[derive(Debug, Deserialize)]
struct StdioRequest {
    token: String,
    tool: String,
    #[serde(default)]
    args: Value,
}

/// Reads requests line by line until stdin closes. Never writes anything but
/// response JSON to stdout, keeping the protocol channel clean.
pub async fn run(app: Arc<App>) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&app, &line).await;
        let mut encoded = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());
        encoded.push('\n');
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn handle_line(app: &App, line: &str) -> Value {
    let request: StdioRequest = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(err) => {
            warn!(error = %err, "malformed stdio request line");
            return json!({"success": false, "error": {"code": "VALIDATION", "message": format!("malformed request: {err}")}});
        }
    };

    match app.tokens.validate(&request.token).await {
        Ok(identity) => tools::dispatch(app, &identity, &request.tool, request.args).await,
        Err(err) => serde_json::to_value(WireError::from(&err)).unwrap_or_else(|_| json!({"success": false})),
    }
}
