//! HTTP boundary — accepts a run request, returns the aggregate report.
//!
//! Deserialize, validate once, hand off to the blocking run, serialize
//! the result. Per-message failures never surface here; only
//! session-level errors produce the top-level error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{error, info};

use crate::config::AgentRunRequest;
use crate::error::Error;
use crate::mailbox::{ImapMailbox, MailboxSource};
use crate::pipeline::orchestrator::TriageRun;
use crate::pipeline::types::RunReport;
use crate::transport::{ReqwestFetcher, SmtpMailer};

/// Build the agent API router.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/agent/run", post(run_handler))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "inbox-agent"
    }))
}

async fn run_handler(Json(request): Json<AgentRunRequest>) -> Response {
    if let Err(e) = request.validate() {
        return error_response(StatusCode::BAD_REQUEST, &e.to_string());
    }

    info!(
        mailbox = %request.imap.mailbox,
        host = %request.imap.host,
        "Run requested"
    );

    // The run itself is blocking and strictly sequential; one message
    // is in flight at a time.
    match tokio::task::spawn_blocking(move || run_agent(&request)).await {
        Ok(Ok(report)) => Json(report).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "Run failed");
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Run task panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "run task failed")
        }
    }
}

/// Execute one triage run with the production collaborators.
///
/// Transport, HTTP client and mailbox construction failures are fatal
/// and surface as the single top-level error; the mailbox session is
/// released on every exit path after a successful connect.
pub fn run_agent(request: &AgentRunRequest) -> Result<RunReport, Error> {
    let transport = SmtpMailer::connect(&request.smtp)?;
    let http = ReqwestFetcher::new()?;
    let mut mailbox = ImapMailbox::connect(&request.imap)?;

    let run = TriageRun::new(&request.agent_profile, &request.settings, &request.smtp.user);
    let outcome = run.execute(&mut mailbox, &transport, &http, &request.imap.mailbox);

    if let Err(e) = mailbox.disconnect() {
        tracing::warn!(error = %e, "Mailbox session did not close cleanly");
    }

    outcome
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "message": message }))).into_response()
}
