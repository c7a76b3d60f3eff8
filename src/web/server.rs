use crate::assistant::{Answer, Assistant, ExecutionOutcome};
use crate::error::AssistantError;
use crate::llm::AuditLogEntry;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application state
pub type AppState = Arc<Assistant>;

type ApiError = (StatusCode, Json<serde_json::Value>);

/// Routes without the listener, so handlers can be exercised in-process
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/ask", post(ask))
        .route("/health", get(health_check))
        .route("/history", get(history))
        .route("/history/:id/csv", get(history_csv))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .route("/", get(index))
        .layer(CorsLayer::permissive())
}

/// Start the web server
pub async fn start_server(assistant: Assistant, host: &str, port: u16) -> Result<(), AssistantError> {
    let app = router(Arc::new(assistant));

    let address = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| AssistantError::io_with_path(format!("Failed to bind: {}", e), &address))?;
    tracing::info!("SQL assistant running on http://{}", address);

    axum::serve(listener, app)
        .await
        .map_err(|e| AssistantError::internal(format!("Server error: {}", e)))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Defaults to true
    pub execute: Option<bool>,
}

fn failure(status: StatusCode, reason: impl Into<String>) -> ApiError {
    (
        status,
        Json(serde_json::json!({ "status": "failed", "reason": reason.into() })),
    )
}

async fn answer(state: &Assistant, req: &AskRequest) -> Result<Answer, ApiError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "Question must not be empty"));
    }
    state.ask(question, req.execute.unwrap_or(true)).await.map_err(|e| {
        tracing::error!(error = %e, "Pipeline failed");
        failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Pipeline failed: {}", e))
    })
}

async fn ask(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Result<Json<Answer>, ApiError> {
    answer(&state, &req).await.map(Json)
}

/// Rows of an answered question as `query_results.csv`. The recorded SQL is
/// executed again; the models are not consulted.
async fn history_csv(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let outcome = state
        .rerun(&id)
        .await
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("No history entry {}", id)))?;
    let result = match &outcome {
        ExecutionOutcome::Rows { result, .. } => result,
        ExecutionOutcome::Failed { error } => return Err(failure(StatusCode::UNPROCESSABLE_ENTITY, error.clone())),
        ExecutionOutcome::NoQuery { reason } => return Err(failure(StatusCode::UNPROCESSABLE_ENTITY, reason.clone())),
        ExecutionOutcome::Skipped => {
            return Err(failure(StatusCode::SERVICE_UNAVAILABLE, "No database configured"))
        }
    };

    let csv = result
        .to_csv()
        .map_err(|e| failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"query_results.csv\""),
        ],
        csv,
    )
        .into_response())
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "warehouse": state.can_execute(),
    }))
}

async fn history(State(state): State<AppState>) -> Json<Vec<AuditLogEntry>> {
    Json(state.audit_log().entries())
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>SQL Assistant</title>
    <style>
        body { font-family: sans-serif; max-width: 1100px; margin: 2rem auto; padding: 0 1rem; }
        textarea { width: 100%; height: 4rem; }
        pre { background: #f4f4f4; padding: 0.75rem; overflow-x: auto; }
        table { border-collapse: collapse; margin-top: 1rem; }
        th, td { border: 1px solid #ccc; padding: 0.25rem 0.5rem; text-align: left; }
        .error { color: #b00020; }
    </style>
</head>
<body>
    <h1>SQL Assistant</h1>
    <textarea id="question" placeholder="Give me the Gross sales for Brand B001 for January 2025"></textarea>
    <p>
        <button id="run">Run</button>
        <button id="csv" disabled>Download CSV</button>
    </p>
    <div id="output"></div>
    <script>
        const output = document.getElementById('output');
        const csvButton = document.getElementById('csv');
        const escape = (s) => String(s ?? '').replace(/[&<>]/g, (c) => ({ '&': '&amp;', '<': '&lt;', '>': '&gt;' }[c]));
        const body = () => JSON.stringify({ question: document.getElementById('question').value });
        let answerId = null;

        document.getElementById('run').onclick = async () => {
            output.innerHTML = 'Running...';
            csvButton.disabled = true;
            answerId = null;
            const res = await fetch('/api/ask', { method: 'POST', headers: { 'Content-Type': 'application/json' }, body: body() });
            const data = await res.json();
            if (!res.ok) { output.innerHTML = `<p class="error">${escape(data.reason)}</p>`; return; }

            let html = `<p>Agents: ${escape(data.routed.join(', ') || 'none')}</p>`;
            html += `<h3>Draft SQL</h3><pre>${escape(data.draft_sql)}</pre>`;
            html += `<h3>Validated SQL</h3><pre>${escape(data.sql)}</pre>`;
            const outcome = data.outcome;
            if (outcome.status === 'rows') {
                const r = outcome.result;
                html += `<p>${r.rows.length} rows in ${outcome.execution_time_ms.toFixed(1)} ms</p><table><tr>`;
                html += r.columns.map((c) => `<th>${escape(c)}</th>`).join('') + '</tr>';
                html += r.rows.map((row) => '<tr>' + row.map((v) => `<td>${v === null ? 'NULL' : escape(v)}</td>`).join('') + '</tr>').join('');
                html += '</table>';
                answerId = data.id;
                csvButton.disabled = false;
            } else if (outcome.status === 'failed') {
                html += `<p class="error">${escape(outcome.error)}</p>`;
            } else if (outcome.status === 'no_query') {
                html += `<p class="error">${escape(outcome.reason)}</p>`;
            }
            output.innerHTML = html;
        };

        csvButton.onclick = async () => {
            if (!answerId) { return; }
            const res = await fetch(`/api/history/${encodeURIComponent(answerId)}/csv`);
            if (!res.ok) { return; }
            const url = URL.createObjectURL(await res.blob());
            const link = document.createElement('a');
            link.href = url;
            link.download = 'query_results.csv';
            link.click();
            URL.revokeObjectURL(url);
        };
    </script>
</body>
</html>
"#;
