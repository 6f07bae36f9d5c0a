use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;

use busview_api::records_to_json;
use window_engine::ProduceError;

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  GET /messages
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_messages(State(state): State<AppState>) -> Response {
    let snapshot = state.query.list();
    match records_to_json(&snapshot) {
        Ok(body) => (
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "snapshot serialization failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}")).into_response()
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  POST /produce   (form: key=..&value=..)
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub(crate) struct ProduceForm {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

pub(crate) async fn handle_produce(
    State(state): State<AppState>,
    form: Result<Form<ProduceForm>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };
    let Some(value) = form.value.filter(|v| !v.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing 'value'").into_response();
    };

    match state.gateway.send(form.key.as_deref(), &value).await {
        Ok(delivery) => (StatusCode::OK, format!("Produced to {delivery}")).into_response(),
        Err(ProduceError::EmptyValue) => {
            (StatusCode::BAD_REQUEST, "Missing 'value'").into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}")).into_response(),
    }
}

// ═══════════════════════════════════════════════════════════════
//  POST /reset, GET /healthz, GET /
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_reset(State(state): State<AppState>) -> &'static str {
    state.query.reset();
    "Reset successful"
}

pub(crate) async fn handle_healthz() -> &'static str {
    "ok"
}

pub(crate) async fn handle_index(State(state): State<AppState>) -> Html<String> {
    Html(state.page.to_string())
}

pub(crate) async fn method_not_allowed() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}
