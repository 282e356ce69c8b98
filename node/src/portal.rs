use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};
use tracing::{info, warn};

use fancoil_common::FieldSet;

pub const SSID_FIELD: &str = "wifi_ssid";
pub const PASS_FIELD: &str = "wifi_pass";

const MAX_SSID_LEN: usize = 32;
const MAX_WIFI_PASS_LEN: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: String,
    #[serde(default)]
    pub pass: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalSubmission {
    pub credentials: WifiCredentials,
    pub fields: FieldSet,
}

#[derive(Clone)]
struct PortalState {
    fields: Arc<FieldSet>,
    submit: Arc<Mutex<Option<oneshot::Sender<PortalSubmission>>>>,
}

/// Serves the configuration form until the user submits it or `wait` passes.
pub async fn serve(
    addr: SocketAddr,
    fields: FieldSet,
    wait: Duration,
) -> anyhow::Result<Option<PortalSubmission>> {
    let (submit_tx, submit_rx) = oneshot::channel();
    let state = PortalState {
        fields: Arc::new(fields),
        submit: Arc::new(Mutex::new(Some(submit_tx))),
    };

    let app = Router::new()
        .route("/", get(handle_get_form))
        .route("/save", post(handle_post_save))
        .with_state(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind configuration portal at {addr}"))?;
    info!("configuration portal listening on http://{addr}");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let submission = match tokio::time::timeout(wait, submit_rx).await {
        Ok(Ok(submission)) => Some(submission),
        Ok(Err(_)) => None,
        Err(_) => {
            info!("configuration portal timed out after {}s", wait.as_secs());
            None
        }
    };

    let _ = shutdown_tx.send(());
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("configuration portal server error: {err}"),
        Err(err) => warn!("configuration portal task failed: {err}"),
    }

    Ok(submission)
}

async fn handle_get_form(State(state): State<PortalState>) -> impl IntoResponse {
    Html(render_form(&state.fields, None))
}

async fn handle_post_save(
    State(state): State<PortalState>,
    Form(form): Form<HashMap<String, String>>,
) -> axum::response::Response {
    let submission = match parse_submission(&state.fields, &form) {
        Ok(submission) => submission,
        Err(message) => {
            return (
                StatusCode::BAD_REQUEST,
                Html(render_form(&state.fields, Some(message))),
            )
                .into_response();
        }
    };

    let Some(sender) = state.submit.lock().await.take() else {
        return (StatusCode::CONFLICT, Html(page("Configuration already submitted.")))
            .into_response();
    };

    info!("configuration portal form submitted for `{}`", submission.credentials.ssid);
    if sender.send(submission).is_err() {
        warn!("configuration portal closed before the submission was received");
    }

    Html(page("Saved. The device is connecting now.")).into_response()
}

pub fn parse_submission(
    fields: &FieldSet,
    form: &HashMap<String, String>,
) -> Result<PortalSubmission, &'static str> {
    let ssid = form.get(SSID_FIELD).map(|value| value.trim()).unwrap_or_default();
    if ssid.is_empty() {
        return Err("Network name cannot be empty");
    }
    if ssid.chars().count() > MAX_SSID_LEN {
        return Err("Network name is too long");
    }

    let pass = form.get(PASS_FIELD).cloned().unwrap_or_default();
    if pass.chars().count() > MAX_WIFI_PASS_LEN {
        return Err("Network password is too long");
    }

    let mut edited = fields.clone();
    for (field, _) in fields.iter() {
        if let Some(value) = form.get(field.key()) {
            edited.set(field, value);
        }
    }

    Ok(PortalSubmission {
        credentials: WifiCredentials {
            ssid: ssid.to_string(),
            pass,
        },
        fields: edited,
    })
}

pub fn render_form(fields: &FieldSet, error: Option<&str>) -> String {
    let mut inputs = String::new();
    inputs.push_str(&input(SSID_FIELD, "WiFi network", "text", "", MAX_SSID_LEN));
    inputs.push_str(&input(PASS_FIELD, "WiFi password", "password", "", MAX_WIFI_PASS_LEN));
    for (field, value) in fields.iter() {
        let kind = if field.is_secret() { "password" } else { "text" };
        inputs.push_str(&input(field.key(), field.label(), kind, value, field.max_len()));
    }

    let error = error
        .map(|message| format!("<p class=\"error\">{}</p>", escape_html(message)))
        .unwrap_or_default();

    page(&format!(
        "<h1>Fan coil setup</h1>{error}<form method=\"post\" action=\"/save\">{inputs}<button type=\"submit\">Save</button></form>"
    ))
}

fn input(name: &str, label: &str, kind: &str, value: &str, max_len: usize) -> String {
    format!(
        "<label for=\"{name}\">{label}</label><input id=\"{name}\" name=\"{name}\" type=\"{kind}\" value=\"{value}\" maxlength=\"{max_len}\">",
        name = escape_html(name),
        label = escape_html(label),
        value = escape_html(value),
    )
}

fn page(body: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width,initial-scale=1\"><title>Fan coil</title></head><body>{body}</body></html>"
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
