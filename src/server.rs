//! HTTP surface: telephony webhooks plus the client login API.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderName, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

use crate::config::BrokerConfig;
use crate::directory::{Directory, HttpDirectory};
use crate::error::IdentityError;
use crate::identity::IdentityBroker;
use crate::routing::{CallRouter, CallbackUrls, DtmfEvent, InboundCallEvent, reject_plan};
use crate::session::SessionTerminator;
use crate::token::TokenIssuer;

/// Host used in callback URLs when nothing better is known.
const FALLBACK_HOST: &str = "localhost";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: CallRouter,
    pub identity: Arc<IdentityBroker>,
    pub sessions: Arc<SessionTerminator>,
    /// Datacenter code handed to clients at login.
    pub dc: String,
    pub service_number: String,
    /// Callback host when the request carries no `Host` header.
    pub public_host: Option<String>,
}

impl AppState {
    /// Wire the production services from configuration.
    pub fn from_config(config: &BrokerConfig) -> crate::error::Result<Self> {
        let private_key = config.read_private_key()?;
        let tokens = TokenIssuer::from_rsa_pem(config.app_id.clone(), &private_key)?;
        let directory: Arc<dyn Directory> = Arc::new(HttpDirectory::new(
            &config.api_base_url,
            tokens.clone(),
            config.http_timeout,
        )?);

        let roster = Arc::new(config.roster.clone());
        Ok(Self {
            router: CallRouter::new(Arc::clone(&roster), config.service_number.clone()),
            identity: Arc::new(IdentityBroker::new(
                roster,
                Arc::clone(&directory),
                tokens,
            )),
            sessions: Arc::new(SessionTerminator::new(directory)),
            dc: config.dc.clone(),
            service_number: config.service_number.clone(),
            public_host: config.public_host.clone(),
        })
    }

    fn callback_urls(&self, headers: &HeaderMap) -> CallbackUrls {
        let host = request_host(headers)
            .or(self.public_host.as_deref())
            .unwrap_or(FALLBACK_HOST);
        CallbackUrls::for_host(host)
    }
}

/// Build the Axum router with every webhook and client route.
pub fn broker_routes(state: AppState) -> Router {
    Router::new()
        .route("/voice/answer", get(answer))
        .route("/voice/event", post(acknowledge))
        .route("/voice/inappevent", post(acknowledge))
        .route("/voice/rtc", post(acknowledge))
        .route("/voice/dtmf", post(dtmf))
        .route("/in-app-call-started", post(in_app_call_started))
        .route("/in-app-call-terminated", post(in_app_call_terminated))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/_/health", get(health))
        .layer(cors())
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
}

/// `Host` header without its port, like a URL hostname.
fn request_host(headers: &HeaderMap) -> Option<&str> {
    let host = headers.get(header::HOST)?.to_str().ok()?.trim();
    let hostname = if host.starts_with('[') {
        // IPv6 literal: keep the brackets, drop any port after them.
        host.find(']').map_or(host, |end| &host[..=end])
    } else {
        host.split(':').next().unwrap_or(host)
    };
    (!hostname.is_empty()).then_some(hostname)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "Ok"
}

// ── Call control ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AnswerParams {
    from_user: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

async fn answer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AnswerParams>,
) -> Response {
    let urls = state.callback_urls(&headers);
    // An empty `from_user=` is how some PSTN webhooks arrive.
    let from_user = params.from_user.filter(|u| !u.is_empty());
    let origin_is_app = from_user.is_some();

    let to = params.to.unwrap_or_default();
    if origin_is_app && to.is_empty() {
        warn!(from_user = ?from_user, "In-app answer webhook without destination");
        return (StatusCode::BAD_REQUEST, Json(reject_plan())).into_response();
    }

    let event = InboundCallEvent {
        origin_is_app,
        from: params.from.or(from_user).unwrap_or_default(),
        to,
    };
    Json(state.router.decide_inbound(&event, &urls)).into_response()
}

#[derive(Debug, Deserialize)]
struct DtmfCallback {
    dtmf: DtmfResult,
    from: String,
}

#[derive(Debug, Deserialize)]
struct DtmfResult {
    #[serde(default)]
    timed_out: bool,
    #[serde(default)]
    digits: Option<serde_json::Value>,
}

impl From<DtmfCallback> for DtmfEvent {
    fn from(callback: DtmfCallback) -> Self {
        let digits = callback.dtmf.digits.and_then(|digits| match digits {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        DtmfEvent {
            timed_out: callback.dtmf.timed_out,
            digits,
            from: callback.from,
        }
    }
}

async fn dtmf(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<DtmfCallback>, JsonRejection>,
) -> Response {
    let urls = state.callback_urls(&headers);
    match body {
        Ok(Json(callback)) => {
            let event = DtmfEvent::from(callback);
            Json(state.router.decide_dtmf(&event, &urls)).into_response()
        }
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Malformed DTMF callback");
            (StatusCode::BAD_REQUEST, Json(reject_plan())).into_response()
        }
    }
}

/// Call progress notifications need no reaction beyond an acknowledgement.
async fn acknowledge(body: String) -> &'static str {
    debug!(event = %body, "Call event");
    "Ok"
}

async fn in_app_call_started(body: String) -> &'static str {
    info!(event = %body, "In-app call started");
    "Ok"
}

async fn in_app_call_terminated(body: String) -> &'static str {
    info!(event = %body, "In-app call terminated");
    "Ok"
}

// ── Client API ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LoginRequest {
    user: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    name: String,
    user_id: Option<String>,
    token: String,
    dc: String,
    phone: String,
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Malformed login request");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "name": null, "message": "Malformed login request" })),
            )
                .into_response();
        }
    };
    match state.identity.login(&request.user).await {
        Ok(grant) => Json(LoginResponse {
            name: grant.name,
            user_id: grant.user_id,
            token: grant.token,
            dc: state.dc.clone(),
            phone: state.service_number.clone(),
        })
        .into_response(),
        Err(IdentityError::Unauthorized { name }) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "name": name, "message": "Unknown user" })),
        )
            .into_response(),
        Err(e) => {
            error!(user = %request.user, error = %e, "Login failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "name": request.user, "message": "Login failed" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct LogoutRequest {
    user: Option<String>,
    session: String,
}

async fn logout(
    State(state): State<AppState>,
    body: Result<Json<LogoutRequest>, JsonRejection>,
) -> StatusCode {
    match body {
        Ok(Json(request)) => {
            state
                .sessions
                .logout(request.user.as_deref(), &request.session)
                .await;
        }
        Err(rejection) => warn!(error = %rejection.body_text(), "Malformed logout request"),
    }
    StatusCode::OK
}
