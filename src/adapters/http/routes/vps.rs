//! `/vps` billing endpoints: Stripe webhook, checkout creation, the
//! checkout landing/polling pages and the customer billing portal.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    adapters::http::{app_state::AppState, current_user::CurrentUser},
    app_error::{AppError, AppResult},
    domain::entities::billing_record::LivemodeFilter,
    use_cases::webhook::WebhookOutcome,
};

const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(stripe_webhook))
        .route("/checkout", post(start_checkout))
        .route("/checkout-status", get(checkout_status))
        .route("/success", get(checkout_success))
        .route("/cancel", get(checkout_cancel))
        .route("/orders", get(order_history))
        .route("/billing-portal", get(billing_portal))
        .route("/dev/price-map", get(dev_price_map))
}

// ============================================================================
// Webhook
// ============================================================================

/// POST /vps/webhook
///
/// Renders its own `{"ok": ..}` envelope. A 500 leaves the event log row
/// unprocessed so Stripe's redelivery retries it.
async fn stripe_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let verified = match app_state.webhook_verifier.verify(&body, signature) {
        Ok(verified) => verified,
        Err(e) => {
            warn!(error = %e, "Rejected Stripe webhook");
            let message = match e {
                AppError::Verification(_) => "invalid signature",
                _ => "invalid payload",
            };
            return envelope_error(StatusCode::BAD_REQUEST, message);
        }
    };

    let event = &verified.event;
    match app_state
        .webhook_use_cases
        .handle(event, verified.signature_valid)
        .await
    {
        Ok(WebhookOutcome::Processed) => Json(json!({ "ok": true })).into_response(),
        Ok(WebhookOutcome::AlreadyProcessed) => {
            Json(json!({ "ok": true, "idempotent": true })).into_response()
        }
        Err(e) => {
            error!(
                error = %e,
                event_id = %event.id,
                event_type = %event.event_type,
                "Webhook processing failed, returning 500 for Stripe retry"
            );
            envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "webhook processing failed")
        }
    }
}

fn envelope_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "ok": false, "error": message }))).into_response()
}

// ============================================================================
// Checkout
// ============================================================================

#[derive(Debug, Deserialize)]
struct StartCheckoutPayload {
    plan_code: String,
    interval: String,
}

/// POST /vps/checkout
async fn start_checkout(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<StartCheckoutPayload>,
) -> AppResult<impl IntoResponse> {
    let started = app_state
        .checkout_use_cases
        .start_checkout(user.user_id, payload.plan_code.trim(), &payload.interval)
        .await?;

    Ok(Json(json!({
        "ok": true,
        "session_id": started.session_id,
        "checkout_url": started.checkout_url,
    })))
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: Option<String>,
}

impl SessionQuery {
    fn require(&self) -> AppResult<&str> {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::InvalidInput("session_id is required".into()))
    }
}

/// GET /vps/checkout-status?session_id=..
async fn checkout_status(
    State(app_state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> AppResult<impl IntoResponse> {
    let state = app_state.checkout_state.poll_state(query.require()?).await?;
    Ok(Json(json!({ "state": state })))
}

/// GET /vps/success?session_id=..
async fn checkout_success(
    State(app_state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> AppResult<impl IntoResponse> {
    let session_id = query.require()?;
    let decision = app_state.checkout_state.resolve_session(session_id).await?;

    info!(session_id, state = %decision.state, "Checkout landing resolved");

    Ok(Json(json!({
        "ok": true,
        "view": decision.state.landing_view(),
        "state": decision.state,
        "invoice_id": decision.invoice_id,
    })))
}

/// GET /vps/cancel
async fn checkout_cancel() -> impl IntoResponse {
    Json(json!({ "ok": true, "view": "canceled" }))
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Deserialize)]
struct OrdersQuery {
    mode: Option<String>,
}

/// GET /vps/orders?mode=all|live|test
async fn order_history(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<OrdersQuery>,
) -> AppResult<impl IntoResponse> {
    let filter = query
        .mode
        .as_deref()
        .map(LivemodeFilter::parse)
        .unwrap_or_default();

    let orders = app_state.ledger.history_for_user(user.user_id, filter).await?;

    Ok(Json(json!({ "ok": true, "mode": filter, "orders": orders })))
}

/// GET /vps/billing-portal
///
/// 303 to a fresh Stripe portal session for the signed-in user.
async fn billing_portal(
    State(app_state): State<AppState>,
    user: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let url = app_state
        .checkout_use_cases
        .open_billing_portal(user.user_id)
        .await?;

    Ok(Redirect::to(&url))
}

// ============================================================================
// Dev tools
// ============================================================================

#[derive(Debug, Deserialize)]
struct PriceMapQuery {
    bust: Option<String>,
}

/// GET /vps/dev/price-map[?bust=1]
async fn dev_price_map(
    State(app_state): State<AppState>,
    Query(query): Query<PriceMapQuery>,
) -> AppResult<impl IntoResponse> {
    if !app_state.config.allows_dev_tools() {
        return Err(AppError::NotFound);
    }

    let bust = matches!(query.bust.as_deref(), Some("1" | "true" | "yes"));
    if bust {
        app_state.price_cache.bust();
    }

    let snapshot = app_state.price_cache.snapshot().await?;

    Ok(Json(json!({
        "ok": true,
        "busted": bust,
        "rebuilds": app_state.price_cache.rebuild_count(),
        "snapshot": snapshot.as_ref(),
    })))
}
