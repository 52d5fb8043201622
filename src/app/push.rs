use crate::push::registry::RegistryError;
use crate::state;
use crate::types::push::{
    NotificationPayload, ReservationKey, SendOutcome, SubscriptionId, SubscriptionRegistration,
};

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::error;

#[derive(Serialize)]
pub(crate) struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub(crate) public_key: String,
}

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub(crate) async fn push_public_key(
    State(state): State<state::AppState>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    let Some(vapid) = state.vapid().ready() else {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Push notifications are not configured.",
        ));
    };

    Ok(Json(PublicKeyResponse {
        public_key: vapid.key_pair.public_key_base64url(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionResponse {
    pub(crate) id: SubscriptionId,
    pub(crate) owner_id: String,
    pub(crate) endpoint: String,
}

pub(crate) async fn push_subscribe(
    State(state): State<state::AppState>,
    request: Result<Json<SubscriptionRegistration>, JsonRejection>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), ApiError> {
    let Json(registration) =
        request.map_err(|err| api_error(StatusCode::BAD_REQUEST, err.body_text()))?;

    let subscription = state
        .registry()
        .register(registration, OffsetDateTime::now_utc())
        .await
        .map_err(|err| match err {
            RegistryError::Store(err) => {
                error!(error = %err, "failed to store push subscription");
                api_error(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Subscription store unavailable.",
                )
            }
            err => api_error(StatusCode::BAD_REQUEST, err.to_string()),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse {
            id: subscription.id,
            owner_id: subscription.owner_id,
            endpoint: subscription.endpoint,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NotifyRequest {
    pub(crate) owner_id: String,
    pub(crate) reservation_key: String,
    pub(crate) payload: NotificationPayload,
}

pub(crate) async fn push_notify(
    State(state): State<state::AppState>,
    request: Result<Json<NotifyRequest>, JsonRejection>,
) -> Result<Json<SendOutcome>, ApiError> {
    let Json(request) =
        request.map_err(|err| api_error(StatusCode::BAD_REQUEST, err.body_text()))?;

    let owner_id = request.owner_id.trim();
    let reservation_key = request.reservation_key.trim();
    if owner_id.is_empty() || reservation_key.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "ownerId and reservationKey are required.",
        ));
    }

    let outcome = state
        .engine
        .send_once(
            owner_id,
            &ReservationKey::new(reservation_key),
            &request.payload,
        )
        .await;
    Ok(Json(outcome))
}
