use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use shared::{Appointment, BookingError, IdentityClaims};

use crate::service::BookingService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BookingService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    pub slot: String,
    pub service: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAppointmentRequest {
    pub customer_id: String,
    pub slot: String,
}

#[derive(Debug, Serialize)]
pub struct AppointmentCreatedResponse {
    pub status: &'static str,
    pub appointment: Appointment,
}

#[derive(Debug, Serialize)]
pub struct AppointmentListResponse {
    pub status: &'static str,
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub status: &'static str,
    pub booked_slots: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub status: &'static str,
    pub claims: IdentityClaims,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(err: BookingError) -> ApiError {
    let code = match &err {
        BookingError::Unauthenticated => StatusCode::UNAUTHORIZED,
        BookingError::Forbidden => StatusCode::FORBIDDEN,
        BookingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        BookingError::SlotConflict(_) => StatusCode::CONFLICT,
        BookingError::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match &err {
        // Generic message; store details stay in the logs.
        BookingError::Storage => "internal server error".to_string(),
        other => other.to_string(),
    };
    (
        code,
        Json(ErrorResponse {
            status: err.classification(),
            message,
        }),
    )
}

/// Identity claims forwarded as headers by the trusted front proxy.
/// Extraction never rejects; the access-control layer alone decides
/// between unauthenticated and forbidden.
pub struct ForwardedClaims(pub IdentityClaims);

pub fn claims_from_headers(headers: &HeaderMap) -> IdentityClaims {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    let subject = header("x-claims-sub");
    let groups: Vec<String> = header("x-claims-groups")
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(String::from)
        .collect();

    IdentityClaims::from_parts(
        (!subject.is_empty()).then_some(subject),
        &header("x-claims-given-name"),
        &header("x-claims-family-name"),
        &header("x-claims-email"),
        groups,
    )
}

#[async_trait]
impl<S> FromRequestParts<S> for ForwardedClaims
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(claims_from_headers(&parts.headers)))
    }
}

pub fn create_router(state: AppState, allowed_origin: HeaderValue) -> Router {
    Router::new()
        .route("/appointments", post(create_appointment).get(list_my_appointments))
        .route(
            "/admin/appointments",
            get(list_all_appointments).delete(cancel_appointment),
        )
        .route("/availability", get(availability))
        .route("/whoami", get(whoami))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(allowed_origin)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_appointment(
    State(state): State<AppState>,
    ForwardedClaims(claims): ForwardedClaims,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentCreatedResponse>), ApiError> {
    let appointment = state
        .service
        .create(&claims, &request.slot, request.service)
        .await
        .map_err(error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(AppointmentCreatedResponse {
            status: "success",
            appointment,
        }),
    ))
}

pub async fn list_my_appointments(
    State(state): State<AppState>,
    ForwardedClaims(claims): ForwardedClaims,
) -> Result<Json<AppointmentListResponse>, ApiError> {
    let appointments = state
        .service
        .view_self(&claims)
        .await
        .map_err(error_response)?;
    Ok(Json(AppointmentListResponse {
        status: "success",
        appointments,
    }))
}

pub async fn list_all_appointments(
    State(state): State<AppState>,
    ForwardedClaims(claims): ForwardedClaims,
) -> Result<Json<AppointmentListResponse>, ApiError> {
    let appointments = state
        .service
        .view_all(&claims)
        .await
        .map_err(error_response)?;
    Ok(Json(AppointmentListResponse {
        status: "success",
        appointments,
    }))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    ForwardedClaims(claims): ForwardedClaims,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .service
        .cancel(&claims, &request.customer_id, &request.slot)
        .await
        .map_err(error_response)?;
    Ok(Json(MessageResponse {
        status: "success",
        message: "appointment cancelled".to_string(),
    }))
}

pub async fn availability(
    State(state): State<AppState>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let booked_slots = state.service.availability().await.map_err(error_response)?;
    Ok(Json(AvailabilityResponse {
        status: "success",
        booked_slots,
    }))
}

pub async fn whoami(ForwardedClaims(claims): ForwardedClaims) -> Json<WhoamiResponse> {
    Json(WhoamiResponse {
        status: "success",
        claims,
    })
}

pub async fn health_check() -> &'static str {
    "OK"
}
