//! Request gates: API-key admission for job routes and bearer auth for admin routes.

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header;
use actix_web::middleware::Next;
use actix_web::{web, Error, HttpMessage, ResponseError};
use taskq_core::keys::fingerprint;

use crate::api::AppState;
use crate::error::ApiError;

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

fn reject<B>(req: ServiceRequest, err: ApiError) -> ServiceResponse<EitherBody<B>> {
    req.into_response(err.error_response()).map_into_right_body()
}

fn app_state(req: &ServiceRequest) -> Option<web::Data<AppState>> {
    req.app_data::<web::Data<AppState>>().cloned()
}

/// Credential check, then rate check. The admitted [`Credential`] is stored in
/// the request extensions for handlers.
///
/// [`Credential`]: taskq_core::Credential
pub async fn admission<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    let Some(state) = app_state(&req) else {
        return Ok(reject(req, ApiError::Internal("app state missing".to_string())));
    };

    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    match state.admission.admit(presented.as_deref()).await {
        Ok(credential) => {
            tracing::debug!(credential_id = %credential.id, path = %req.path(), "Request admitted");
            req.extensions_mut().insert(credential);
            next.call(req).await.map(ServiceResponse::map_into_left_body)
        }
        Err(err) => {
            tracing::debug!(error = %err, path = %req.path(), "Request rejected");
            Ok(reject(req, err.into()))
        }
    }
}

/// `Authorization: Bearer <token>` check against the configured admin token.
pub async fn admin_auth<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    let Some(state) = app_state(&req) else {
        return Ok(reject(req, ApiError::Internal("app state missing".to_string())));
    };

    let Some(expected) = state.admin_token_hash.as_deref() else {
        tracing::warn!(path = %req.path(), "Admin request rejected: no admin token configured");
        return Ok(reject(req, ApiError::Unauthorized));
    };

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    // Compared as fingerprints, never as raw tokens.
    let authorized = presented.is_some_and(|token| fingerprint(token) == expected);
    if !authorized {
        return Ok(reject(req, ApiError::Unauthorized));
    }

    next.call(req).await.map(ServiceResponse::map_into_left_body)
}
