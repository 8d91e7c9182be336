use super::error::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::logger::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::HeaderValue;
use warp::http::header::SET_COOKIE;
use warp::reject;
use warp::reply::{Reply, Response};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Headers the handlers need to build a `RequestContext` and `ClientMetadata`.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub host: String,
    pub is_https: bool,
    pub origin: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub cookie: Option<String>,
}

impl RequestInfo {
    pub fn context(&self) -> RequestContext {
        let ctx = RequestContext::new(self.host.clone(), self.is_https);
        match &self.origin {
            Some(origin) => ctx.with_origin(origin.clone()),
            None => ctx,
        }
    }

    pub fn metadata(&self) -> ClientMetadata {
        ClientMetadata {
            ip: self.ip.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl From<&IssuedTokens> for TokenResponse {
    fn from(issued: &IssuedTokens) -> Self {
        TokenResponse {
            access_token: issued.access_token.0.clone(),
            token_type: "Bearer",
            expires_in: issued.expires_in,
        }
    }
}

/// Session as shown to its owner: the hash stays server-side.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: RecordId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl From<RefreshTokenRecord> for SessionView {
    fn from(rec: RefreshTokenRecord) -> Self {
        SessionView {
            id: rec.id,
            issued_at: rec.issued_at,
            expires_at: rec.expires_at,
            is_revoked: rec.is_revoked,
            ip: rec.client_metadata.ip,
            user_agent: rec.client_metadata.user_agent,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OwnerResponse {
    pub owner_id: OwnerId,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked: u64,
}

fn with_cookie(mut resp: Response, header: Option<String>) -> Result<Response, reject::Rejection> {
    if let Some(header) = header {
        let value = HeaderValue::from_str(&header)
            .map_err(ApiErrorCode::internal)
            .map_err(reject::custom)?;
        resp.headers_mut().append(SET_COOKIE, value);
    }
    Ok(resp)
}

fn issued_reply(issued: &IssuedTokens) -> Result<Response, reject::Rejection> {
    let policy = &issued.cookie_policy;
    let cookie = match &issued.refresh_token {
        Some(raw) if policy.enabled => Some(policy.set_cookie_header(raw.as_str())),
        _ => None,
    };
    let resp = warp::reply::json(&ApiResponse::ok(TokenResponse::from(issued))).into_response();
    with_cookie(resp, cookie)
}

fn presented_refresh_token(
    info: &RequestInfo,
    auth_service: &dyn AuthService,
) -> Result<(String, CookiePolicy), reject::Rejection> {
    let policy = auth_service
        .cookie_policy(&info.context())
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    let raw = info
        .cookie
        .as_deref()
        .and_then(|header| policy.extract_from_header(header))
        .filter(|v| !v.is_empty())
        .ok_or_else(|| reject::custom(ApiErrorCode::MissingRefreshToken))?;
    Ok((raw, policy))
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

pub async fn issue_token(
    body: TokenRequest,
    info: RequestInfo,
    credential_verifier: Arc<dyn CredentialVerifier>,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let owner_id = credential_verifier
        .authenticate(&body.username, &body.password)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let issued = auth_service
        .issue(owner_id, ExtraClaims::new(), &info.context(), info.metadata())
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    issued_reply(&issued)
}

pub async fn refresh_token(
    info: RequestInfo,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (raw, _) = presented_refresh_token(&info, auth_service.as_ref())?;
    let issued = auth_service
        .refresh(&raw, &info.context())
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    issued_reply(&issued)
}

pub async fn verify_token(owner_id: OwnerId) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(OwnerResponse { owner_id })))
}

pub async fn revoke_token(
    info: RequestInfo,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (raw, policy) = presented_refresh_token(&info, auth_service.as_ref())?;
    let revoked = auth_service
        .revoke(&raw)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    debug!(revoked, "revoke via cookie");

    let resp = warp::reply::json(&ApiResponse::ok(RevokeResponse {
        revoked: revoked as u64,
    }))
    .into_response();
    with_cookie(resp, policy.enabled.then(|| policy.clear_cookie_header()))
}

pub async fn list_sessions(
    owner_id: OwnerId,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let sessions: Vec<SessionView> = auth_service
        .list_for_owner(owner_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?
        .into_iter()
        .map(SessionView::from)
        .collect();

    Ok(warp::reply::json(&ApiResponse::ok(sessions)))
}

pub async fn revoke_session(
    record_id: RecordId,
    owner_id: OwnerId,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let revoked = auth_service
        .revoke_owner_token(owner_id, record_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(RevokeResponse {
        revoked: revoked as u64,
    })))
}

pub async fn revoke_all(
    owner_id: OwnerId,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let revoked = auth_service
        .revoke_all_for_owner(owner_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(RevokeResponse { revoked })))
}
