use super::error::*;
use super::handler::{self, RequestInfo};
use crate::application_port::AuthService;
use crate::domain_model::{OwnerId, RecordId};
use crate::server::*;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::{Filter, reject};

/// Mounted under `/api/v1`; every route lives below `auth/`.
pub fn routes(
    server: Arc<Server>,
    tls: bool,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let token = warp::post()
        .and(warp::path!("auth" / "token"))
        .and(warp::body::content_length_limit(16 * 1024))
        .and(warp::body::json())
        .and(with_request_info(tls))
        .and(with(server.credential_verifier.clone()))
        .and(with(server.auth_service.clone()))
        .and_then(handler::issue_token);

    let refresh = warp::post()
        .and(warp::path!("auth" / "refresh"))
        .and(with_request_info(tls))
        .and(with(server.auth_service.clone()))
        .and_then(handler::refresh_token);

    let verify = warp::get()
        .and(warp::path!("auth" / "verify"))
        .and(with_verification(server.auth_service.clone()))
        .and_then(handler::verify_token);

    let revoke = warp::post()
        .and(warp::path!("auth" / "revoke"))
        .and(with_request_info(tls))
        .and(with(server.auth_service.clone()))
        .and_then(handler::revoke_token);

    let sessions = warp::get()
        .and(warp::path!("auth" / "sessions"))
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.auth_service.clone()))
        .and_then(handler::list_sessions);

    let revoke_session = warp::delete()
        .and(warp::path!("auth" / "sessions" / RecordId))
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.auth_service.clone()))
        .and_then(handler::revoke_session);

    let revoke_all = warp::post()
        .and(warp::path!("auth" / "revoke_all"))
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.auth_service.clone()))
        .and_then(handler::revoke_all);

    token
        .or(refresh)
        .or(verify)
        .or(revoke)
        .or(sessions)
        .or(revoke_session)
        .or(revoke_all)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

/// A header that is absent or not valid UTF-8 reads as `None`.
fn optional_header(
    name: &'static str,
) -> impl Filter<Extract = (Option<String>,), Error = Infallible> + Clone {
    warp::header::optional::<String>(name)
        .or(warp::any().map(|| None))
        .unify()
}

/// `X-Forwarded-Proto: https` marks a request as HTTPS behind a terminating proxy.
fn with_request_info(
    tls: bool,
) -> impl Filter<Extract = (RequestInfo,), Error = Infallible> + Clone {
    optional_header("host")
        .and(optional_header("x-forwarded-proto"))
        .and(optional_header("origin"))
        .and(optional_header("user-agent"))
        .and(optional_header("cookie"))
        .and(warp::addr::remote())
        .map(
            move |host: Option<String>,
                  forwarded_proto: Option<String>,
                  origin: Option<String>,
                  user_agent: Option<String>,
                  cookie: Option<String>,
                  remote: Option<SocketAddr>| {
                let is_https = tls
                    || forwarded_proto
                        .as_deref()
                        .is_some_and(|p| p.eq_ignore_ascii_case("https"));
                RequestInfo {
                    host: host.unwrap_or_default(),
                    is_https,
                    origin,
                    ip: remote.map(|addr| addr.ip().to_string()),
                    user_agent,
                    cookie,
                }
            },
        )
}

fn with_verification(
    auth_service: Arc<dyn AuthService>,
) -> impl Filter<Extract = (OwnerId,), Error = warp::Rejection> + Clone {
    warp::header::<String>("authorization").and_then(move |token: String| {
        let auth_service = auth_service.clone();
        async move {
            if let Some(token) = token.strip_prefix("Bearer ") {
                let owner_id = auth_service
                    .verify(token)
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok(owner_id)
            } else {
                Err(reject::custom(ApiErrorCode::InvalidToken))
            }
        }
    })
}
