//! The pingora proxy that fronts the telemetry backend.
//!
//! Registration, profile and key regeneration are answered locally under
//! `/auth/`. Every other request is authenticated by API key and proxied
//! upstream with the key headers removed and the caller's account id and
//! username attached. Authentication failures all look the same to the
//! client; the reason is only logged and counted.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use pingora::http::{RequestHeader, ResponseHeader};
use pingora::prelude::*;
use serde::{Deserialize, Serialize};

use crate::accounts::{Account, AccountSource};
use crate::auth::{
    API_KEY_HEADER, AUTHORIZATION_HEADER, Authenticator, PresentedCredentials, ensure_active,
};
use crate::error::{AuthError, RegistrationError};
use crate::metric::Metrics;
use crate::registration::Registrar;

pub const ACCOUNT_ID_HEADER: &str = "x-account-id";
pub const ACCOUNT_USERNAME_HEADER: &str = "x-account-username";

/// Metrics subject for requests rejected because the store was unreachable.
pub const STORE_UNAVAILABLE: &str = "<store_unavailable>";

const REGISTER_PATH: &str = "/auth/register";
const ME_PATH: &str = "/auth/users/me";
const REGENERATE_PATH: &str = "/auth/regenerate-key";

const MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Register,
    Me,
    RegenerateKey,
    Proxy,
}

fn route(method: &str, path: &str) -> Route {
    match (method, path) {
        ("POST", REGISTER_PATH) => Route::Register,
        ("GET", ME_PATH) => Route::Me,
        ("POST", REGENERATE_PATH) => Route::RegenerateKey,
        _ => Route::Proxy,
    }
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    username: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiKeyResponse<'a> {
    user_id: i64,
    username: &'a str,
    api_key: &'a str,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct UserResponse<'a> {
    user_id: i64,
    username: &'a str,
    email: Option<&'a str>,
    is_active: bool,
    is_registered: bool,
    created_at: Option<DateTime<Utc>>,
    registered_at: Option<DateTime<Utc>>,
    last_login: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Account> for UserResponse<'a> {
    fn from(account: &'a Account) -> Self {
        Self {
            user_id: account.id,
            username: &account.username,
            email: account.email.as_deref(),
            is_active: account.is_active,
            is_registered: account.is_registered,
            created_at: account.created_at,
            registered_at: account.registered_at,
            last_login: account.last_login,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'a str>,
}

/// Authenticating reverse proxy in front of the telemetry backend.
///
/// `/auth/*` endpoints are answered here. Everything else must carry a
/// valid API key and is forwarded to `upstream` with the caller's identity
/// in `x-account-*` headers.
pub struct Gateway<S> {
    authenticator: Arc<Authenticator<S>>,
    registrar: Arc<Registrar<S>>,
    upstream: SocketAddr,
    metrics: Arc<Metrics>,
}

impl<S: AccountSource + 'static> Gateway<S> {
    pub fn new(
        authenticator: Authenticator<S>,
        registrar: Registrar<S>,
        upstream: SocketAddr,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            registrar: Arc::new(registrar),
            upstream,
            metrics,
        }
    }

    /// Resolve the caller. Writes the rejection itself and returns `None`
    /// when the request must not go further.
    async fn authenticate(&self, session: &mut Session) -> Result<Option<Account>> {
        let credentials = presented_credentials(session.req_header());
        let authenticator = self.authenticator.clone();
        // PBKDF2 over every candidate is too slow for the event loop
        let outcome = tokio::task::spawn_blocking(move || authenticator.authenticate(&credentials))
            .await
            .map_err(|e| Error::because(ErrorType::InternalError, "authentication task failed", e))?;

        let account = match outcome {
            Ok(account) => account,
            Err(AuthError::Unauthenticated { reason }) => {
                self.metrics.record_failure(reason, 401);
                respond_unauthenticated(session).await?;
                return Ok(None);
            }
            Err(e) => {
                log::error!("Authentication unavailable: {}", e);
                self.metrics.record(STORE_UNAVAILABLE, 503);
                respond_error(session, 503, "Service temporarily unavailable", None).await?;
                return Ok(None);
            }
        };

        if ensure_active(&account).is_err() {
            self.metrics.record(&account.username, 403);
            respond_error(session, 403, "Inactive user", None).await?;
            return Ok(None);
        }
        Ok(Some(account))
    }

    async fn handle_register(&self, session: &mut Session) -> Result<()> {
        let Some(body) = read_body(session).await? else {
            return respond_error(session, 413, "Request body too large", None).await;
        };
        let request: RegisterRequest = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("Malformed registration request: {}", e);
                return respond_error(
                    session,
                    422,
                    "Invalid registration request",
                    Some("INVALID_REQUEST"),
                )
                .await;
            }
        };

        let registrar = self.registrar.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            registrar.register(&request.username, request.email.as_deref())
        })
        .await
        .map_err(|e| Error::because(ErrorType::InternalError, "registration task failed", e))?;

        match outcome {
            Ok(registration) => {
                self.metrics.record(&registration.account.username, 201);
                let body = ApiKeyResponse {
                    user_id: registration.account.id,
                    username: &registration.account.username,
                    api_key: registration.key.api_key.as_str(),
                    message: "Registration successful. Store your API key securely; it will not be shown again.",
                };
                respond_json(session, 201, &body).await
            }
            Err(e) => {
                let status = registration_status(&e);
                if status == 500 {
                    log::error!("Registration failed: {}", e);
                }
                self.metrics.record("<registration>", status);
                respond_error(session, status, &registration_detail(&e), Some(e.code())).await
            }
        }
    }

    async fn handle_regenerate(&self, session: &mut Session, account: Account) -> Result<()> {
        let registrar = self.registrar.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            registrar
                .regenerate(&account)
                .map(|key| (account, key))
        })
        .await
        .map_err(|e| Error::because(ErrorType::InternalError, "regeneration task failed", e))?;

        match outcome {
            Ok((account, key)) => {
                self.metrics.record(&account.username, 200);
                let body = ApiKeyResponse {
                    user_id: account.id,
                    username: &account.username,
                    api_key: key.api_key.as_str(),
                    message: "API key regenerated. The previous key no longer works.",
                };
                respond_json(session, 200, &body).await
            }
            Err(e) => {
                log::error!("API key regeneration failed: {}", e);
                respond_error(session, 500, "Failed to regenerate API key", Some(e.code())).await
            }
        }
    }
}

#[async_trait]
impl<S: AccountSource + 'static> ProxyHttp for Gateway<S> {
    /// The authenticated account for proxied requests.
    type CTX = Option<Account>;

    fn new_ctx(&self) -> Self::CTX {
        None
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool>
    where
        Self::CTX: Send + Sync,
    {
        let req = session.req_header();
        let target = route(req.method.as_str(), req.uri.path());

        if target == Route::Register {
            self.handle_register(session).await?;
            return Ok(true);
        }

        let Some(account) = self.authenticate(session).await? else {
            return Ok(true);
        };

        match target {
            Route::Me => {
                self.metrics.record(&account.username, 200);
                respond_json(session, 200, &UserResponse::from(&account)).await?;
                Ok(true)
            }
            Route::RegenerateKey => {
                self.handle_regenerate(session, account).await?;
                Ok(true)
            }
            Route::Register | Route::Proxy => {
                *ctx = Some(account);
                Ok(false)
            }
        }
    }

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        _ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        Ok(Box::new(HttpPeer::new(
            self.upstream,
            false, // plain HTTP to the upstream
            String::new(),
        )))
    }

    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut RequestHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()>
    where
        Self::CTX: Send + Sync,
    {
        upstream_request.remove_header(API_KEY_HEADER);
        upstream_request.remove_header(AUTHORIZATION_HEADER);
        // Identity headers only ever come from the gateway
        upstream_request.remove_header(ACCOUNT_ID_HEADER);
        upstream_request.remove_header(ACCOUNT_USERNAME_HEADER);

        if let Some(account) = ctx.as_ref() {
            upstream_request.insert_header(ACCOUNT_ID_HEADER, account.id.to_string())?;
            upstream_request.insert_header(ACCOUNT_USERNAME_HEADER, account.username.as_str())?;
        }
        Ok(())
    }

    async fn response_filter(
        &self,
        _session: &mut Session,
        upstream_response: &mut ResponseHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()>
    where
        Self::CTX: Send + Sync,
    {
        if let Some(account) = ctx.as_ref() {
            self.metrics
                .record(&account.username, upstream_response.status.as_u16());
        }
        Ok(())
    }
}

/// Header value as text. Non-ASCII bytes are kept (lossily) so a garbled
/// header still counts as present.
fn header_value(req: &RequestHeader, name: &str) -> Option<String> {
    req.headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

fn presented_credentials(req: &RequestHeader) -> PresentedCredentials {
    PresentedCredentials {
        api_key: header_value(req, API_KEY_HEADER),
        authorization: header_value(req, AUTHORIZATION_HEADER),
    }
}

fn registration_status(err: &RegistrationError) -> u16 {
    match err {
        RegistrationError::InvalidUsername => 422,
        RegistrationError::AccountNotFound => 404,
        RegistrationError::AlreadyRegistered => 409,
        RegistrationError::CredentialSourceUnavailable(_) | RegistrationError::Store(_) => 500,
    }
}

fn registration_detail(err: &RegistrationError) -> String {
    match err {
        RegistrationError::InvalidUsername => {
            "Username must be at least 3 characters long".to_string()
        }
        RegistrationError::AccountNotFound => {
            "Username not found. Contact an administrator to create your account.".to_string()
        }
        RegistrationError::AlreadyRegistered => {
            "User is already registered. Use /auth/regenerate-key to get a new key.".to_string()
        }
        RegistrationError::CredentialSourceUnavailable(_) | RegistrationError::Store(_) => {
            "Registration failed due to an internal error".to_string()
        }
    }
}

/// Read the whole request body. `None` when it exceeds `MAX_BODY_BYTES`.
async fn read_body(session: &mut Session) -> Result<Option<Vec<u8>>> {
    let mut body = Vec::new();
    while let Some(chunk) = session.read_request_body().await? {
        if body.len() + chunk.len() > MAX_BODY_BYTES {
            return Ok(None);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(Some(body))
}

async fn respond_unauthenticated(session: &mut Session) -> Result<()> {
    let body = ErrorBody {
        detail: "Authentication required",
        error_code: None,
    };
    write_json(session, 401, &body, Some(("WWW-Authenticate", "Bearer"))).await
}

async fn respond_error(
    session: &mut Session,
    status: u16,
    detail: &str,
    error_code: Option<&str>,
) -> Result<()> {
    write_json(session, status, &ErrorBody { detail, error_code }, None).await
}

async fn respond_json<T: Serialize>(session: &mut Session, status: u16, body: &T) -> Result<()> {
    write_json(session, status, body, None).await
}

async fn write_json<T: Serialize>(
    session: &mut Session,
    status: u16,
    body: &T,
    extra_header: Option<(&'static str, &'static str)>,
) -> Result<()> {
    let body = serde_json::to_vec(body)
        .map_err(|e| Error::because(ErrorType::InternalError, "failed to encode response", e))?;

    let mut header = ResponseHeader::build(status, Some(3))?;
    header.insert_header("Content-Type", "application/json")?;
    header.insert_header("Content-Length", body.len().to_string())?;
    if let Some((name, value)) = extra_header {
        header.insert_header(name, value)?;
    }
    session.set_keepalive(None);
    session
        .write_response_header(Box::new(header), false)
        .await?;
    session
        .write_response_body(Some(Bytes::from(body)), true)
        .await?;
    Ok(())
}
