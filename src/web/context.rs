//! Request-scoped identity: the anonymous session id and the signed-in user
//! forwarded by the identity provider.

use std::str::FromStr;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use uuid::Uuid;

use crate::domain::CartOwner;

pub const SESSION_COOKIE: &str = "sid";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

const LOGIN_REDIRECT: &str = "/users/login?error=Please%20log%20in%20to%20continue";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role { User, Seller, Admin }

impl FromStr for Role {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "user" => Ok(Self::User),
            "seller" => Ok(Self::Seller),
            "admin" => Ok(Self::Admin),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    /// A malformed user id is treated as no identity at all. An unknown
    /// role degrades to a plain user.
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let user_id = headers.get(USER_ID_HEADER)?.to_str().ok()?.trim().parse().ok()?;
        let role = headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(Role::User);
        Some(Self { user_id, role })
    }
}

/// Session id assigned by [`session_cookie`], stored in request extensions.
#[derive(Clone, Debug)]
struct SessionId(String);

fn session_from_cookies(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Makes sure every request carries a session id, issuing a cookie for
/// first-time visitors.
pub async fn session_cookie(mut req: Request, next: Next) -> Response {
    let (sid, fresh) = match session_from_cookies(req.headers()) {
        Some(sid) => (sid, false),
        None => (Uuid::new_v4().to_string(), true),
    };
    req.extensions_mut().insert(SessionId(sid.clone()));

    let mut res = next.run(req).await;
    if fresh {
        let cookie = format!("{SESSION_COOKIE}={sid}; Path=/; HttpOnly; SameSite=Lax");
        match HeaderValue::from_str(&cookie) {
            Ok(value) => { res.headers_mut().append(header::SET_COOKIE, value); }
            Err(e) => tracing::warn!(error = %e, "could not encode session cookie"),
        }
    }
    res
}

/// Everything a handler needs to know about who is calling.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub session_id: String,
    pub user: Option<Identity>,
}

impl RequestContext {
    /// Signed-in users work on their persisted cart, everyone else on the
    /// session cart.
    pub fn cart_owner(&self) -> CartOwner {
        match self.user {
            Some(identity) => CartOwner::User(identity.user_id),
            None => CartOwner::Session(self.session_id.clone()),
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session_id = match parts.extensions.get::<SessionId>() {
            Some(SessionId(sid)) => sid.clone(),
            None => session_from_cookies(&parts.headers).ok_or_else(|| {
                tracing::error!("request reached a handler without a session id");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            })?,
        };
        Ok(Self { session_id, user: Identity::from_headers(&parts.headers) })
    }
}

/// Any signed-in user. Anonymous callers are sent to the login page.
#[derive(Clone, Copy, Debug)]
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Identity::from_headers(&parts.headers)
            .map(AuthUser)
            .ok_or_else(|| Redirect::to(LOGIN_REDIRECT).into_response())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AdminUser(pub Identity);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;
        if identity.role != Role::Admin {
            tracing::warn!(user_id = %identity.user_id, "non-admin denied back-office access");
            return Err((StatusCode::FORBIDDEN, "Access denied").into_response());
        }
        Ok(AdminUser(identity))
    }
}
