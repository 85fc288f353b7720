//! Error → response mapping for the two kinds of endpoints: JSON calls made
//! by the cart page, and form posts that answer with a redirect.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde_json::json;

use crate::StorefrontError;

const SERVER_ERROR: &str = "Server error, please try again";

pub(crate) fn status_of(err: &StorefrontError) -> StatusCode {
    match err {
        StorefrontError::Validation(_) | StorefrontError::EmptyCart => StatusCode::BAD_REQUEST,
        StorefrontError::NotFound(_) | StorefrontError::ItemNotFound => StatusCode::NOT_FOUND,
        StorefrontError::InvalidTransition(_)
        | StorefrontError::TerminalState(_)
        | StorefrontError::NotApplicable(_)
        | StorefrontError::CartConflict
        | StorefrontError::OrderConflict => StatusCode::CONFLICT,
        StorefrontError::DuplicateOrderNumber | StorefrontError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// What the shopper gets to read. Internal failures are logged here and
/// replaced by a generic message.
pub(crate) fn user_message(err: &StorefrontError) -> String {
    if err.is_recoverable() {
        err.to_string()
    } else {
        tracing::error!(error = %err, "request failed");
        SERVER_ERROR.to_string()
    }
}

/// Appends `key=value` to `path`, form-encoded.
pub(crate) fn with_query(path: &str, key: &str, value: &str) -> String {
    match serde_urlencoded::to_string([(key, value)]) {
        Ok(query) => format!("{path}?{query}"),
        Err(_) => path.to_string(),
    }
}

/// `{success: false, message}` with a status matching the error.
#[derive(Debug)]
pub struct JsonError(pub StorefrontError);

impl From<StorefrontError> for JsonError {
    fn from(e: StorefrontError) -> Self { Self(e) }
}

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "success": false, "message": user_message(&self.0) }));
        (status_of(&self.0), body).into_response()
    }
}

/// Sends the browser back to `to` with the failure in `?error=`.
#[derive(Debug)]
pub struct RedirectError {
    pub to: String,
    pub err: StorefrontError,
}

impl RedirectError {
    pub fn new(to: impl Into<String>, err: StorefrontError) -> Self { Self { to: to.into(), err } }
}

impl IntoResponse for RedirectError {
    fn into_response(self) -> Response {
        Redirect::to(&with_query(&self.to, "error", &user_message(&self.err))).into_response()
    }
}

/// Adapts a service result for a redirect endpoint.
pub(crate) trait OrRedirect<T> {
    fn or_redirect(self, to: &str) -> Result<T, RedirectError>;
}

impl<T> OrRedirect<T> for crate::Result<T> {
    fn or_redirect(self, to: &str) -> Result<T, RedirectError> {
        self.map_err(|e| RedirectError::new(to, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn test_query_is_encoded() {
        assert_eq!(with_query("/cart", "error", "Your cart is empty"), "/cart?error=Your+cart+is+empty");
    }

    #[test]
    fn test_storage_details_hidden() {
        let err = StorefrontError::Storage("relation \"orders\" does not exist".into());
        assert_eq!(user_message(&err), SERVER_ERROR);
        assert_eq!(status_of(&err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_redirect_error_location() {
        let res = RedirectError::new("/cart/checkout", StorefrontError::validation("City is required")).into_response();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/cart/checkout?error=City+is+required");
    }

    #[test]
    fn test_json_error_status() {
        assert_eq!(JsonError(StorefrontError::not_found("Product")).into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(JsonError(StorefrontError::CartConflict).into_response().status(), StatusCode::CONFLICT);
        assert_eq!(JsonError(StorefrontError::OrderConflict).into_response().status(), StatusCode::CONFLICT);
    }
}
