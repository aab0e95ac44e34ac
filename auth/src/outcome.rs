use crate::types::UserInfo;
use axum::{
    Json,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};

/// HTTP-level result of a dispatcher operation
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// Redirect the browser (issuer, end session endpoint, logged-out page)
    Redirect(String),
    /// Bare status code
    Status(StatusCode),
    /// HTML page
    Page(String),
    /// Current user
    User(UserInfo),
}

impl AuthOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthOutcome::Redirect(_) => StatusCode::TEMPORARY_REDIRECT,
            AuthOutcome::Status(status) => *status,
            AuthOutcome::Page(_) | AuthOutcome::User(_) => StatusCode::OK,
        }
    }

    /// Redirect target, if any
    pub fn location(&self) -> Option<&str> {
        match self {
            AuthOutcome::Redirect(location) => Some(location),
            _ => None,
        }
    }
}

impl IntoResponse for AuthOutcome {
    fn into_response(self) -> Response {
        match self {
            AuthOutcome::Redirect(location) => Redirect::temporary(&location).into_response(),
            AuthOutcome::Status(status) => status.into_response(),
            AuthOutcome::Page(html) => Html(html).into_response(),
            AuthOutcome::User(userinfo) => Json(userinfo).into_response(),
        }
    }
}
