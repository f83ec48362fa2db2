//! Error handler for nameflare.

use std::collections::BTreeMap;

use axum::extract::rejection::{BytesRejection, JsonRejection};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

use crate::crypto::CryptoError;
use crate::token::TokenError;

pub type Result<T> = std::result::Result<T, ServerError>;

const EMAIL_TAKEN: &str = "Email is already registered.";
const INVALID_CONFIRMATION: &str = "Confirmation token is invalid or expired.";
const DESERIALIZE_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error("email is already registered")]
    EmailTaken,

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error(transparent)]
    Body(#[from] BytesRejection),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account email is not confirmed")]
    Unconfirmed,

    #[error("user not found")]
    NotFound,

    #[error("confirmation token rejected")]
    InvalidConfirmation,

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid 'Authorization' header")]
    Unauthorized,
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<BTreeMap<String, Vec<String>>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(group_validation_errors(errors));
        self
    }

    /// Add a single message under `field`.
    pub fn field_error(mut self, field: &str, message: &str) -> Self {
        self.errors
            .get_or_insert_with(BTreeMap::new)
            .entry(field.to_owned())
            .or_default()
            .push(message.to_owned());
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/problem+json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

/// Group every message under its field, keeping rule order.
pub fn group_validation_errors(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .iter()
        .map(|(field, issues)| {
            let messages = issues
                .iter()
                .map(|issue| match &issue.message {
                    Some(message) => message.to_string(),
                    None => issue.code.to_string(),
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

/// Field and message of a body that could not be read.
///
/// Type mismatches carry the offending path, e.g. `terms_accepted: invalid
/// type: string "yes", expected a boolean`. Anything else is reported
/// against `body`.
pub fn rejection_field(rejection: &JsonRejection) -> (String, String) {
    let text = rejection.body_text();

    if let JsonRejection::JsonDataError(_) = rejection {
        if let Some((path, message)) = text
            .strip_prefix(DESERIALIZE_PREFIX)
            .and_then(|rest| rest.split_once(": "))
        {
            if !path.is_empty() && path != "." && !path.contains(char::is_whitespace) {
                return (path.to_owned(), message.to_owned());
            }
        }
    }

    ("body".to_owned(), text)
}

/// Conflict outcome shaped like any other validation failure.
pub fn email_taken() -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(
        "email",
        ValidationError::new("unique").with_message(EMAIL_TAKEN.into()),
    );
    errors
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => response.errors(validation_errors),

            ServerError::EmailTaken => response.errors(&email_taken()),

            ServerError::Axum(rejection) => {
                let (field, message) = rejection_field(rejection);

                response
                    .title("Request body could not be parsed.")
                    .details(&rejection.body_text())
                    .field_error(&field, &message)
            },

            ServerError::Body(rejection) => response
                .title("Request body could not be read.")
                .details(&rejection.body_text())
                .field_error("body", &rejection.body_text())
                .status(rejection.status()),

            ServerError::InvalidConfirmation => response
                .title("Email could not be confirmed.")
                .field_error("token", INVALID_CONFIRMATION),

            ServerError::InvalidCredentials => response
                .title("Invalid email or password.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Unconfirmed => response
                .title("Account email must be confirmed before signing in.")
                .status(StatusCode::FORBIDDEN),

            ServerError::NotFound => response
                .title("User not found.")
                .status(StatusCode::NOT_FOUND),

            ServerError::Unauthorized
            | ServerError::Token(
                TokenError::Expired | TokenError::Invalid(_) | TokenError::WrongPurpose(_),
            ) => {
                tracing::debug!(error = %self, "request rejected");

                response
                    .title("Missing or invalid credentials.")
                    .details("invalid 'Authorization' header")
                    .status(StatusCode::UNAUTHORIZED)
            },

            ServerError::Sql(err) => {
                tracing::error!(error = ?err, "database request failed");

                ResponseError::default()
            },

            ServerError::Crypto(err) => {
                tracing::error!(error = %err, "credential derivation failed");

                ResponseError::default()
            },

            ServerError::Token(err @ TokenError::Encoding(_)) => {
                tracing::error!(error = %err, "token issuance failed");

                ResponseError::default()
            },

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");

                ResponseError::default()
            },
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/problem+json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
