//! Register a new account.

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidateEmail, ValidationError, ValidationErrors};

use crate::router::Valid;
use crate::user::{Registration, User};
use crate::{AppState, ServerError};

const NAME_MIN_LENGTH: usize = 3;
const NAME_MAX_LENGTH: usize = 100;

/// Registration form.
///
/// Absent and `null` members both count as empty, so every broken rule is
/// reported in a single response.
#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Body {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
    pub terms_accepted: Option<bool>,
}

fn violation(errors: &mut ValidationErrors, field: &'static str, code: &'static str, message: &'static str) {
    errors.add(field, ValidationError::new(code).with_message(message.into()));
}

impl Validate for Body {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let name = self.name.as_deref().unwrap_or_default().trim();
        if name.is_empty() {
            violation(&mut errors, "name", "required", "Name is required.");
        }
        let length = name.chars().count();
        if !(NAME_MIN_LENGTH..=NAME_MAX_LENGTH).contains(&length) {
            violation(
                &mut errors,
                "name",
                "length",
                "Name must be between 3 and 100 characters.",
            );
        }

        let email = self.email.clone().unwrap_or_default();
        if email.trim().is_empty() {
            violation(&mut errors, "email", "required", "Email is required.");
        }
        if !email.trim().to_owned().validate_email() {
            violation(&mut errors, "email", "email", "Email is invalid.");
        }

        let password = self.password.as_deref().unwrap_or_default();
        if password.is_empty() {
            violation(&mut errors, "password", "required", "Password is required.");
        }
        if password != self.confirm_password.as_deref().unwrap_or_default() {
            violation(
                &mut errors,
                "confirm_password",
                "must_match",
                "Passwords do not match.",
            );
        }

        if self.terms_accepted != Some(true) {
            violation(
                &mut errors,
                "terms_accepted",
                "terms",
                "You must accept the terms of use.",
            );
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, [(header::HeaderName, String); 1], Json<User>), ServerError> {
    let user = state
        .users
        .register(Registration {
            name: body.name.unwrap_or_default(),
            email: body.email.unwrap_or_default(),
            password: body.password.unwrap_or_default(),
            terms_accepted: true,
            created_by: None,
        })
        .await?;

    tracing::info!(user_id = user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/users/{}", user.id))],
        Json(user),
    ))
}
