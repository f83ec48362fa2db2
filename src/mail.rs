//! Send emails to user for important updates.
//!
//! Delivery is delegated to an [`EmailSender`]. The shipped sender,
//! [`NoopEmailSender`], only records the event in logs: no verification
//! email actually leaves the process, so the confirmation link is logged
//! instead.

use async_trait::async_trait;
use serde::Serialize;

use crate::user::User;

/// Email templates list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Ask the user to confirm their address by following `link`.
    AccountConfirmation { link: String },
}

#[derive(Debug, thiserror::Error)]
#[error("email could not be delivered: {0}")]
pub struct MailError(pub String);

/// Outbound email capability.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver `template` to `user`.
    async fn send(&self, template: Template, user: &User) -> Result<(), MailError>;
}

/// Sender that drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmailSender;

#[async_trait]
impl EmailSender for NoopEmailSender {
    async fn send(&self, template: Template, user: &User) -> Result<(), MailError> {
        match &template {
            Template::AccountConfirmation { link } => {
                tracing::info!(user_id = user.id, %link, "confirmation email not delivered")
            },
        }
        Ok(())
    }
}
