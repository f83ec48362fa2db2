//! Typed builder for User.

use chrono::{DateTime, Utc};

use crate::crypto::{CryptoError, PasswordManager};
use crate::user::{DEFAULT_LOCALE, DEFAULT_TIMEZONE, NewUser, UserType};

/// [`NewUser`] builder.
#[derive(Debug, Clone)]
pub struct UserBuilder<Name, Email> {
    name: Name,
    email: Email,
    password: String,
    created_by: Option<i64>,
    terms_accepted: bool,
}

/// Value is missing on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Missing;

/// Value is present on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Present<T>(pub T);

impl UserBuilder<Missing, Missing> {
    /// Create a new [`UserBuilder`].
    pub fn new() -> Self {
        Self {
            name: Missing,
            email: Missing,
            password: String::default(),
            created_by: None,
            terms_accepted: false,
        }
    }
}

impl Default for UserBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Email> UserBuilder<Missing, Email> {
    /// Update `name` field on [`UserBuilder`].
    pub fn name(self, name: impl Into<String>) -> UserBuilder<Present<String>, Email> {
        UserBuilder {
            name: Present(name.into().trim().to_owned()),
            email: self.email,
            password: self.password,
            created_by: self.created_by,
            terms_accepted: self.terms_accepted,
        }
    }
}

impl<Name> UserBuilder<Name, Missing> {
    /// Update `email` field on [`UserBuilder`].
    ///
    /// Emails are compared case-insensitively, so they are stored lowercase.
    pub fn email(self, email: impl AsRef<str>) -> UserBuilder<Name, Present<String>> {
        UserBuilder {
            name: self.name,
            email: Present(normalize_email(email.as_ref())),
            password: self.password,
            created_by: self.created_by,
            terms_accepted: self.terms_accepted,
        }
    }
}

impl<Name, Email> UserBuilder<Name, Email> {
    /// Update `password` field on [`UserBuilder`].
    pub fn password(mut self, password: impl ToString) -> Self {
        self.password = password.to_string();
        self
    }

    /// Update `created_by` field on [`UserBuilder`].
    pub fn created_by(mut self, creator: Option<i64>) -> Self {
        self.created_by = creator;
        self
    }

    /// Update `terms_accepted` field on [`UserBuilder`].
    pub fn terms_accepted(mut self, accepted: bool) -> Self {
        self.terms_accepted = accepted;
        self
    }
}

impl UserBuilder<Present<String>, Present<String>> {
    /// Derive credential material and build a [`NewUser`] created at `now`.
    ///
    /// New accounts get the common type, default locale and timezone. The
    /// plaintext password is dropped here.
    pub fn build(
        self,
        pwd: &PasswordManager,
        now: DateTime<Utc>,
    ) -> Result<NewUser, CryptoError> {
        let credential = pwd.derive(&self.password)?;

        Ok(NewUser {
            name: self.name.0,
            email: self.email.0,
            password_hash: credential.hash,
            salt: credential.salt,
            user_type: UserType::default(),
            created_by: self.created_by,
            locale: DEFAULT_LOCALE.to_owned(),
            timezone: DEFAULT_TIMEZONE.to_owned(),
            terms_accepted: self.terms_accepted,
            created_at: now,
        })
    }
}

/// Canonical form used for storage and uniqueness.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
