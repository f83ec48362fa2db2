mod builder;
#[cfg(test)]
pub(crate) mod memory;
mod repository;
mod service;

pub use builder::*;
pub use repository::*;
pub use service::*;

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOCALE: &str = "pt-BR";
pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

/// Account tier, persisted as lowercase text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    Common,
    Vip,
    Admin,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Common => "common",
            UserType::Vip => "vip",
            UserType::Admin => "admin",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown user type `{0}`")]
pub struct UnknownUserType(String);

impl TryFrom<String> for UserType {
    type Error = UnknownUserType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "common" => Ok(UserType::Common),
            "vip" => Ok(UserType::Vip),
            "admin" => Ok(UserType::Admin),
            _ => Err(UnknownUserType(value)),
        }
    }
}

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub salt: String,
    #[sqlx(try_from = "String")]
    pub user_type: UserType,
    pub active: bool,
    pub deactivation_reason: Option<String>,
    pub banned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Weak reference to the creator record.
    pub created_by: Option<i64>,
    /// Weak reference to the last updater record.
    pub updated_by: Option<i64>,
    pub two_factor_enabled: bool,
    #[serde(skip)]
    pub two_factor_key: Option<String>,
    pub password_changed_at: DateTime<Utc>,
    pub password_expires_at: Option<NaiveDate>,
    pub last_login: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub last_login_ip: Option<String>,
    pub total_logins: i32,
    pub locale: String,
    pub timezone: String,
    pub terms_accepted: bool,
    pub terms_accepted_at: Option<DateTime<Utc>>,
}

/// Record ready to be inserted; identifier is assigned by the store.
#[derive(Clone, Debug, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    pub user_type: UserType,
    pub created_by: Option<i64>,
    pub locale: String,
    pub timezone: String,
    pub terms_accepted: bool,
    pub created_at: DateTime<Utc>,
}

impl NewUser {
    /// Materialize the record the store would return for `id`.
    pub fn into_user(self, id: i64) -> User {
        User {
            id,
            name: self.name,
            email: self.email,
            email_verified: false,
            password_hash: self.password_hash,
            salt: self.salt,
            user_type: self.user_type,
            active: true,
            deactivation_reason: None,
            banned_at: None,
            created_at: self.created_at,
            updated_at: self.created_at,
            created_by: self.created_by,
            updated_by: self.created_by,
            two_factor_enabled: false,
            two_factor_key: None,
            password_changed_at: self.created_at,
            password_expires_at: None,
            last_login: None,
            last_login_ip: None,
            total_logins: 0,
            locale: self.locale,
            timezone: self.timezone,
            terms_accepted: self.terms_accepted,
            terms_accepted_at: self.terms_accepted.then_some(self.created_at),
        }
    }
}
