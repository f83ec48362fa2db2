//! Handle database requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::database::{RetryPolicy, retry};
use crate::error::{Result, ServerError};
use crate::user::{NewUser, User};

/// Port for user persistence.
///
/// Default reads only see active records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Whether any record, active or not, already owns `email`.
    async fn email_exists(&self, email: &str) -> Result<bool>;

    /// Insert [`NewUser`] and return the stored record.
    ///
    /// A duplicate email fails with [`ServerError::EmailTaken`] even when
    /// the caller checked [`UserRepository::email_exists`] beforehand.
    async fn insert(&self, user: &NewUser) -> Result<User>;

    /// Find an active user using `id` field.
    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Find an active user using `email` field.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Mark the email of an active user as verified.
    async fn confirm_email(&self, id: i64, at: DateTime<Utc>) -> Result<User>;

    /// Bookkeeping after a successful authentication.
    async fn record_login(&self, id: i64, ip: Option<&str>, at: DateTime<Utc>) -> Result<User>;

    /// Soft-deactivate a user.
    async fn deactivate(
        &self,
        id: i64,
        reason: Option<&str>,
        by: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

const USER_COLUMNS: &str = r#"
    id, name, email, email_verified, password_hash, salt, user_type, active,
    deactivation_reason, banned_at, created_at, updated_at, created_by,
    updated_by, two_factor_enabled, two_factor_key, password_changed_at,
    password_expires_at, last_login, last_login_ip, total_logins, locale,
    timezone, terms_accepted, terms_accepted_at
"#;

#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool<Postgres>,
    retry: RetryPolicy,
}

impl PgUserRepository {
    /// Create a new [`PgUserRepository`].
    pub fn new(pool: Pool<Postgres>, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }
}

fn select_by(field: Field) -> String {
    format!("SELECT {USER_COLUMNS} FROM users WHERE {field} = $1 AND active")
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn email_exists(&self, email: &str) -> Result<bool> {
        let exists: bool = retry(self.retry, || {
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
        })
        .await?;

        Ok(exists)
    }

    async fn insert(&self, user: &NewUser) -> Result<User> {
        let query = format!(
            r#"INSERT INTO users (
                name, email, password_hash, salt, user_type, created_at,
                updated_at, created_by, updated_by, password_changed_at,
                locale, timezone, terms_accepted, terms_accepted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $7, $6, $8, $9, $10, $11)
            RETURNING {USER_COLUMNS}"#
        );

        let result = retry(self.retry, || {
            sqlx::query_as::<_, User>(&query)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.salt)
                .bind(user.user_type.as_str())
                .bind(user.created_at)
                .bind(user.created_by)
                .bind(&user.locale)
                .bind(&user.timezone)
                .bind(user.terms_accepted)
                .bind(user.terms_accepted.then_some(user.created_at))
                .fetch_one(&self.pool)
        })
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(ServerError::EmailTaken)
            },
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let query = select_by(Field::Id);

        Ok(retry(self.retry, || {
            sqlx::query_as::<_, User>(&query)
                .bind(id)
                .fetch_optional(&self.pool)
        })
        .await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = select_by(Field::Email);

        Ok(retry(self.retry, || {
            sqlx::query_as::<_, User>(&query)
                .bind(email)
                .fetch_optional(&self.pool)
        })
        .await?)
    }

    async fn confirm_email(&self, id: i64, at: DateTime<Utc>) -> Result<User> {
        let query = format!(
            r#"UPDATE users
                SET email_verified = TRUE, updated_at = $2
                WHERE id = $1 AND active
                RETURNING {USER_COLUMNS}"#
        );

        retry(self.retry, || {
            sqlx::query_as::<_, User>(&query)
                .bind(id)
                .bind(at)
                .fetch_optional(&self.pool)
        })
        .await?
        .ok_or(ServerError::NotFound)
    }

    async fn record_login(&self, id: i64, ip: Option<&str>, at: DateTime<Utc>) -> Result<User> {
        let query = format!(
            r#"UPDATE users
                SET last_login = $2, last_login_ip = $3,
                    total_logins = total_logins + 1, updated_at = $2
                WHERE id = $1 AND active
                RETURNING {USER_COLUMNS}"#
        );

        retry(self.retry, || {
            sqlx::query_as::<_, User>(&query)
                .bind(id)
                .bind(at)
                .bind(ip)
                .fetch_optional(&self.pool)
        })
        .await?
        .ok_or(ServerError::NotFound)
    }

    async fn deactivate(
        &self,
        id: i64,
        reason: Option<&str>,
        by: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = retry(self.retry, || {
            sqlx::query(
                r#"UPDATE users
                    SET active = FALSE, deactivation_reason = $2,
                        updated_by = $3, updated_at = $4
                    WHERE id = $1 AND active"#,
            )
            .bind(id)
            .bind(reason)
            .bind(by)
            .bind(at)
            .execute(&self.pool)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Id,
    Email,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Field::Id => write!(f, "id"),
            Field::Email => write!(f, "email"),
        }
    }
}
