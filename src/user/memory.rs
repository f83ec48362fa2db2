//! In-memory [`UserRepository`] used by handler tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Result, ServerError};
use crate::user::{NewUser, User, UserRepository};

#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<Vec<User>>,
    /// Make `email_exists` always answer `false`, as a concurrent request
    /// would see it before the competing insert lands.
    stale_reads: AtomicBool,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stale_reads(&self, enabled: bool) {
        self.stale_reads.store(enabled, Ordering::SeqCst);
    }

    /// Every stored record, inactive included.
    pub fn all(&self) -> Vec<User> {
        self.users.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn email_exists(&self, email: &str) -> Result<bool> {
        if self.stale_reads.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self.users.lock().unwrap().iter().any(|u| u.email == email))
    }

    async fn insert(&self, user: &NewUser) -> Result<User> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(ServerError::EmailTaken);
        }

        let id = users.iter().map(|u| u.id).max().unwrap_or_default() + 1;
        let user = user.clone().into_user(id);
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id && u.active)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email && u.active)
            .cloned())
    }

    async fn confirm_email(&self, id: i64, at: DateTime<Utc>) -> Result<User> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id && u.active)
            .ok_or(ServerError::NotFound)?;

        user.email_verified = true;
        user.updated_at = at;
        Ok(user.clone())
    }

    async fn record_login(&self, id: i64, ip: Option<&str>, at: DateTime<Utc>) -> Result<User> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id && u.active)
            .ok_or(ServerError::NotFound)?;

        user.last_login = Some(at);
        user.last_login_ip = ip.map(str::to_owned);
        user.total_logins += 1;
        user.updated_at = at;
        Ok(user.clone())
    }

    async fn deactivate(
        &self,
        id: i64,
        reason: Option<&str>,
        by: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id && u.active)
            .ok_or(ServerError::NotFound)?;

        user.active = false;
        user.deactivation_reason = reason.map(str::to_owned);
        user.updated_by = by;
        user.updated_at = at;
        Ok(())
    }
}
