use std::sync::Arc;

use chrono::Utc;
use url::Url;

use crate::config::Identity;
use crate::crypto::{CryptoError, PasswordManager};
use crate::error::{Result, ServerError};
use crate::mail::{EmailSender, Template};
use crate::token::TokenManager;
use crate::user::{User, UserBuilder, UserRepository, normalize_email};

/// Validated registration request.
#[derive(Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub terms_accepted: bool,
    pub created_by: Option<i64>,
}

/// User manager.
#[derive(Clone)]
pub struct UserService {
    pub repo: Arc<dyn UserRepository>,
    pub pwd: Arc<PasswordManager>,
    pub mail: Arc<dyn EmailSender>,
    pub tokens: TokenManager,
    /// Refuse to authenticate accounts with unverified email.
    pub require_confirmed_account: bool,
    confirmation_url: String,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(
        repo: Arc<dyn UserRepository>,
        pwd: Arc<PasswordManager>,
        mail: Arc<dyn EmailSender>,
        tokens: TokenManager,
        identity: &Identity,
    ) -> Self {
        Self {
            repo,
            pwd,
            mail,
            tokens,
            require_confirmed_account: identity.require_confirmed_account,
            confirmation_url: identity.confirmation_url.clone(),
        }
    }

    /// Link carrying a fresh confirmation token for `user`.
    fn confirmation_link(&self, user: &User) -> Result<String> {
        let token = self.tokens.create_confirmation(&user.id.to_string())?;
        let mut url = Url::parse(&self.confirmation_url).map_err(|err| ServerError::Internal {
            details: "confirmation url cannot be parsed".into(),
            source: Some(Box::new(err)),
        })?;
        url.query_pairs_mut().append_pair("token", &token);

        Ok(url.into())
    }

    async fn send_confirmation(&self, user: &User) -> Result<()> {
        let link = self.confirmation_link(user)?;

        self.mail
            .send(Template::AccountConfirmation { link }, user)
            .await
            .map_err(|err| ServerError::Internal {
                details: "confirmation email not sent".into(),
                source: Some(Box::new(err)),
            })
    }

    /// Create a user from a validated request.
    ///
    /// The existence check only avoids a useless hash; the store unique
    /// index decides.
    pub async fn register(&self, request: Registration) -> Result<User> {
        let email = normalize_email(&request.email);

        if self.repo.email_exists(&email).await? {
            return Err(ServerError::EmailTaken);
        }

        let new_user = UserBuilder::new()
            .name(request.name)
            .email(email)
            .password(request.password)
            .terms_accepted(request.terms_accepted)
            .created_by(request.created_by)
            .build(&self.pwd, Utc::now())?;

        let user = self.repo.insert(&new_user).await?;

        if self.require_confirmed_account {
            if let Err(err) = self.send_confirmation(&user).await {
                tracing::error!(user_id = user.id, error = %err, "confirmation email not sent");
            }
        }

        Ok(user)
    }

    /// Verify the email of the user a confirmation token was issued for.
    ///
    /// Expired, forged or session tokens all answer
    /// [`ServerError::InvalidConfirmation`], as do deactivated accounts.
    pub async fn confirm_email(&self, token: &str) -> Result<User> {
        let claims = self.tokens.decode_confirmation(token).map_err(|err| {
            tracing::debug!(error = %err, "confirmation token rejected");
            ServerError::InvalidConfirmation
        })?;
        let id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| ServerError::InvalidConfirmation)?;

        match self.repo.confirm_email(id, Utc::now()).await {
            Ok(user) => {
                tracing::info!(user_id = user.id, "email confirmed");
                Ok(user)
            },
            Err(ServerError::NotFound) => Err(ServerError::InvalidConfirmation),
            Err(err) => Err(err),
        }
    }

    /// Check credentials and record the login.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        ip: Option<&str>,
    ) -> Result<User> {
        let Some(user) = self.repo.find_by_email(&normalize_email(email)).await? else {
            return Err(ServerError::InvalidCredentials);
        };

        match self.pwd.verify_password(password, &user.password_hash) {
            Ok(()) => {},
            Err(CryptoError::Mismatch) => return Err(ServerError::InvalidCredentials),
            Err(err) => return Err(err.into()),
        }

        if self.require_confirmed_account && !user.email_verified {
            return Err(ServerError::Unconfirmed);
        }

        self.repo.record_login(user.id, ip, Utc::now()).await
    }

    /// Find an active user.
    pub async fn find_by_id(&self, id: i64) -> Result<User> {
        self.repo.find_by_id(id).await?.ok_or(ServerError::NotFound)
    }

    /// Soft-deactivate `user` on behalf of `by`.
    pub async fn deactivate(&self, user: &User, reason: Option<&str>, by: i64) -> Result<()> {
        self.repo
            .deactivate(user.id, reason, Some(by), Utc::now())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Token as TokenConfig;
    use crate::crypto::light_config;
    use crate::mail::tests::RecordingEmailSender;
    use crate::user::memory::MemoryUserRepository;
    use crate::user::UserType;

    const CONFIRMATION_URL: &str = "https://nameflare.dev/confirm";

    struct Fixture {
        repo: Arc<MemoryUserRepository>,
        mail: Arc<RecordingEmailSender>,
        service: UserService,
    }

    fn tokens(secret: &str) -> TokenManager {
        TokenManager::new(&TokenConfig {
            secret: secret.into(),
            issuer: "https://account.nameflare.dev".into(),
            audience: "nameflare".into(),
            ..Default::default()
        })
    }

    fn service(
        repo: Arc<MemoryUserRepository>,
        mail: Arc<RecordingEmailSender>,
        require_confirmed_account: bool,
    ) -> UserService {
        let pwd = Arc::new(PasswordManager::new(Some(light_config())).unwrap());
        let identity = Identity {
            require_confirmed_account,
            confirmation_url: CONFIRMATION_URL.into(),
            ..Default::default()
        };

        UserService::new(repo, pwd, mail, tokens("service-secret"), &identity)
    }

    fn fixture(require_confirmed_account: bool) -> Fixture {
        let repo = Arc::new(MemoryUserRepository::new());
        let mail = Arc::new(RecordingEmailSender::default());
        let service = service(repo.clone(), mail.clone(), require_confirmed_account);

        Fixture { repo, mail, service }
    }

    /// Token carried by the last confirmation link sent.
    fn sent_token(mail: &RecordingEmailSender) -> String {
        let sent = mail.sent.lock().unwrap();
        let Some((Template::AccountConfirmation { link }, _)) = sent.last() else {
            panic!("no confirmation email sent");
        };
        let parsed = Url::parse(link).unwrap();
        assert_eq!(&parsed[..url::Position::AfterPath], CONFIRMATION_URL);

        parsed
            .query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
            .unwrap()
    }

    fn registration(email: &str) -> Registration {
        Registration {
            name: "Ana Silva".into(),
            email: email.into(),
            password: "hunter22".into(),
            terms_accepted: true,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn test_register_creates_one_record() {
        let f = fixture(true);
        let user = f.service.register(registration("Ana@NameFlare.dev")).await.unwrap();

        assert_eq!(f.repo.len(), 1);
        assert_eq!(user.id, 1);
        assert_eq!(user.email, "ana@nameflare.dev");
        assert_ne!(user.password_hash, "hunter22");
        assert!(!user.salt.is_empty());
        assert!(user.active);
        assert_eq!(user.user_type, UserType::Common);
        assert_eq!(user.locale, "pt-BR");
        assert_eq!(user.created_at, user.updated_at);

        let sent = f.mail.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "ana@nameflare.dev");
    }

    #[tokio::test]
    async fn test_no_email_when_confirmation_not_required() {
        let f = fixture(false);
        f.service.register(registration("ana@nameflare.dev")).await.unwrap();

        assert!(f.mail.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_duplicate_email_case_insensitive() {
        let f = fixture(false);
        f.service.register(registration("ana@nameflare.dev")).await.unwrap();

        let err = f
            .service
            .register(registration("ANA@nameflare.dev"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::EmailTaken));
        assert_eq!(f.repo.len(), 1);
    }

    #[tokio::test]
    async fn test_store_constraint_resolves_race() {
        let f = fixture(false);
        f.service.register(registration("race@nameflare.dev")).await.unwrap();
        f.repo.stale_reads(true);

        let err = f
            .service
            .register(registration("race@nameflare.dev"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::EmailTaken));
        assert_eq!(f.repo.len(), 1);
    }

    #[tokio::test]
    async fn test_mail_failure_does_not_fail_registration() {
        let repo = Arc::new(MemoryUserRepository::new());
        let mail = Arc::new(RecordingEmailSender {
            fail: true,
            ..Default::default()
        });
        let service = service(repo.clone(), mail, true);

        assert!(service.register(registration("mail@nameflare.dev")).await.is_ok());
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_authenticate_records_login() {
        let f = fixture(false);
        f.service.register(registration("ana@nameflare.dev")).await.unwrap();

        let user = f
            .service
            .authenticate("ana@nameflare.dev", "hunter22", Some("198.51.100.4"))
            .await
            .unwrap();
        assert_eq!(user.total_logins, 1);
        assert_eq!(user.last_login_ip.as_deref(), Some("198.51.100.4"));
        assert!(user.last_login.is_some());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_bad_credentials() {
        let f = fixture(false);
        f.service.register(registration("ana@nameflare.dev")).await.unwrap();

        assert!(matches!(
            f.service.authenticate("ana@nameflare.dev", "wrong", None).await,
            Err(ServerError::InvalidCredentials)
        ));
        assert!(matches!(
            f.service.authenticate("nobody@nameflare.dev", "hunter22", None).await,
            Err(ServerError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_authenticate_requires_confirmation() {
        let f = fixture(true);
        let user = f.service.register(registration("ana@nameflare.dev")).await.unwrap();

        assert!(matches!(
            f.service.authenticate("ana@nameflare.dev", "hunter22", None).await,
            Err(ServerError::Unconfirmed)
        ));

        let confirmed = f.service.confirm_email(&sent_token(&f.mail)).await.unwrap();
        assert_eq!(confirmed.id, user.id);
        assert!(confirmed.email_verified);
        assert!(f.repo.all()[0].email_verified);
        assert!(f.service.authenticate("ana@nameflare.dev", "hunter22", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_confirm_email_rejects_other_tokens() {
        let f = fixture(true);
        let user = f.service.register(registration("ana@nameflare.dev")).await.unwrap();
        let id = user.id.to_string();

        let session = f.service.tokens.create(&id).unwrap();
        let foreign = tokens("another-secret").create_confirmation(&id).unwrap();
        let expired = f.service.tokens.create_confirmation_at(&id, 1).unwrap();

        for token in [session.as_str(), foreign.as_str(), expired.as_str(), "garbage"] {
            assert!(matches!(
                f.service.confirm_email(token).await,
                Err(ServerError::InvalidConfirmation)
            ));
        }
        assert!(!f.repo.all()[0].email_verified);
    }

    #[tokio::test]
    async fn test_confirm_email_of_deactivated_user() {
        let f = fixture(true);
        let user = f.service.register(registration("ana@nameflare.dev")).await.unwrap();
        let token = sent_token(&f.mail);

        f.service.deactivate(&user, None, user.id).await.unwrap();

        assert!(matches!(
            f.service.confirm_email(&token).await,
            Err(ServerError::InvalidConfirmation)
        ));
    }

    #[tokio::test]
    async fn test_deactivated_user_is_hidden() {
        let f = fixture(false);
        let user = f.service.register(registration("ana@nameflare.dev")).await.unwrap();

        f.service.deactivate(&user, Some("requested"), user.id).await.unwrap();

        assert!(matches!(
            f.service.find_by_id(user.id).await,
            Err(ServerError::NotFound)
        ));
        let stored = &f.repo.all()[0];
        assert!(!stored.active);
        assert_eq!(stored.deactivation_reason.as_deref(), Some("requested"));
        assert_eq!(stored.updated_by, Some(user.id));
        assert!(matches!(
            f.service.authenticate("ana@nameflare.dev", "hunter22", None).await,
            Err(ServerError::InvalidCredentials)
        ));
    }
}
