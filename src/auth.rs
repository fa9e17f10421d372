use log::{info, warn};

use crate::api::client::ApiClient;
use crate::api::models::{AuthResponse, Session};
use crate::error::ChatError;
use crate::storage::SessionStorage;

/// Login, registration and silent restore, keeping persisted state in step.
pub struct Authenticator {
    api: ApiClient,
    storage: SessionStorage,
}

impl Authenticator {
    pub fn new(api: ApiClient, storage: SessionStorage) -> Self {
        Self { api, storage }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ChatError> {
        let auth = self.api.login(email, password).await?;
        self.remember(auth)
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<Session, ChatError> {
        let auth = self.api.register(username, email, password).await?;
        self.remember(auth)
    }

    /// Bring back the previous session if its token is still accepted. A rejected
    /// or unverifiable token is forgotten and `None` returned.
    pub async fn restore(&self) -> Result<Option<Session>, ChatError> {
        let Some(token) = self.storage.token()? else {
            return Ok(None);
        };
        let api = self.api.clone().with_token(token.clone());
        match api.current_user().await {
            Ok(user) => {
                self.storage.save_user(&user)?;
                info!("restored session for {}", user.username);
                Ok(Some(Session { user, token }))
            }
            Err(e) => {
                warn!("stored session rejected: {}", e);
                self.storage.clear()?;
                Ok(None)
            }
        }
    }

    pub fn logout(&self) -> Result<(), ChatError> {
        self.storage.clear()
    }

    /// REST client authorized for `session`.
    pub fn client_for(&self, session: &Session) -> ApiClient {
        self.api.clone().with_token(session.token.clone())
    }

    fn remember(&self, auth: AuthResponse) -> Result<Session, ChatError> {
        let session = Session { user: auth.user, token: auth.token };
        self.storage.save_session(&session)?;
        info!("logged in as {}", session.user.username);
        Ok(session)
    }
}
