use std::iter::FromIterator;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;

use crate::endpoints::{rest_url, VERIFY_CREDENTIALS_PATH};
use crate::error::{ClientError, Result};
use crate::guest::GuestTokenManager;
use crate::request::{capture, classify};

pub use cookies::{CredentialSet, AUTH_TOKEN_COOKIE, CSRF_COOKIE};
pub use flow::FlowCredentials;
pub use store::SessionKey;

pub mod cookies;
pub mod flow;
pub mod store;

/// Identity fetched from the whoami endpoint after a successful login
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub id: String,
    pub screen_name: String,
}

/// Owns the authenticated identity: cookie-derived credentials, the CSRF
/// token, the cached user and (when credential login was used) the
/// material needed to re-run it
pub struct Session {
    client: Arc<Client>,
    bearer: String,
    guest: Arc<GuestTokenManager>,
    credentials: RwLock<CredentialSet>,
    user: RwLock<Option<SessionUser>>,
    stored_login: RwLock<Option<FlowCredentials>>,
    key: Option<SessionKey>,
}

impl Session {
    pub fn new(client: Arc<Client>, bearer: String, guest: Arc<GuestTokenManager>) -> Self {
        Self {
            client,
            bearer,
            guest,
            credentials: RwLock::new(CredentialSet::default()),
            user: RwLock::new(None),
            stored_login: RwLock::new(None),
            key: None,
        }
    }

    /// Configure a key for encrypting sensitive cookie fields at rest
    pub fn with_key(mut self, key: SessionKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Replace the credential set from a raw browser cookie header.
    /// Performs no validation; see [`Session::login_with_cookies`]
    pub fn set_cookies(&self, raw: &str) {
        *self.credentials.write() = CredentialSet::from_cookie_header(raw);
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.read().is_authenticated()
    }

    pub fn cookies(&self) -> CredentialSet {
        self.credentials.read().clone()
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.user.read().clone()
    }

    /// Import browser cookies and validate them against the whoami
    /// endpoint. Fails naming the missing cookie, and leaves the session
    /// unauthenticated when validation fails
    pub async fn login_with_cookies(&self, raw: &str) -> Result<SessionUser> {
        let parsed = CredentialSet::from_cookie_header(raw);
        if let Some(missing) = parsed.missing_field() {
            return Err(ClientError::Auth(format!(
                "cookie login requires the `{}` cookie",
                missing
            )));
        }
        *self.credentials.write() = parsed;
        match self.validate().await {
            Ok(user) => Ok(user),
            Err(error) => {
                *self.credentials.write() = CredentialSet::default();
                Err(error)
            }
        }
    }

    /// Drive the interactive multi-step login flow with username and
    /// password, keeping the inputs around for [`Session::refresh`]
    pub async fn login_with_credentials(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<SessionUser> {
        let credentials = FlowCredentials {
            username: username.to_owned(),
            password: password.to_owned(),
            email: email.map(|e| e.to_owned()),
        };
        let mut headers = self.guest.headers().await?;
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/json"),
        );
        let flow = flow::LoginFlow {
            client: self.client.as_ref(),
            headers,
            credentials: &credentials,
        };
        let jar = flow.run().await?;
        if let Some(missing) = jar.missing_field() {
            return Err(ClientError::Auth(format!(
                "login flow finished without issuing the `{}` cookie",
                missing
            )));
        }
        *self.credentials.write() = jar;
        *self.stored_login.write() = Some(credentials);
        self.validate().await
    }

    /// Re-establish an expired session. Only possible when credential
    /// login material was stored; cookie-imported sessions have to be
    /// re-imported by the caller
    pub async fn refresh(&self) -> Result<SessionUser> {
        let stored = self.stored_login.read().clone();
        match stored {
            Some(login) => {
                info!("refreshing session for {}", login.username);
                self.login_with_credentials(
                    &login.username,
                    &login.password,
                    login.email.as_deref(),
                )
                .await
            }
            None => Err(ClientError::Auth(
                "session was imported from cookies; re-import fresh cookies instead of refreshing"
                    .to_owned(),
            )),
        }
    }

    /// Hit the whoami endpoint with the current credentials and cache the
    /// resulting identity
    pub async fn validate(&self) -> Result<SessionUser> {
        let headers = self.auth_headers()?;
        let response = self
            .client
            .get(&rest_url(VERIFY_CREDENTIALS_PATH))
            .headers(headers)
            .send()
            .await?;
        let captured = capture(response).await?;
        if let Some(error) = classify(&captured) {
            *self.user.write() = None;
            return Err(error);
        }
        let body = captured.json()?;
        let id = body["id_str"].as_str().map(|id| id.to_owned());
        let screen_name = body["screen_name"].as_str().map(|name| name.to_owned());
        match (id, screen_name) {
            (Some(id), Some(screen_name)) => {
                let user = SessionUser { id, screen_name };
                *self.user.write() = Some(user.clone());
                Ok(user)
            }
            _ => {
                *self.user.write() = None;
                Err(ClientError::Auth(
                    "session validation returned no user identifier".to_owned(),
                ))
            }
        }
    }

    /// Persist the credential set as `{name, value, encrypted?}` records
    pub fn save_cookies(&self, path: &Path) -> Result<()> {
        store::save_cookies(path, &self.credentials.read(), self.key.as_ref())
    }

    /// Restore a persisted credential set and re-validate it. Any load or
    /// validation failure yields None and leaves the session untouched
    pub async fn load_cookies(&self, path: &Path) -> Option<SessionUser> {
        let loaded = store::load_cookies(path, self.key.as_ref())?;
        if !loaded.is_authenticated() {
            warn!("persisted session at {} is missing credentials", path.display());
            return None;
        }
        let previous = std::mem::replace(&mut *self.credentials.write(), loaded);
        match self.validate().await {
            Ok(user) => Some(user),
            Err(error) => {
                warn!("persisted session failed validation: {}", error);
                *self.credentials.write() = previous;
                None
            }
        }
    }

    /// Authenticated header set: bearer, full cookie header, CSRF token
    /// and the auth-type marker. Never mixes with guest headers
    pub fn auth_headers(&self) -> Result<HeaderMap> {
        let credentials = self.credentials.read();
        let csrf = credentials
            .csrf_token()
            .ok_or_else(|| ClientError::Auth("no csrf token in the session".to_owned()))?;
        if credentials.auth_token().is_none() {
            return Err(ClientError::Auth("no auth token in the session".to_owned()));
        }
        let mut headers = HeaderMap::from_iter([(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {}", self.bearer))
                .map_err(|_| ClientError::Auth("bearer token is not a valid header".to_owned()))?,
        )]);
        headers.insert(
            HeaderName::from_static("cookie"),
            HeaderValue::from_str(&credentials.to_cookie_header())
                .map_err(|_| ClientError::Auth("cookies are not a valid header".to_owned()))?,
        );
        headers.insert(
            HeaderName::from_static("x-csrf-token"),
            HeaderValue::from_str(csrf)
                .map_err(|_| ClientError::Auth("csrf token is not a valid header".to_owned()))?,
        );
        headers.insert(
            HeaderName::from_static("x-twitter-auth-type"),
            HeaderValue::from_static("OAuth2Session"),
        );
        headers.insert(
            HeaderName::from_static("x-twitter-active-user"),
            HeaderValue::from_static("yes"),
        );
        Ok(headers)
    }

    /// Headers for the requested mode: authenticated or guest. The two
    /// sets are disjoint
    pub async fn headers(&self, authenticated: bool) -> Result<HeaderMap> {
        if authenticated {
            self.auth_headers()
        } else {
            self.guest.headers().await
        }
    }
}
