use crate::config::WebConfig;
use crate::errors::AuthError;
use crate::metrics::{LOGIN_ATTEMPTS_TOTAL, LOGIN_FAILURES_TOTAL};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use tracing::{debug, info, warn};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/100.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// An authenticated portal session. The cookie jar lives inside the client,
/// so a new login always yields a new `Session` instead of mutating this one.
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    established_at: DateTime<Utc>,
}

impl Session {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            established_at: Utc::now(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self) -> Result<Session, AuthError>;
}

pub struct SessionManager {
    web: WebConfig,
}

impl SessionManager {
    pub fn new(web: WebConfig) -> Self {
        Self { web }
    }

    fn build_client(&self) -> Result<Client, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));

        Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(self.web.timeout)
            .build()
    }

    async fn attempt_login(&self) -> Result<Session, AuthError> {
        let client = self.build_client()?;
        let form = [
            ("username", self.web.username.as_str()),
            ("password", self.web.password.as_str()),
        ];
        let response = client
            .post(self.web.login_url.clone())
            .form(&form)
            .send()
            .await?
            .error_for_status()?;

        let landed_on = response.url().to_string();
        debug!("Login POST complete, status {}", response.status());
        info!("Login landed on {}", landed_on);

        if !is_authenticated_landing(&landed_on, &self.web.home_marker) {
            return Err(AuthError::Rejected { landed_on });
        }
        Ok(Session::new(client))
    }
}

/// A login counts only when the landing URL, after redirects, contains the
/// authenticated-home marker.
pub fn is_authenticated_landing(landed_on: &str, home_marker: &str) -> bool {
    landed_on.contains(home_marker)
}

#[async_trait]
impl Authenticator for SessionManager {
    async fn login(&self) -> Result<Session, AuthError> {
        LOGIN_ATTEMPTS_TOTAL.inc();
        info!("Attempting to log in as {}", self.web.username);

        let result = self.attempt_login().await;
        match &result {
            Ok(_) => info!("Login successful"),
            Err(e) => {
                LOGIN_FAILURES_TOTAL.inc();
                warn!("Login failed: {}", e);
            }
        }
        result
    }
}
