//! Authenticated, rate-limited HTTP session against the FamilySearch Tree
//! API: the OAuth-like cookie handshake, a token-bucket rate limiter, and
//! response classification with retry/backoff.

mod credentials;
mod rate_limiter;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use fstree_error::{Error, Result};
use parking_lot::RwLock;
use reqwest::cookie::Jar;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, info, warn};

pub use credentials::{resolve_password, store_password};
pub use rate_limiter::RateLimiter;

/// The real FamilySearch Tree API host. Production callers leave
/// [`SessionConfig::base_url`] at this value; tests point it at a
/// `wiremock` server instead so `get`'s retry/classification logic runs
/// against a controlled fixture.
pub const DEFAULT_BASE_URL: &str = "https://www.familysearch.org";
const LOGIN_URL: &str = "https://www.familysearch.org/auth/familysearch/login";
const AUTHORIZATION_URL: &str = "https://ident.familysearch.org/cis-web/oauth2/v3/authorization";
const CURRENT_USER_PATH: &str = "/platform/users/current.json";

/// User identity recorded after a successful login.
#[derive(Debug, Clone, Default)]
pub struct LoginInfo {
    pub person_id: Option<String>,
    pub language: Option<String>,
    pub display_name: Option<String>,
}

/// Configuration for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub requests_per_second: f64,
    pub max_retries: u32,
    pub backoff_base_seconds: f64,
    pub backoff_multiplier: f64,
    pub backoff_max_seconds: f64,
    /// Host that `get` resolves paths against. Defaults to
    /// [`DEFAULT_BASE_URL`]; overridable so tests can run the GET loop
    /// against a mock server without touching the real API.
    pub base_url: String,
}

/// An authenticated HTTP session. Cheap to clone: the cookie jar, rate
/// limiter, and counters are all shared via `Arc`.
#[derive(Clone)]
pub struct Session {
    client: Client,
    cookie_jar: Arc<Jar>,
    config: Arc<SessionConfig>,
    rate_limiter: Arc<RateLimiter>,
    counter: Arc<AtomicU64>,
    info: Arc<RwLock<LoginInfo>>,
}

impl Session {
    /// Builds a session and performs the initial login handshake.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let cookie_jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(cookie_jar.clone())
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(Error::from)?;
        let session = Self {
            client,
            cookie_jar,
            config: Arc::new(config),
            rate_limiter: Arc::new(RateLimiter::new(0.0)),
            counter: Arc::new(AtomicU64::new(0)),
            info: Arc::new(RwLock::new(LoginInfo::default())),
        };
        let rate = session.config.requests_per_second;
        let session = Self {
            rate_limiter: Arc::new(RateLimiter::new(rate)),
            ..session
        };
        session.login().await?;
        Ok(session)
    }

    /// Builds a session without performing the login handshake, so the
    /// `get` retry/classification loop can be exercised against a mock
    /// server in tests that have no interest in the cookie dance.
    pub fn connect_without_login(config: SessionConfig) -> Result<Self> {
        let cookie_jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(cookie_jar.clone())
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(Error::from)?;
        let rate = config.requests_per_second;
        Ok(Self {
            client,
            cookie_jar,
            config: Arc::new(config),
            rate_limiter: Arc::new(RateLimiter::new(rate)),
            counter: Arc::new(AtomicU64::new(0)),
            info: Arc::new(RwLock::new(LoginInfo::default())),
        })
    }

    /// Total number of wire-level GET attempts issued so far (including
    /// retries), used by tests to verify backoff behavior.
    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn login_info(&self) -> LoginInfo {
        self.info.read().clone()
    }

    /// Performs the FamilySearch cookie-based login handshake. Bounded by
    /// `max_retries`: the original crawler loops unboundedly on a
    /// malformed handshake response, but an unbounded retry loop in a
    /// long-running service is its own outage, so fstree caps it.
    pub async fn login(&self) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            match self.try_login().await {
                Ok(()) => {
                    self.refresh_current_user().await?;
                    return Ok(());
                }
                Err(err) if attempt < self.config.max_retries => {
                    warn!(attempt, error = %err, "login handshake failed, retrying");
                    attempt += 1;
                    self.backoff_sleep(attempt).await;
                }
                Err(err) => return Err(Error::auth(format!("login failed: {err}"))),
            }
        }
    }

    async fn try_login(&self) -> Result<()> {
        let step1 = self
            .client
            .get(LOGIN_URL)
            .query(&[("ldsauth", "false")])
            .send()
            .await?;
        let redirect_url = location_header(&step1)?;

        let step2 = self.client.get(&redirect_url).send().await?;
        let body = step2.text().await?;
        let params = scrape_hidden_params(&body)?;

        let step3 = self
            .client
            .post(AUTHORIZATION_URL)
            .form(&[
                ("params", params.as_str()),
                ("userName", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .send()
            .await?;
        let final_redirect_header = step3
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|h| h.to_str().ok())
            .map(str::to_owned);
        let step3_body = step3.text().await.unwrap_or_default();
        if step3_body.contains("The username or password was incorrect") {
            return Err(Error::auth("the username or password was incorrect"));
        }
        if step3_body.contains("Invalid Oauth2 Request") {
            return Err(Error::transport_transient("invalid oauth2 request"));
        }
        let final_redirect = final_redirect_header
            .ok_or_else(|| Error::auth("expected a redirect Location header during login"))?;

        let step4 = self.client.get(&final_redirect).send().await?;
        let session_id = step4
            .cookies()
            .find(|c| c.name() == "fssessionid")
            .map(|c| c.value().to_string())
            .ok_or_else(|| Error::auth("login response carried no fssessionid cookie"))?;

        let base_url: Url = self
            .config
            .base_url
            .parse()
            .map_err(|err| Error::auth(format!("invalid base_url {:?}: {err}", self.config.base_url)))?;
        self.cookie_jar
            .add_cookie_str(&format!("fssessionid={session_id}; Path=/"), &base_url);
        info!("FamilySearch session established");
        Ok(())
    }

    async fn refresh_current_user(&self) -> Result<()> {
        if let Some(data) = self.get(CURRENT_USER_PATH).await? {
            let user = data.get("users").and_then(|u| u.get(0));
            let mut info = self.info.write();
            info.person_id = user
                .and_then(|u| u.get("personId"))
                .and_then(Value::as_str)
                .map(str::to_owned);
            info.language = user
                .and_then(|u| u.get("preferredLanguage"))
                .and_then(Value::as_str)
                .map(str::to_owned);
            info.display_name = user
                .and_then(|u| u.get("displayName"))
                .and_then(Value::as_str)
                .map(str::to_owned);
        }
        Ok(())
    }

    /// Issues an authenticated GET for `path` (joined onto the base URL).
    ///
    /// Returns `Ok(None)` for the 204/404/405/410 "absent" cases, `Ok(Some(_))`
    /// for a decoded JSON body, and `Err` once the retry budget for
    /// throttling, transient server errors, or repeated re-login is
    /// exhausted.
    pub async fn get(&self, path: &str) -> Result<Option<Value>> {
        let url = format!("{}{path}", self.config.base_url);
        let mut attempt = 0u32;
        let mut relogin_attempts = 0u32;
        loop {
            self.rate_limiter.acquire().await;
            self.counter.fetch_add(1, Ordering::SeqCst);
            debug!(url = %url, attempt, "issuing GET");

            let response = match self.client.get(&url).send().await {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt >= self.config.max_retries {
                        return Err(Error::transport_transient(err.to_string()));
                    }
                    attempt += 1;
                    self.backoff_sleep(attempt).await;
                    continue;
                }
            };

            match response.status().as_u16() {
                204 => return Ok(None),
                404 | 405 | 410 => return Ok(None),
                401 => {
                    if relogin_attempts >= self.config.max_retries {
                        return Err(Error::auth("exhausted re-login attempts after repeated 401"));
                    }
                    relogin_attempts += 1;
                    Box::pin(self.login()).await?;
                    continue;
                }
                429 => {
                    if attempt >= self.config.max_retries {
                        return Err(Error::transport_transient("429 after exhausting retries"));
                    }
                    attempt += 1;
                    self.backoff_sleep(attempt).await;
                    continue;
                }
                status if status >= 500 => {
                    if attempt >= self.config.max_retries {
                        return Err(Error::transport_transient(format!(
                            "{status} after exhausting retries"
                        )));
                    }
                    attempt += 1;
                    self.backoff_sleep(attempt).await;
                    continue;
                }
                status if (200..300).contains(&status) => {
                    return match response.json::<Value>().await {
                        Ok(body) => Ok(Some(body)),
                        Err(err) => Err(Error::transport_permanent(format!(
                            "corrupted JSON from {url}: {err}"
                        ))),
                    };
                }
                status => {
                    warn!(status, url = %url, "unexpected response status");
                    return Ok(None);
                }
            }
        }
    }

    async fn backoff_sleep(&self, attempt: u32) {
        let delay = (self.config.backoff_base_seconds
            * self.config.backoff_multiplier.powi(attempt as i32 - 1))
        .min(self.config.backoff_max_seconds);
        tokio::time::sleep(Duration::from_secs_f64(delay.max(0.0))).await;
    }
}

fn location_header(response: &reqwest::Response) -> Result<String> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| Error::auth("expected a redirect Location header during login"))
}

fn scrape_hidden_params(body: &str) -> Result<String> {
    let marker = "name=\"params\" value=\"";
    let idx = body
        .find(marker)
        .ok_or_else(|| Error::auth("login page did not contain a hidden params field"))?;
    let rest = &body[idx + marker.len()..];
    let end = rest
        .find('"')
        .ok_or_else(|| Error::auth("unterminated params field on login page"))?;
    Ok(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrapes_hidden_params_field() {
        let body = r#"<input type="hidden" name="params" value="abc123" />"#;
        assert_eq!(scrape_hidden_params(body).unwrap(), "abc123");
    }

    #[test]
    fn missing_params_field_is_an_auth_error() {
        assert!(scrape_hidden_params("<html></html>").is_err());
    }
}
