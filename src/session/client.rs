//! reqwest-backed [`HttpSession`] holding the archive.org login cookies.
//!
//! One `ArchiveSession` is created per run and shared by the loan manager,
//! the extractor and every page worker. reqwest's `Client` pools connections
//! internally and its cookie `Jar` is guarded by a lock, so concurrent use from
//! many Tokio tasks is safe without extra synchronization.

use std::panic::{AssertUnwindSafe, catch_unwind, set_hook, take_hook};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::SessionError;
use super::{HttpResponse, HttpSession};
use crate::user_agent::BROWSER_USER_AGENT;

/// Connect/read timeouts applied to every request of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// TCP/TLS connect timeout in seconds.
    pub connect_secs: u64,
    /// Whole-request timeout in seconds.
    pub read_secs: u64,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: CONNECT_TIMEOUT_SECS,
            read_secs: READ_TIMEOUT_SECS,
        }
    }
}

/// Authenticated HTTP context for one run.
#[derive(Debug, Clone)]
pub struct ArchiveSession {
    client: Client,
}

impl ArchiveSession {
    /// Creates a session with an empty cookie jar.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ClientBuild`] if the HTTP client cannot be built.
    #[instrument(level = "debug")]
    pub fn new(timeouts: SessionTimeouts) -> Result<Self, SessionError> {
        let client = build_client(Arc::new(Jar::default()), timeouts)?;
        Ok(Self { client })
    }

    async fn finish(
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<HttpResponse, SessionError> {
        let response = request
            .send()
            .await
            .map_err(|e| SessionError::from_reqwest(url, e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| SessionError::from_reqwest(url, e))?
            .to_vec();
        debug!(url = %url, status, bytes = body.len(), "response received");
        Ok(HttpResponse::new(status, body))
    }
}

#[async_trait]
impl HttpSession for ArchiveSession {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, SessionError> {
        Url::parse(url).map_err(|_| SessionError::invalid_url(url))?;
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        Self::finish(url, request).await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, SessionError> {
        Url::parse(url).map_err(|_| SessionError::invalid_url(url))?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form.iter().copied())
            .finish();
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body);
        Self::finish(url, request).await
    }
}

fn build_client(cookie_jar: Arc<Jar>, timeouts: SessionTimeouts) -> Result<Client, SessionError> {
    match try_build_client(Arc::clone(&cookie_jar), timeouts, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            warn!(
                "HTTP client builder panicked while loading system proxy settings; retrying with env-proxy fallback"
            );
            match try_build_client(cookie_jar, timeouts, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Build(error)) => Err(SessionError::ClientBuild {
                    reason: error.to_string(),
                }),
                Err(BuildClientFailure::Panic) => Err(SessionError::ClientBuild {
                    reason: "client builder panicked while applying env-proxy fallback"
                        .to_string(),
                }),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(SessionError::ClientBuild {
            reason: error.to_string(),
        }),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

// `catch_unwind` does not suppress panic-hook stderr output, so the hook is
// silenced while a guarded build runs.
static CLIENT_BUILD_PANIC_HOOK_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn try_build_client(
    cookie_jar: Arc<Jar>,
    timeouts: SessionTimeouts,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind_silent(AssertUnwindSafe(move || {
        let mut builder = base_client_builder(cookie_jar, timeouts);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn catch_unwind_silent<F, T>(operation: F) -> Result<T, Box<dyn std::any::Any + Send + 'static>>
where
    F: FnOnce() -> T + std::panic::UnwindSafe,
{
    let _panic_hook_guard = CLIENT_BUILD_PANIC_HOOK_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let previous_hook = take_hook();
    set_hook(Box::new(|_| {}));
    let outcome = catch_unwind(operation);
    set_hook(previous_hook);
    outcome
}

fn base_client_builder(cookie_jar: Arc<Jar>, timeouts: SessionTimeouts) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .timeout(Duration::from_secs(timeouts.read_secs))
        .gzip(true)
        .user_agent(BROWSER_USER_AGENT)
        .cookie_provider(cookie_jar)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
