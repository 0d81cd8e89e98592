use crate::config::FetchConfig;
use crate::error::NavigationError;
use crate::navigator::{Navigator, PageSnapshot};
use crate::pagination::Control;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_USER_AGENT: &str = concat!("rtender/", env!("CARGO_PKG_VERSION"));

/// Navigator over plain HTTP. Pagination controls are followed through their
/// href, so script-only pagers cannot be activated.
pub struct HttpNavigator {
    client: Client,
    current: Url,
    cached: Option<PageSnapshot>,
    retry_attempts: u8,
    retry_backoff: Duration,
    settle_delay: Duration,
}

impl HttpNavigator {
    pub fn new(config: &FetchConfig, start_url: Url) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (k, v) in &config.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .with_context(|| format!("invalid header name {k}"))?;
            let value =
                HeaderValue::from_str(v).with_context(|| format!("invalid header value for {k}"))?;
            headers.insert(name, value);
        }

        let user_agent = config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            current: start_url,
            cached: None,
            retry_attempts: config.retry_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        })
    }

    /// The snapshot is addressed by where the response came from, after
    /// redirects, so relative links resolve correctly.
    fn fetch(&self, url: &Url) -> Result<PageSnapshot, NavigationError> {
        let (final_url, markup) =
            fetch_with_retries(&self.client, url, self.retry_attempts, self.retry_backoff)?;
        if final_url != *url {
            debug!(requested = %url, url = %final_url, "request was redirected");
        }
        info!(url = %final_url, bytes = markup.len(), "fetched document");
        Ok(PageSnapshot {
            url: final_url,
            markup,
        })
    }
}

impl Navigator for HttpNavigator {
    fn snapshot(&mut self) -> Result<PageSnapshot, NavigationError> {
        if let Some(snapshot) = &self.cached {
            return Ok(snapshot.clone());
        }
        let snapshot = self.fetch(&self.current)?;
        self.cached = Some(snapshot.clone());
        Ok(snapshot)
    }

    fn activate(&mut self, control: &Control) -> Result<(), NavigationError> {
        let Some(target) = control.href.clone() else {
            return Err(NavigationError::NotFollowable {
                label: control.label.clone(),
                css_path: control.css_path.clone(),
            });
        };
        debug!(convention = ?control.convention, url = %target, "following control");
        let snapshot = self.fetch(&target)?;
        self.current = snapshot.url.clone();
        self.cached = Some(snapshot);
        Ok(())
    }

    fn wait_until_settled(&mut self) -> Result<(), NavigationError> {
        std::thread::sleep(self.settle_delay);
        Ok(())
    }

    fn open_document(&mut self, url: &Url) -> Result<PageSnapshot, NavigationError> {
        self.fetch(url)
    }
}

pub fn fetch_with_retries(
    client: &Client,
    url: &Url,
    retry_attempts: u8,
    retry_backoff: Duration,
) -> Result<(Url, String), NavigationError> {
    let attempts = retry_attempts.max(1);

    for attempt in 1..=attempts {
        match client.get(url.as_str()).send() {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    let final_url = resp.url().clone();
                    let markup = resp.text().map_err(|err| NavigationError::Request {
                        url: url.to_string(),
                        message: err.to_string(),
                    })?;
                    return Ok((final_url, markup));
                }
                if attempt == attempts {
                    return Err(NavigationError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                warn!(%url, %status, attempt, "request failed; retrying");
            }
            Err(err) => {
                if attempt == attempts {
                    return Err(NavigationError::Request {
                        url: url.to_string(),
                        message: err.to_string(),
                    });
                }
                warn!(%url, attempt, error = %err, "request errored; retrying");
            }
        }

        std::thread::sleep(retry_backoff);
    }

    Err(NavigationError::Request {
        url: url.to_string(),
        message: "no attempts were made".to_string(),
    })
}
