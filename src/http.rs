//! HTTP client for media downloads.
//!
//! Wraps `reqwest::Client` with the settings every download shares:
//! * `User-Agent` identifying amplink and the host OS
//! * connect and read timeouts, so a stalled CDN surfaces as an error
//!   instead of blocking the command loop forever
//! * TCP keepalive for back-to-back downloads from the same host

use std::{future::Future, time::Duration};

use futures_util::TryFutureExt;
use reqwest::Url;

use crate::{config::Config, error::Result};

#[derive(Clone, Debug)]
pub struct Client {
    inner: reqwest::Client,
}

impl Client {
    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Longest pause between two reads of a response body.
    const READ_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Fails when the TLS backend cannot be initialized.
    pub fn new(config: &Config) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .user_agent(config.user_agent())
            .build()?;

        Ok(Self { inner })
    }

    /// Sends a GET request, failing on non-success status codes.
    pub fn get(&self, url: Url) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        trace!("GET {url}");
        self.inner
            .get(url)
            .send()
            .and_then(|response| async move { response.error_for_status() })
            .map_err(Into::into)
    }
}
