//! Typed configuration surface (§6). A `Config` is handed to a transport
//! factory by the [`crate::registry::Registry`] on `implement`/`consume`;
//! the scheme of `uri` is what selects which transport actually gets
//! built (`local://`, `http://`/`https://`, `amqp://`).

use std::sync::Arc;
use std::time::Duration;

use crate::executor::SharedExecutor;

/// Default request time-to-live applied when a `Config` does not set one
/// explicitly (spec.md §6: "`request_ttl` (duration; default 5 min)").
pub const DEFAULT_REQUEST_TTL: Duration = Duration::from_secs(5 * 60);

/// Broker-side fixed TTL spec.md §9(b) flags as hard-coded in the source
/// (`"60000"` ms on every reply). We keep it as the default but make it
/// configurable, resolving that open question in the "fixed" direction.
pub const DEFAULT_REPLY_TTL: Duration = Duration::from_secs(60);

/// How often the broker dispatcher's expiry reaper sweeps (§4.7).
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(5);

/// The connection/behavior surface shared by every transport. Not every
/// field is meaningful to every transport; each transport documents which
/// subset it reads.
#[derive(Clone)]
pub struct Config {
    /// Scheme selects transport behavior: `local://<name>`,
    /// `http(s)://host:port`, `amqp://host:port`.
    pub uri: String,
    /// TTL applied to requests built by the proxy. `None` means requests
    /// never expire.
    pub request_ttl: Option<Duration>,
    /// TTL applied to the broker transport's replies (§9(b)).
    pub reply_ttl: Duration,
    /// How often the broker dispatcher's reaper daemon sweeps.
    pub reaper_interval: Duration,
    /// Broker authentication.
    pub username: Option<String>,
    pub password: Option<String>,
    /// HTTPS server keystore.
    pub keystore_path: Option<String>,
    pub keystore_password: Option<String>,
    /// HTTPS client: accept self-signed certificates. No intermediate CA
    /// verification is performed when this is set (§4.6).
    pub accept_self_signed: bool,
    /// Required by any transport that runs daemons (HTTP client dispatch,
    /// both broker daemons).
    pub executor: Option<SharedExecutor>,
}

impl Config {
    /// Starts a builder for the transport reachable at `uri`.
    pub fn builder(uri: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder {
            config: Config {
                uri: uri.into(),
                request_ttl: Some(DEFAULT_REQUEST_TTL),
                reply_ttl: DEFAULT_REPLY_TTL,
                reaper_interval: DEFAULT_REAPER_INTERVAL,
                username: None,
                password: None,
                keystore_path: None,
                keystore_password: None,
                accept_self_signed: false,
                executor: None,
            },
        }
    }

    /// True if `uri` carries the `https://` scheme.
    pub fn is_tls(&self) -> bool {
        self.uri.starts_with("https://")
    }

    pub fn executor(&self) -> crate::error::Result<SharedExecutor> {
        self.executor.clone().ok_or_else(|| {
            crate::error::BosonError::contract("this transport requires an executor in its Config")
        })
    }
}

/// Small, unadorned builder in the teacher's constructor style -- not a
/// generated builder-pattern crate.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn request_ttl(mut self, ttl: Duration) -> Self {
        self.config.request_ttl = Some(ttl);
        self
    }

    pub fn no_request_ttl(mut self) -> Self {
        self.config.request_ttl = None;
        self
    }

    pub fn reply_ttl(mut self, ttl: Duration) -> Self {
        self.config.reply_ttl = ttl;
        self
    }

    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.config.reaper_interval = interval;
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    pub fn keystore(mut self, path: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.keystore_path = Some(path.into());
        self.config.keystore_password = Some(password.into());
        self
    }

    pub fn accept_self_signed(mut self, accept: bool) -> Self {
        self.config.accept_self_signed = accept;
        self
    }

    pub fn executor(mut self, executor: SharedExecutor) -> Self {
        self.config.executor = Some(executor);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

pub type SharedConfig = Arc<Config>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_ttl() {
        let config = Config::builder("local://Hello").build();
        assert_eq!(config.request_ttl, Some(DEFAULT_REQUEST_TTL));
        assert_eq!(config.reply_ttl, DEFAULT_REPLY_TTL);
        assert!(!config.is_tls());
    }

    #[test]
    fn https_scheme_is_detected() {
        let config = Config::builder("https://localhost:8080").build();
        assert!(config.is_tls());
    }

    #[test]
    fn executor_is_required_when_absent() {
        let config = Config::builder("local://Hello").build();
        assert!(config.executor().is_err());
    }
}
