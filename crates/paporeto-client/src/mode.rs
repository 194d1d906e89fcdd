//! Connected / demo mode resolution and the lazily built backend client.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::backend::{Backend, RestBackend};
use crate::config::BackendConfig;
use crate::error::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Connected,
    Demo,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Connected => write!(f, "connected"),
            Mode::Demo => write!(f, "demo"),
        }
    }
}

type BackendFactory =
    Box<dyn Fn(&BackendConfig) -> Result<Arc<dyn Backend>, BackendError> + Send + Sync>;

/// Decides the mode once, from the endpoint, and hands out the backend
/// client in connected mode.
///
/// The client is built on first use and memoized.  A construction failure
/// is not memoized: `resolve` answers `None` ("not ready") for that call and
/// tries again on the next one.
pub struct BackendResolver {
    config: BackendConfig,
    mode: Mode,
    factory: BackendFactory,
    client: Mutex<Option<Arc<dyn Backend>>>,
}

impl BackendResolver {
    pub fn new<F>(config: BackendConfig, factory: F) -> Self
    where
        F: Fn(&BackendConfig) -> Result<Arc<dyn Backend>, BackendError> + Send + Sync + 'static,
    {
        let mode = if config.is_configured() {
            Mode::Connected
        } else {
            Mode::Demo
        };
        info!(%mode, url = %config.url, "backend mode resolved");
        Self {
            config,
            mode,
            factory: Box::new(factory),
            client: Mutex::new(None),
        }
    }

    /// Resolver building a [`RestBackend`] against the configured endpoint.
    pub fn with_rest(config: BackendConfig) -> Self {
        Self::new(config, |config| {
            let client: Arc<dyn Backend> = Arc::new(RestBackend::new(config)?);
            Ok(client)
        })
    }

    /// Resolver handing out an existing client.
    pub fn with_backend(config: BackendConfig, backend: Arc<dyn Backend>) -> Self {
        Self::new(config, move |_| Ok(Arc::clone(&backend)))
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn resolve(&self) -> Option<Arc<dyn Backend>> {
        if self.mode == Mode::Demo {
            return None;
        }
        let mut slot = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ref client) = *slot {
            return Some(Arc::clone(client));
        }
        match (self.factory)(&self.config) {
            Ok(client) => {
                info!(url = %self.config.base_url(), "backend client constructed");
                *slot = Some(Arc::clone(&client));
                Some(client)
            }
            Err(e) => {
                warn!(error = %e, "backend client not ready");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_resolver(url: &str, builds: Arc<AtomicUsize>) -> BackendResolver {
        BackendResolver::new(BackendConfig::new(url, "anon"), move |_| {
            builds.fetch_add(1, Ordering::SeqCst);
            let client: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
            Ok(client)
        })
    }

    #[test]
    fn placeholder_endpoint_is_demo() {
        let builds = Arc::new(AtomicUsize::new(0));
        let resolver = counting_resolver("https://SEU_PROJETO.supabase.co", Arc::clone(&builds));
        assert_eq!(resolver.mode(), Mode::Demo);
        assert!(resolver.resolve().is_none());
        assert_eq!(builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn real_endpoint_builds_client_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let resolver = counting_resolver("https://abcd1234.supabase.co", Arc::clone(&builds));
        assert_eq!(resolver.mode(), Mode::Connected);

        let first = resolver.resolve().unwrap();
        let second = resolver.resolve().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_construction_is_not_ready_and_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let resolver = BackendResolver::new(
            BackendConfig::new("https://abcd1234.supabase.co", "anon"),
            move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(BackendError::Transport("sdk not loaded".into()))
                } else {
                    let client: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
                    Ok(client)
                }
            },
        );

        assert!(resolver.resolve().is_none());
        assert_eq!(resolver.mode(), Mode::Connected);
        assert!(resolver.resolve().is_some());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn rest_resolver_builds_http_client() {
        let resolver = BackendResolver::with_rest(BackendConfig::new("https://abcd1234.supabase.co", "anon"));
        let client = resolver.resolve().unwrap();
        assert_eq!(
            client.public_url("media", "a.png"),
            "https://abcd1234.supabase.co/storage/v1/object/public/media/a.png"
        );
    }
}
