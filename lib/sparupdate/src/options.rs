use crate::loader::{GraphLoader, HttpGraphLoader};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Configuration shared by the update processors.
///
/// ```
/// use sparupdate::UpdateOptions;
/// use std::time::Duration;
///
/// let options = UpdateOptions::default()
///     .with_auto_commit(false)
///     .with_timeout(Duration::from_secs(10));
/// assert!(!options.auto_commit());
/// ```
#[derive(Clone)]
#[must_use]
pub struct UpdateOptions {
    auto_commit: bool,
    timeout: Option<Duration>,
    loader: Option<Arc<dyn GraphLoader>>,
    #[cfg(feature = "http-client")]
    http_timeout: Option<Duration>,
    #[cfg(feature = "http-client")]
    http_redirection_limit: usize,
}

impl UpdateOptions {
    /// Sets if changes are flushed after each command set and discarded if it fails.
    ///
    /// Enabled by default.
    #[inline]
    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    /// Sets the maximal execution time of a command set.
    ///
    /// Command sets may ask for a lower timeout but never for a higher one. A zero duration means no limit.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Sets the loader used by `LOAD` commands.
    ///
    /// By default an [`HttpGraphLoader`] configured with the HTTP options is used.
    #[inline]
    pub fn with_loader(mut self, loader: impl GraphLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Sets a timeout for HTTP requests done during `LOAD`.
    #[cfg(feature = "http-client")]
    #[inline]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Sets an upper bound of the number of HTTP redirections followed per HTTP request done during `LOAD`.
    ///
    /// By default this value is `0`.
    #[cfg(feature = "http-client")]
    #[inline]
    pub fn with_http_redirection_limit(mut self, redirection_limit: usize) -> Self {
        self.http_redirection_limit = redirection_limit;
        self
    }

    #[inline]
    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The loader for `LOAD` commands, built from the HTTP options if none has been set.
    pub fn loader(&self) -> io::Result<Arc<dyn GraphLoader>> {
        if let Some(loader) = &self.loader {
            return Ok(Arc::clone(loader));
        }
        #[cfg(feature = "http-client")]
        let loader = HttpGraphLoader::new(self.http_timeout, self.http_redirection_limit)?;
        #[cfg(not(feature = "http-client"))]
        let loader = HttpGraphLoader::new(None, 0)?;
        Ok(Arc::new(loader))
    }
}

impl Default for UpdateOptions {
    #[inline]
    fn default() -> Self {
        Self {
            auto_commit: true,
            timeout: None,
            loader: None,
            #[cfg(feature = "http-client")]
            http_timeout: None,
            #[cfg(feature = "http-client")]
            http_redirection_limit: 0,
        }
    }
}

impl fmt::Debug for UpdateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("UpdateOptions");
        s.field("auto_commit", &self.auto_commit)
            .field("timeout", &self.timeout)
            .field("custom_loader", &self.loader.is_some());
        #[cfg(feature = "http-client")]
        s.field("http_timeout", &self.http_timeout)
            .field("http_redirection_limit", &self.http_redirection_limit);
        s.finish()
    }
}
