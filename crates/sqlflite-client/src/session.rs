//! Session management
//!
//! A [`Session`] is a cheaply cloneable handle over one transport. It owns
//! the cached table listing and hands out [`TableHandle`]s for building
//! queries.

use crate::query::TableHandle;
use crate::transport::{TcpTransport, Transport};
use parking_lot::Mutex;
use sqlflite_core::{ConnectionConfig, Result};
use std::sync::Arc;

/// Open a session against the engine described by the configuration
///
/// Transport security is negotiated per the config's flags. Disabled
/// certificate verification is never silent: each warning is logged and
/// recorded on the session, observable via [`Session::security_warnings`].
pub async fn connect(config: &ConnectionConfig) -> Result<Session> {
    let warnings = config.security_warnings();
    for warning in &warnings {
        tracing::warn!(host = %config.host, "{}", warning);
    }

    let transport = TcpTransport::connect(config).await?;
    Ok(Session::with_transport(Arc::new(transport), warnings))
}

/// A live logical connection to the remote engine
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    transport: Arc<dyn Transport>,
    tables: Mutex<Option<Vec<String>>>,
    security_warnings: Vec<String>,
}

impl Session {
    /// Build a session over an already-connected transport
    ///
    /// [`connect`] is the normal entry point; this constructor exists so
    /// alternative transports (including in-memory engines in tests) can
    /// drive the same session machinery.
    pub fn with_transport(transport: Arc<dyn Transport>, security_warnings: Vec<String>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                transport,
                tables: Mutex::new(None),
                security_warnings,
            }),
        }
    }

    /// The remote table names, sorted
    ///
    /// Fetched lazily and cached: the first call costs one metadata
    /// round-trip, later calls are free.
    pub async fn tables(&self) -> Result<Vec<String>> {
        if let Some(cached) = self.inner.tables.lock().clone() {
            return Ok(cached);
        }

        let mut names = self.inner.transport.list_tables().await?;
        names.sort();
        tracing::debug!(table_count = names.len(), "fetched table listing");
        *self.inner.tables.lock() = Some(names.clone());
        Ok(names)
    }

    /// Get a handle to a named remote table
    ///
    /// Fails with [`sqlflite_core::SqlfliteError::NotFound`] when the
    /// catalog has no such table.
    pub async fn table(&self, name: &str) -> Result<TableHandle> {
        let schema = self.inner.transport.table_schema(name).await?;
        Ok(TableHandle::new(self.clone(), schema))
    }

    /// Warnings recorded while the connection was being established
    pub fn security_warnings(&self) -> &[String] {
        &self.inner.security_warnings
    }

    /// Explicitly release the underlying connection
    ///
    /// The transport is also released when the last session clone drops;
    /// closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        self.inner.transport.close().await
    }

    /// Check whether the underlying transport has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.transport.is_closed()
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("closed", &self.is_closed())
            .field("cached_tables", &self.inner.tables.lock().is_some())
            .field("security_warnings", &self.inner.security_warnings)
            .finish()
    }
}
