// src/session.rs
use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use datafusion::prelude::{SessionConfig, SessionContext};
use tracing::{info, warn};

use crate::config::JobConfig;
use crate::storage::{BlobStore, GcsStore, LocalStore, Location};

/// Query context for the aggregation.
///
/// Runs on a single target partition so partial sums are folded in input order
/// and the result is reproducible run to run.
pub fn query_context() -> SessionContext {
    SessionContext::new_with_config(SessionConfig::new().with_target_partitions(1))
}

/// Scoped handle for one run: owns the query context and storage clients and is
/// released exactly once, either by `stop()` or, failing that, on drop.
pub struct Session {
    app_name: String,
    started_at: DateTime<Local>,
    ctx: SessionContext,
    gcs: Option<BlobStore>,
    local: BlobStore,
    stopped: bool,
}

impl Session {
    /// Open a session with whichever backends the configured locations need.
    /// GCS credentials are only resolved when a `gs://` location is present.
    pub async fn open(config: &JobConfig) -> Result<Self> {
        let gcs = if config.input.is_gcs() || config.output.is_gcs() {
            Some(BlobStore::Gcs(GcsStore::connect().await?))
        } else {
            None
        };

        let session = Self {
            app_name: config.app_name.clone(),
            started_at: Local::now(),
            ctx: query_context(),
            gcs,
            local: BlobStore::Local(LocalStore::new()),
            stopped: false,
        };
        info!(
            app = %session.app_name,
            gcs = session.gcs.is_some(),
            "session opened"
        );
        Ok(session)
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Backend serving `location`.
    pub fn store_for(&self, location: &Location) -> Result<&BlobStore> {
        match location {
            Location::Local(_) => Ok(&self.local),
            Location::Gcs { .. } => self
                .gcs
                .as_ref()
                .ok_or_else(|| anyhow!("session has no GCS client for {}", location)),
        }
    }

    /// Release the session explicitly.
    pub fn stop(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.gcs = None;
        info!(
            app = %self.app_name,
            elapsed = ?(Local::now() - self.started_at).to_std().unwrap_or_default(),
            "session stopped"
        );
    }

    #[cfg(test)]
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.stopped {
            warn!(app = %self.app_name, "session dropped without stop(); releasing");
            self.release();
        }
    }
}
