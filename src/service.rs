//! Long-lived lookup service
//!
//! Holds the served labels and index behind [`ArcSwap`] pointers. Queries
//! take a snapshot and never wait on a rebuild; a rebuild publishes new
//! state only after the new file is in place.

use crate::blocks::BlockSource;
use crate::config::GeoConfig;
use crate::database::GeoDatabase;
use crate::labels::LabelStore;
use crate::query::{self, MyIp, Resolution};
use crate::rebuild::{RebuildReport, Rebuilder};
use crate::sample::{self, SampleListing};
use arc_swap::{ArcSwap, ArcSwapOption};
use log::{info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// Query and rebuild entry points over one configuration
pub struct GeoService {
    config: GeoConfig,
    labels: ArcSwap<LabelStore>,
    database: ArcSwapOption<GeoDatabase>,
    rebuild_guard: Mutex<()>,
}

impl GeoService {
    /// Load whatever state exists on disk
    ///
    /// A missing label table or index is logged and left empty; queries
    /// then report an error until a rebuild succeeds.
    pub fn open(config: GeoConfig) -> Self {
        let labels = match LabelStore::load(&config.labels_source()) {
            Ok(labels) => labels,
            Err(e) => {
                warn!("Starting without labels: {}", e);
                LabelStore::empty()
            }
        };
        let database = match GeoDatabase::open(&config.database) {
            Ok(db) => {
                info!(
                    "Serving {} ({} nodes)",
                    config.database.display(),
                    db.node_count()
                );
                Some(Arc::new(db))
            }
            Err(e) => {
                warn!("No index served from {}: {}", config.database.display(), e);
                None
            }
        };
        Self::with_state(config, labels, database)
    }

    /// Service over state that is already loaded
    pub fn with_state(config: GeoConfig, labels: LabelStore, database: Option<Arc<GeoDatabase>>) -> Self {
        Self {
            config,
            labels: ArcSwap::from_pointee(labels),
            database: ArcSwapOption::new(database),
            rebuild_guard: Mutex::new(()),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &GeoConfig {
        &self.config
    }

    /// Snapshot of the served index
    pub fn database(&self) -> Option<Arc<GeoDatabase>> {
        self.database.load_full()
    }

    /// Snapshot of the served labels
    pub fn labels(&self) -> Arc<LabelStore> {
        self.labels.load_full()
    }

    /// Resolve one address against the current index
    pub fn resolve(&self, address: &str) -> Resolution {
        let db = self.database.load();
        query::resolve(address, db.as_deref())
    }

    /// Address of the caller, preferring the proxy-supplied one
    pub fn resolve_my_ip(&self, forwarded: Option<&str>, peer: &str) -> MyIp {
        query::resolve_my_ip(forwarded, peer)
    }

    /// First `limit` block rows merged with the current labels
    pub fn list_sample(&self, limit: Option<usize>) -> SampleListing {
        let limit = limit.unwrap_or(self.config.sample_limit);
        let blocks = BlockSource::new(self.config.blocks_source());
        let labels = self.labels.load();
        match sample::sample(&blocks, &labels, limit) {
            Ok(ip_networks) => SampleListing::Networks { ip_networks },
            Err(e) => SampleListing::Failed {
                error: e.to_string(),
            },
        }
    }

    /// Rebuild from the configured tables and swap the result in
    ///
    /// Returns a `busy` report without waiting when another rebuild holds
    /// the guard.
    pub fn rebuild(&self) -> RebuildReport {
        let Some(_guard) = self.rebuild_guard.try_lock() else {
            warn!("Rejected rebuild request: another rebuild is running");
            return RebuildReport::busy();
        };

        let output = Rebuilder::new(&self.config).run();
        if let (Some(labels), Some(database)) = (output.labels, output.database) {
            self.labels.store(Arc::new(labels));
            self.database.store(Some(Arc::new(database)));
        }
        output.report
    }
}
