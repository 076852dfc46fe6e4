//! Start the proforma HTTP server.

use crate::docproxy;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::{NoopRenderer, Renderer};
use crate::rest::{self, AppState};
use crate::store::memory::MemoryStore;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;
use crate::sweep::SweepConfig;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 7750;

/// Run the server until interrupted.
pub async fn run(port: u16, db_path: Option<PathBuf>, ephemeral: bool) -> Result<()> {
    let store: Arc<dyn Store> = if ephemeral {
        info!("using ephemeral in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let path = db_path.unwrap_or_else(SqliteStore::default_path);
        info!("opening store at {}", path.display());
        Arc::new(
            SqliteStore::open(&path)
                .with_context(|| format!("failed to open database at {}", path.display()))?,
        )
    };

    // Sweeps need Chromium; everything else serves fine without it.
    let renderer: Arc<dyn Renderer> = match ChromiumRenderer::new().await {
        Ok(renderer) => {
            info!("Chromium renderer initialized");
            Arc::new(renderer)
        }
        Err(e) => {
            warn!("Chromium unavailable ({e:#}); sweeps will fail until it is installed");
            Arc::new(NoopRenderer)
        }
    };

    let state = Arc::new(AppState {
        store,
        renderer,
        sweep_config: SweepConfig::default(),
        http: docproxy::client(),
    });

    rest::serve(port, state).await
}
