//! Renderer abstraction for browser-based page rendering.
//!
//! The portal's proforma pages build their tables with JavaScript, so
//! extraction needs a real rendering engine. `Renderer` and
//! `RenderContext` abstract over it (production: Chromium via
//! chromiumoxide; tests: canned HTML). One context per supplier, never
//! reused.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab).
///
/// The sweep orchestrator owns the context outside its deadline race so
/// `close` runs on success, fault, and timeout alike.
#[async_trait]
pub trait RenderContext: Send {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()>;
    /// Snapshot the full page HTML.
    async fn html(&self) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A renderer used when Chromium is unavailable.
///
/// The HTTP surface still serves records and listings; starting a sweep
/// fails per supplier with a clear error instead of at boot.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!(
            "Chromium not available — install it or set PROFORMA_CHROMIUM_PATH"
        ))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}
