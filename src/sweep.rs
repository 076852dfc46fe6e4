// Copyright 2026 Proforma Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sweep orchestrator — one full collection pass over a process's
//! suppliers.
//!
//! Deliberately serial: one rendering session at a time bounds load on
//! the portal and keeps its anti-automation defenses quiet. Each
//! supplier's browser work races a hard deadline; the context is closed
//! on every path. Progress flows through the bounded event channel; a
//! failed send means the caller is gone, and the sweep stops emitting
//! but still finalizes its record.

use crate::error::{StoreError, SweepError};
use crate::events::{EventSender, OfferStatus, SweepEvent};
use crate::extract::document::Document;
use crate::extract::{self, ExtractionResult};
use crate::portal;
use crate::renderer::Renderer;
use crate::store::{Process, Store, Supplier, SweepRecord};
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Timing knobs. Defaults match the portal's observed behavior; tests
/// compress them.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Hard ceiling for one supplier's navigate + settle + snapshot.
    pub supplier_deadline: Duration,
    /// Unconditional delay between suppliers — upstream pacing.
    pub pacing: Duration,
    /// Timeout for the initial page navigation.
    pub nav_timeout: Duration,
    /// Wait after load; the portal's scripts fill the tables with no
    /// readiness signal.
    pub settle: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            supplier_deadline: Duration::from_secs(60),
            pacing: Duration::from_secs(2),
            nav_timeout: Duration::from_secs(45),
            settle: Duration::from_secs(4),
        }
    }
}

/// Final tallies for the `done` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub ok: usize,
    pub no_data: usize,
    pub error: usize,
}

impl Counters {
    fn bump(&mut self, status: OfferStatus) {
        match status {
            OfferStatus::Ok => self.ok += 1,
            OfferStatus::NoData => self.no_data += 1,
            OfferStatus::Error => self.error += 1,
        }
    }
}

/// Running-average ETA over completed suppliers; `None` before the first
/// completion.
fn eta_seconds(completed: usize, total: usize, elapsed: Duration) -> Option<u64> {
    if completed == 0 {
        return None;
    }
    let avg = elapsed.as_secs_f64() / completed as f64;
    Some(((total - completed) as f64 * avg).round() as u64)
}

/// Drives sweeps. One instance serves every sweep of the runtime.
pub struct SweepRunner {
    store: Arc<dyn Store>,
    renderer: Arc<dyn Renderer>,
    config: SweepConfig,
}

impl SweepRunner {
    pub fn new(store: Arc<dyn Store>, renderer: Arc<dyn Renderer>) -> Self {
        Self::with_config(store, renderer, SweepConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn Store>,
        renderer: Arc<dyn Renderer>,
        config: SweepConfig,
    ) -> Self {
        Self {
            store,
            renderer,
            config,
        }
    }

    /// Run one sweep, delivering the ordered event stream through
    /// `events`. Always terminates the stream with exactly one `done` or
    /// `error` event — unless the sink itself disconnected, in which
    /// case there is nobody left to tell.
    pub async fn run(&self, process_id: i64, events: EventSender) {
        match self.run_inner(process_id, &events).await {
            Ok(counters) => {
                info!(
                    process = process_id,
                    ok = counters.ok,
                    no_data = counters.no_data,
                    error = counters.error,
                    "sweep finished"
                );
                let _ = events
                    .send(SweepEvent::Done {
                        ok: counters.ok,
                        no_data: counters.no_data,
                        error: counters.error,
                    })
                    .await;
            }
            Err(SweepError::SinkClosed) => {
                warn!(process = process_id, "event sink disconnected mid-sweep");
            }
            Err(e) => {
                let _ = events
                    .send(SweepEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn run_inner(
        &self,
        process_id: i64,
        events: &EventSender,
    ) -> Result<Counters, SweepError> {
        let process = self
            .store
            .process(process_id)?
            .ok_or(SweepError::ProcessNotFound(process_id))?;
        let suppliers = self.store.suppliers_in_category(process.category_id)?;
        if suppliers.is_empty() {
            return Err(SweepError::EmptySupplierSet);
        }

        // From here on a Sweep record exists and must reach `completed`
        // even if the sink goes away mid-run.
        let sweep = self.store.create_sweep(process_id)?;
        info!(
            sweep = sweep.id,
            process = process_id,
            suppliers = suppliers.len(),
            "sweep started"
        );

        let outcome = self.visit_all(&process, &sweep, &suppliers, events).await;

        self.store.finalize_sweep(sweep.id)?;
        outcome
    }

    async fn visit_all(
        &self,
        process: &Process,
        sweep: &SweepRecord,
        suppliers: &[Supplier],
        events: &EventSender,
    ) -> Result<Counters, SweepError> {
        let total = suppliers.len();
        send(events, SweepEvent::Start { total }).await?;

        let started = Instant::now();
        let mut counters = Counters::default();
        let mut display_code_written = false;

        for (idx, supplier) in suppliers.iter().enumerate() {
            send(
                events,
                SweepEvent::Progress {
                    current: idx + 1,
                    total,
                    supplier_id: supplier.ruc.clone(),
                    name: supplier.display_name().to_string(),
                    eta_seconds: eta_seconds(idx, total, started.elapsed()),
                },
            )
            .await?;

            let status = match self.collect_supplier(process, supplier).await {
                Ok(result) => self.persist_result(
                    process,
                    sweep,
                    supplier,
                    result,
                    &mut display_code_written,
                ),
                Err(e) => {
                    warn!(ruc = %supplier.ruc, "supplier failed: {e:#}");
                    OfferStatus::Error
                }
            };

            if let Err(e) = self.store.record_outcome(sweep.id, &supplier.ruc, status) {
                // Classification already happened; the row is lost but the
                // stream and counters stay consistent.
                warn!(ruc = %supplier.ruc, "failed to record outcome: {e}");
            }
            counters.bump(status);

            send(
                events,
                SweepEvent::Result {
                    supplier_id: supplier.ruc.clone(),
                    status,
                },
            )
            .await?;

            tokio::time::sleep(self.config.pacing).await;
        }

        Ok(counters)
    }

    /// Render one supplier's page and extract it, bounded by the
    /// deadline. The context is released whether this succeeds, faults,
    /// or times out.
    async fn collect_supplier(
        &self,
        process: &Process,
        supplier: &Supplier,
    ) -> Result<ExtractionResult> {
        let url = portal::proforma_url(&process.portal_code, &supplier.ruc);
        let mut ctx = self.renderer.new_context().await?;

        let rendered = tokio::time::timeout(self.config.supplier_deadline, async {
            ctx.navigate(&url, self.config.nav_timeout.as_millis() as u64)
                .await?;
            tokio::time::sleep(self.config.settle).await;
            ctx.html().await
        })
        .await;

        let _ = ctx.close().await;

        let html = match rendered {
            Ok(Ok(html)) => html,
            Ok(Err(e)) => return Err(e),
            Err(_) => anyhow::bail!(
                "supplier {} exceeded the {:?} deadline",
                supplier.ruc,
                self.config.supplier_deadline
            ),
        };

        let doc = Document::parse(&html, &url);
        Ok(extract::extract_offer(&doc, &supplier.ruc))
    }

    /// Classify a completed extraction and persist what it found. Any
    /// store fault here demotes the supplier's outcome to `error`.
    fn persist_result(
        &self,
        process: &Process,
        sweep: &SweepRecord,
        supplier: &Supplier,
        result: ExtractionResult,
        display_code_written: &mut bool,
    ) -> OfferStatus {
        // First non-empty display code in the sweep wins, whatever the
        // page's classification — even an offerless page renders the
        // process breadcrumb.
        if !*display_code_written && !result.display_code.is_empty() {
            match self.store.set_display_code(process.id, &result.display_code) {
                Ok(()) => {
                    info!(code = %result.display_code, "process display code captured");
                    *display_code_written = true;
                }
                Err(e) => {
                    warn!("failed to save display code: {e}");
                    return OfferStatus::Error;
                }
            }
        }

        if result.items.is_empty() {
            return OfferStatus::NoData;
        }

        let supplier_name = if result.profile.legal_name.is_empty() {
            supplier.display_name().to_string()
        } else {
            result.profile.legal_name.clone()
        };

        let saved: Result<(), StoreError> = (|| {
            if !result.profile.legal_name.is_empty() {
                self.store
                    .merge_supplier_profile(&supplier.ruc, &result.profile)?;
            }
            for item in &result.items {
                self.store
                    .add_line_item(sweep.id, &supplier.ruc, &supplier_name, item)?;
            }
            for attachment in &result.attachments {
                self.store
                    .add_attachment(sweep.id, &supplier.ruc, attachment)?;
            }
            Ok(())
        })();

        match saved {
            Ok(()) => OfferStatus::Ok,
            Err(e) => {
                warn!(ruc = %supplier.ruc, "persistence failed mid-save: {e}");
                OfferStatus::Error
            }
        }
    }
}

async fn send(events: &EventSender, event: SweepEvent) -> Result<(), SweepError> {
    events.send(event).await.map_err(|_| SweepError::SinkClosed)
}
