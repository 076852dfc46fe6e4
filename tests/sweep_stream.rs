//! End-to-end sweep tests over a stub renderer and in-memory store.
//!
//! Timings are compressed versions of the production defaults so the
//! deadline and pacing paths run for real.

use async_trait::async_trait;
use proforma_runtime::error::StoreError;
use proforma_runtime::events::{self, OfferStatus, SweepEvent};
use proforma_runtime::extract::{OfferAttachment, OfferItem, SupplierProfile};
use proforma_runtime::renderer::{RenderContext, Renderer};
use proforma_runtime::store::memory::MemoryStore;
use proforma_runtime::store::{Category, Process, Store, Supplier, SweepState};
use proforma_runtime::sweep::{SweepConfig, SweepRunner};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Stub renderer ───────────────────────────────────────────────

/// Serves canned HTML per RUC. RUCs in `slow` hang past any test
/// deadline; RUCs with no page fail navigation.
struct StubRenderer {
    pages: HashMap<String, String>,
    slow: HashSet<String>,
    active: Arc<AtomicUsize>,
}

impl StubRenderer {
    fn new(pages: HashMap<String, String>, slow: HashSet<String>) -> Self {
        Self {
            pages,
            slow,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Renderer for StubRenderer {
    async fn new_context(&self) -> anyhow::Result<Box<dyn RenderContext>> {
        self.active.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(StubContext {
            pages: self.pages.clone(),
            slow: self.slow.clone(),
            html: None,
            active: Arc::clone(&self.active),
        }))
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

struct StubContext {
    pages: HashMap<String, String>,
    slow: HashSet<String>,
    html: Option<String>,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for StubContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> anyhow::Result<()> {
        let parsed = url::Url::parse(url)?;
        let ruc = parsed
            .query_pairs()
            .find(|(k, _)| k == "ruc")
            .map(|(_, v)| v.to_string())
            .unwrap_or_default();

        if self.slow.contains(&ruc) {
            tokio::time::sleep(Duration::from_secs(600)).await;
        }
        match self.pages.get(&ruc) {
            Some(html) => {
                self.html = Some(html.clone());
                Ok(())
            }
            None => anyhow::bail!("connection refused for {ruc}"),
        }
    }

    async fn html(&self) -> anyhow::Result<String> {
        self.html
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no page loaded"))
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.active.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }
}

// ── Fixtures ────────────────────────────────────────────────────

fn fast_config() -> SweepConfig {
    SweepConfig {
        supplier_deadline: Duration::from_millis(300),
        pacing: Duration::from_millis(10),
        nav_timeout: Duration::from_secs(1),
        settle: Duration::ZERO,
    }
}

fn item_row(number: &str, cpc: &str, total: &str) -> String {
    format!(
        "<tr><td>{number}</td><td>{cpc}</td><td>Producto</td><td>Detalle</td>\
         <td>Kg</td><td>1</td><td>{total}</td><td>{total}</td><td>x</td></tr>"
    )
}

/// A page with a profile block, two priced items, and one attachment.
fn offer_page() -> String {
    format!(
        r#"<html><body>
          <p>Proceso NIC-637055-2024-2</p>
          <table>
            <tr><td>Razón Social:</td><td>FERRETERIA ANDINA CIA. LTDA.</td></tr>
            <tr><td>Correo electrónico</td><td>ventas@andina.ec</td></tr>
          </table>
          <table>{}{}</table>
          <table><tr>
            <td>Oferta firmada</td>
            <td><a href="/e/ExeGENBajarArchivoGeneral?id=5">descargar</a></td>
          </tr></table>
        </body></html>"#,
        item_row("1", "43230", "90.0"),
        item_row("2", "43231", "60.0"),
    )
}

fn empty_page() -> String {
    "<html><body><p>Proceso NIC-637055-2024-2</p><p>No existen proformas registradas</p></body></html>"
        .to_string()
}

fn seed(store: &dyn Store, rucs: &[&str]) -> (Category, Process, Vec<Supplier>) {
    let category = store.add_category("Ferretería").unwrap();
    let process = store.add_process("portal-code-1,", category.id).unwrap();
    let suppliers = rucs
        .iter()
        .map(|ruc| store.add_supplier(ruc, category.id).unwrap())
        .collect();
    (category, process, suppliers)
}

async fn run_and_collect(
    store: Arc<dyn Store>,
    renderer: Arc<dyn Renderer>,
    process_id: i64,
) -> Vec<SweepEvent> {
    let runner = SweepRunner::with_config(store, renderer, fast_config());
    let (tx, mut rx) = events::channel();
    let handle = tokio::spawn(async move { runner.run(process_id, tx).await });

    let mut collected = Vec::new();
    while let Some(event) = rx.recv().await {
        collected.push(event);
    }
    handle.await.unwrap();
    collected
}

// ── Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_sweep_ok_nodata_error() {
    let store = Arc::new(MemoryStore::new());
    let (_, process, _) = seed(store.as_ref(), &["111", "222", "333"]);

    let mut pages = HashMap::new();
    pages.insert("111".to_string(), offer_page());
    pages.insert("222".to_string(), empty_page());
    pages.insert("333".to_string(), offer_page()); // never reached — slow
    let renderer = Arc::new(StubRenderer::new(
        pages,
        HashSet::from(["333".to_string()]),
    ));

    let events = run_and_collect(store.clone(), renderer.clone(), process.id).await;

    // Fixed emission order: start, then progress/result per supplier,
    // then the single terminal done.
    assert_eq!(events.len(), 8);
    assert!(matches!(events[0], SweepEvent::Start { total: 3 }));
    match &events[1] {
        SweepEvent::Progress {
            current,
            total,
            supplier_id,
            eta_seconds,
            ..
        } => {
            assert_eq!((*current, *total), (1, 3));
            assert_eq!(supplier_id, "111");
            assert!(eta_seconds.is_none(), "no ETA before the first completion");
        }
        other => panic!("expected progress, got {other:?}"),
    }
    match &events[2] {
        SweepEvent::Result {
            supplier_id,
            status,
        } => {
            assert_eq!(supplier_id, "111");
            assert_eq!(*status, OfferStatus::Ok);
        }
        other => panic!("expected result, got {other:?}"),
    }
    match &events[3] {
        SweepEvent::Progress { eta_seconds, .. } => {
            assert!(eta_seconds.is_some(), "ETA appears after one completion");
        }
        other => panic!("expected progress, got {other:?}"),
    }
    assert!(matches!(
        &events[4],
        SweepEvent::Result { status: OfferStatus::NoData, .. }
    ));
    assert!(matches!(&events[5], SweepEvent::Progress { .. }));
    assert!(matches!(
        &events[6],
        SweepEvent::Result { status: OfferStatus::Error, .. }
    ));
    match &events[7] {
        SweepEvent::Done { ok, no_data, error } => {
            assert_eq!((*ok, *no_data, *error), (1, 1, 1));
            assert_eq!(ok + no_data + error, 3, "counters partition the supplier set");
        }
        other => panic!("expected done, got {other:?}"),
    }

    // Persistence: items, attachment, profile merge, display code,
    // outcomes, completed sweep.
    let sweeps = store.sweeps_for_process(process.id).unwrap();
    assert_eq!(sweeps.len(), 1);
    assert_eq!(sweeps[0].state, SweepState::Completed);
    assert!(sweeps[0].finished_at.is_some());

    let items = store.line_items(sweeps[0].id).unwrap();
    assert_eq!(items.len(), 2);
    let total: f64 = items.iter().map(|i| i.total_value).sum();
    assert_eq!(total, 150.0);
    assert_eq!(items[0].supplier_name, "FERRETERIA ANDINA CIA. LTDA.");
    assert_eq!(items[0].description, "[43230] Producto - Detalle");

    let attachments = store.attachments(sweeps[0].id).unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].name, "Oferta firmada");

    let updated = store.suppliers().unwrap();
    assert_eq!(
        updated[0].name.as_deref(),
        Some("FERRETERIA ANDINA CIA. LTDA.")
    );

    let got = store.process(process.id).unwrap().unwrap();
    assert_eq!(got.display_code.as_deref(), Some("NIC-637055-2024-2"));

    let outcomes = store.outcomes(sweeps[0].id).unwrap();
    assert_eq!(outcomes.len(), 3);

    // Every rendering context was released — timeout path included.
    assert_eq!(renderer.active_contexts(), 0);
}

#[tokio::test]
async fn test_unknown_process_is_single_error_event() {
    let store = Arc::new(MemoryStore::new());
    let renderer = Arc::new(StubRenderer::new(HashMap::new(), HashSet::new()));

    let events = run_and_collect(store.clone(), renderer, 404).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], SweepEvent::Error { .. }));
    // A setup failure never creates a Sweep record.
    assert!(store.sweeps_for_process(404).unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_supplier_set_is_single_error_event() {
    let store = Arc::new(MemoryStore::new());
    let category = store.add_category("Vacía").unwrap();
    let process = store.add_process("code", category.id).unwrap();
    let renderer = Arc::new(StubRenderer::new(HashMap::new(), HashSet::new()));

    let events = run_and_collect(store.clone(), renderer, process.id).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        SweepEvent::Error { message } => assert!(message.contains("no suppliers")),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(store.sweeps_for_process(process.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_navigation_fault_is_nonfatal() {
    let store = Arc::new(MemoryStore::new());
    let (_, process, _) = seed(store.as_ref(), &["111", "222"]);

    // Only 222 has a page; 111's navigation fails outright.
    let mut pages = HashMap::new();
    pages.insert("222".to_string(), offer_page());
    let renderer = Arc::new(StubRenderer::new(pages, HashSet::new()));

    let events = run_and_collect(store.clone(), renderer.clone(), process.id).await;

    let done = events.last().unwrap();
    match done {
        SweepEvent::Done { ok, no_data, error } => {
            assert_eq!((*ok, *no_data, *error), (1, 0, 1));
        }
        other => panic!("expected done, got {other:?}"),
    }
    assert_eq!(renderer.active_contexts(), 0);
}

#[tokio::test]
async fn test_sink_disconnect_still_finalizes_sweep() {
    let store = Arc::new(MemoryStore::new());
    let (_, process, _) = seed(store.as_ref(), &["111"]);

    let mut pages = HashMap::new();
    pages.insert("111".to_string(), offer_page());
    let renderer = Arc::new(StubRenderer::new(pages, HashSet::new()));

    let runner = SweepRunner::with_config(store.clone(), renderer.clone(), fast_config());
    let (tx, rx) = events::channel();
    drop(rx); // the caller is gone before the first event

    runner.run(process.id, tx).await;

    let sweeps = store.sweeps_for_process(process.id).unwrap();
    assert_eq!(sweeps.len(), 1, "the sweep record was created");
    assert_eq!(
        sweeps[0].state,
        SweepState::Completed,
        "and still finalized after the sink vanished"
    );
    assert_eq!(renderer.active_contexts(), 0);
}

// ── Mid-sweep persistence fault ─────────────────────────────────

/// Delegates to a MemoryStore but fails every line-item insert.
struct ItemSaveFails(MemoryStore);

impl Store for ItemSaveFails {
    fn add_category(&self, name: &str) -> Result<Category, StoreError> {
        self.0.add_category(name)
    }
    fn categories(&self) -> Result<Vec<Category>, StoreError> {
        self.0.categories()
    }
    fn add_process(&self, portal_code: &str, category_id: i64) -> Result<Process, StoreError> {
        self.0.add_process(portal_code, category_id)
    }
    fn process(&self, id: i64) -> Result<Option<Process>, StoreError> {
        self.0.process(id)
    }
    fn processes(&self) -> Result<Vec<Process>, StoreError> {
        self.0.processes()
    }
    fn delete_process(&self, id: i64) -> Result<(), StoreError> {
        self.0.delete_process(id)
    }
    fn set_display_code(&self, process_id: i64, code: &str) -> Result<(), StoreError> {
        self.0.set_display_code(process_id, code)
    }
    fn add_supplier(&self, ruc: &str, category_id: i64) -> Result<Supplier, StoreError> {
        self.0.add_supplier(ruc, category_id)
    }
    fn suppliers(&self) -> Result<Vec<Supplier>, StoreError> {
        self.0.suppliers()
    }
    fn suppliers_in_category(&self, category_id: i64) -> Result<Vec<Supplier>, StoreError> {
        self.0.suppliers_in_category(category_id)
    }
    fn merge_supplier_profile(
        &self,
        ruc: &str,
        profile: &SupplierProfile,
    ) -> Result<(), StoreError> {
        self.0.merge_supplier_profile(ruc, profile)
    }
    fn create_sweep(
        &self,
        process_id: i64,
    ) -> Result<proforma_runtime::store::SweepRecord, StoreError> {
        self.0.create_sweep(process_id)
    }
    fn finalize_sweep(&self, sweep_id: i64) -> Result<(), StoreError> {
        self.0.finalize_sweep(sweep_id)
    }
    fn sweeps_for_process(
        &self,
        process_id: i64,
    ) -> Result<Vec<proforma_runtime::store::SweepRecord>, StoreError> {
        self.0.sweeps_for_process(process_id)
    }
    fn record_outcome(
        &self,
        sweep_id: i64,
        ruc: &str,
        status: OfferStatus,
    ) -> Result<(), StoreError> {
        self.0.record_outcome(sweep_id, ruc, status)
    }
    fn add_line_item(
        &self,
        _sweep_id: i64,
        _ruc: &str,
        _supplier_name: &str,
        _item: &OfferItem,
    ) -> Result<(), StoreError> {
        Err(StoreError::Conflict("disk full".into()))
    }
    fn add_attachment(
        &self,
        sweep_id: i64,
        ruc: &str,
        attachment: &OfferAttachment,
    ) -> Result<(), StoreError> {
        self.0.add_attachment(sweep_id, ruc, attachment)
    }
    fn line_items(
        &self,
        sweep_id: i64,
    ) -> Result<Vec<proforma_runtime::store::LineItemRecord>, StoreError> {
        self.0.line_items(sweep_id)
    }
    fn attachments(
        &self,
        sweep_id: i64,
    ) -> Result<Vec<proforma_runtime::store::AttachmentRecord>, StoreError> {
        self.0.attachments(sweep_id)
    }
    fn outcomes(
        &self,
        sweep_id: i64,
    ) -> Result<Vec<proforma_runtime::store::SupplierResultRecord>, StoreError> {
        self.0.outcomes(sweep_id)
    }
}

#[tokio::test]
async fn test_item_save_fault_demotes_supplier_to_error() {
    let store = Arc::new(ItemSaveFails(MemoryStore::new()));
    let (_, process, _) = seed(store.as_ref(), &["111", "222"]);

    let mut pages = HashMap::new();
    pages.insert("111".to_string(), offer_page());
    pages.insert("222".to_string(), empty_page());
    let renderer = Arc::new(StubRenderer::new(pages, HashSet::new()));

    let events = run_and_collect(store.clone(), renderer, process.id).await;

    // The save failed mid-item, so supplier 111 is an error — but the
    // sweep carried on and finished.
    match events.last().unwrap() {
        SweepEvent::Done { ok, no_data, error } => {
            assert_eq!((*ok, *no_data, *error), (0, 1, 1));
        }
        other => panic!("expected done, got {other:?}"),
    }
    let sweeps = store.sweeps_for_process(process.id).unwrap();
    assert_eq!(sweeps[0].state, SweepState::Completed);
}
