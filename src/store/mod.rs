//! Persistence collaborator for processes, suppliers, and sweep results.
//!
//! The orchestrator and HTTP surface talk to the [`Store`] trait only.
//! Production runs on SQLite ([`sqlite::SqliteStore`]); tests and
//! `--ephemeral` mode use [`memory::MemoryStore`].

pub mod memory;
pub mod sqlite;

use crate::error::StoreError;
use crate::events::OfferStatus;
use crate::extract::{OfferAttachment, OfferItem, SupplierProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A supplier/process grouping. Sweeps visit every supplier sharing the
/// process's category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// A contracting process on the portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub id: i64,
    /// Opaque portal code used to build page URLs.
    pub portal_code: String,
    /// Human-readable `NIC-…` code, filled lazily by the first sweep that
    /// observes it.
    pub display_code: Option<String>,
    pub category_id: i64,
}

/// A supplier, identified by its RUC. Profile fields are merged in from
/// extraction results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: i64,
    pub ruc: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub province: Option<String>,
    pub canton: Option<String>,
    pub address: Option<String>,
    pub category_id: i64,
}

impl Supplier {
    /// Display name: legal name when known, RUC otherwise.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.ruc)
    }
}

/// Sweep lifecycle. A setup failure never creates a record, so `Pending`
/// is only ever observed by callers creating sweeps out-of-band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepState {
    Pending,
    Running,
    Completed,
}

impl SweepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// One collection pass over a process's suppliers. Append-only once
/// running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRecord {
    pub id: i64,
    pub process_id: i64,
    pub state: SweepState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// One supplier's classified outcome within a sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierResultRecord {
    pub sweep_id: i64,
    pub supplier_ruc: String,
    pub status: OfferStatus,
}

/// A persisted line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemRecord {
    pub id: i64,
    pub sweep_id: i64,
    pub supplier_ruc: String,
    pub supplier_name: String,
    pub item_number: String,
    pub cpc: String,
    pub description: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_value: f64,
    pub total_value: f64,
    pub collected_at: DateTime<Utc>,
}

/// A persisted attachment reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub id: i64,
    pub sweep_id: i64,
    pub supplier_ruc: String,
    pub name: String,
    pub url: String,
    pub collected_at: DateTime<Utc>,
}

/// The persistence interface the orchestrator and HTTP surface depend on.
///
/// Methods are synchronous — SQLite calls are short and the orchestrator
/// is single-threaded per sweep.
pub trait Store: Send + Sync {
    // categories
    fn add_category(&self, name: &str) -> Result<Category, StoreError>;
    fn categories(&self) -> Result<Vec<Category>, StoreError>;

    // processes
    fn add_process(&self, portal_code: &str, category_id: i64) -> Result<Process, StoreError>;
    fn process(&self, id: i64) -> Result<Option<Process>, StoreError>;
    fn processes(&self) -> Result<Vec<Process>, StoreError>;
    fn delete_process(&self, id: i64) -> Result<(), StoreError>;
    /// Overwrite the display code. First-write-wins is enforced by the
    /// sweep's accumulator, not here.
    fn set_display_code(&self, process_id: i64, code: &str) -> Result<(), StoreError>;

    // suppliers
    fn add_supplier(&self, ruc: &str, category_id: i64) -> Result<Supplier, StoreError>;
    fn suppliers(&self) -> Result<Vec<Supplier>, StoreError>;
    /// Suppliers sharing a category, in stable id order — the sweep's
    /// iteration order.
    fn suppliers_in_category(&self, category_id: i64) -> Result<Vec<Supplier>, StoreError>;
    fn merge_supplier_profile(&self, ruc: &str, profile: &SupplierProfile)
        -> Result<(), StoreError>;

    // sweeps
    fn create_sweep(&self, process_id: i64) -> Result<SweepRecord, StoreError>;
    fn finalize_sweep(&self, sweep_id: i64) -> Result<(), StoreError>;
    fn sweeps_for_process(&self, process_id: i64) -> Result<Vec<SweepRecord>, StoreError>;

    // per-supplier appends
    fn record_outcome(
        &self,
        sweep_id: i64,
        ruc: &str,
        status: OfferStatus,
    ) -> Result<(), StoreError>;
    fn add_line_item(
        &self,
        sweep_id: i64,
        ruc: &str,
        supplier_name: &str,
        item: &OfferItem,
    ) -> Result<(), StoreError>;
    fn add_attachment(
        &self,
        sweep_id: i64,
        ruc: &str,
        attachment: &OfferAttachment,
    ) -> Result<(), StoreError>;

    // listings
    fn line_items(&self, sweep_id: i64) -> Result<Vec<LineItemRecord>, StoreError>;
    fn attachments(&self, sweep_id: i64) -> Result<Vec<AttachmentRecord>, StoreError>;
    fn outcomes(&self, sweep_id: i64) -> Result<Vec<SupplierResultRecord>, StoreError>;
}
