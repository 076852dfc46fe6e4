//! In-memory store for tests and ephemeral runs.

use super::{
    AttachmentRecord, Category, LineItemRecord, Process, Store, Supplier, SupplierResultRecord,
    SweepRecord, SweepState,
};
use crate::error::StoreError;
use crate::events::OfferStatus;
use crate::extract::{OfferAttachment, OfferItem, SupplierProfile};
use chrono::Utc;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    next_id: i64,
    categories: Vec<Category>,
    processes: Vec<Process>,
    suppliers: Vec<Supplier>,
    sweeps: Vec<SweepRecord>,
    outcomes: Vec<SupplierResultRecord>,
    line_items: Vec<LineItemRecord>,
    attachments: Vec<AttachmentRecord>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Mutex-guarded in-memory store. Same semantics as the SQLite store,
/// none of the I/O.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store for MemoryStore {
    fn add_category(&self, name: &str) -> Result<Category, StoreError> {
        let mut inner = self.lock();
        if inner.categories.iter().any(|c| c.name == name) {
            return Err(StoreError::Conflict(format!(
                "category '{name}' already exists"
            )));
        }
        let category = Category {
            id: inner.next_id(),
            name: name.to_string(),
        };
        inner.categories.push(category.clone());
        Ok(category)
    }

    fn categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(self.lock().categories.clone())
    }

    fn add_process(&self, portal_code: &str, category_id: i64) -> Result<Process, StoreError> {
        let mut inner = self.lock();
        if !inner.categories.iter().any(|c| c.id == category_id) {
            return Err(StoreError::missing("category", category_id));
        }
        let process = Process {
            id: inner.next_id(),
            portal_code: portal_code.to_string(),
            display_code: None,
            category_id,
        };
        inner.processes.push(process.clone());
        Ok(process)
    }

    fn process(&self, id: i64) -> Result<Option<Process>, StoreError> {
        Ok(self.lock().processes.iter().find(|p| p.id == id).cloned())
    }

    fn processes(&self) -> Result<Vec<Process>, StoreError> {
        Ok(self.lock().processes.clone())
    }

    fn delete_process(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let sweep_ids: Vec<i64> = inner
            .sweeps
            .iter()
            .filter(|s| s.process_id == id)
            .map(|s| s.id)
            .collect();
        inner.line_items.retain(|i| !sweep_ids.contains(&i.sweep_id));
        inner.attachments.retain(|a| !sweep_ids.contains(&a.sweep_id));
        inner.outcomes.retain(|o| !sweep_ids.contains(&o.sweep_id));
        inner.sweeps.retain(|s| s.process_id != id);
        inner.processes.retain(|p| p.id != id);
        Ok(())
    }

    fn set_display_code(&self, process_id: i64, code: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let process = inner
            .processes
            .iter_mut()
            .find(|p| p.id == process_id)
            .ok_or_else(|| StoreError::missing("process", process_id))?;
        process.display_code = Some(code.to_string());
        Ok(())
    }

    fn add_supplier(&self, ruc: &str, category_id: i64) -> Result<Supplier, StoreError> {
        let mut inner = self.lock();
        if inner.suppliers.iter().any(|s| s.ruc == ruc) {
            return Err(StoreError::Conflict(format!(
                "supplier with RUC {ruc} already exists"
            )));
        }
        let supplier = Supplier {
            id: inner.next_id(),
            ruc: ruc.to_string(),
            name: None,
            email: None,
            phone: None,
            country: None,
            province: None,
            canton: None,
            address: None,
            category_id,
        };
        inner.suppliers.push(supplier.clone());
        Ok(supplier)
    }

    fn suppliers(&self) -> Result<Vec<Supplier>, StoreError> {
        Ok(self.lock().suppliers.clone())
    }

    fn suppliers_in_category(&self, category_id: i64) -> Result<Vec<Supplier>, StoreError> {
        Ok(self
            .lock()
            .suppliers
            .iter()
            .filter(|s| s.category_id == category_id)
            .cloned()
            .collect())
    }

    fn merge_supplier_profile(
        &self,
        ruc: &str,
        profile: &SupplierProfile,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let supplier = inner
            .suppliers
            .iter_mut()
            .find(|s| s.ruc == ruc)
            .ok_or_else(|| StoreError::missing("supplier", ruc))?;
        supplier.name = Some(profile.legal_name.clone());
        supplier.email = Some(profile.email.clone());
        supplier.phone = Some(profile.phone.clone());
        supplier.country = Some(profile.country.clone());
        supplier.province = Some(profile.province.clone());
        supplier.canton = Some(profile.canton.clone());
        supplier.address = Some(profile.address.clone());
        Ok(())
    }

    fn create_sweep(&self, process_id: i64) -> Result<SweepRecord, StoreError> {
        let mut inner = self.lock();
        let sweep = SweepRecord {
            id: inner.next_id(),
            process_id,
            state: SweepState::Running,
            started_at: Utc::now(),
            finished_at: None,
        };
        inner.sweeps.push(sweep.clone());
        Ok(sweep)
    }

    fn finalize_sweep(&self, sweep_id: i64) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let sweep = inner
            .sweeps
            .iter_mut()
            .find(|s| s.id == sweep_id)
            .ok_or_else(|| StoreError::missing("sweep", sweep_id))?;
        sweep.state = SweepState::Completed;
        sweep.finished_at = Some(Utc::now());
        Ok(())
    }

    fn sweeps_for_process(&self, process_id: i64) -> Result<Vec<SweepRecord>, StoreError> {
        Ok(self
            .lock()
            .sweeps
            .iter()
            .filter(|s| s.process_id == process_id)
            .cloned()
            .collect())
    }

    fn record_outcome(
        &self,
        sweep_id: i64,
        ruc: &str,
        status: OfferStatus,
    ) -> Result<(), StoreError> {
        self.lock().outcomes.push(SupplierResultRecord {
            sweep_id,
            supplier_ruc: ruc.to_string(),
            status,
        });
        Ok(())
    }

    fn add_line_item(
        &self,
        sweep_id: i64,
        ruc: &str,
        supplier_name: &str,
        item: &OfferItem,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let id = inner.next_id();
        inner.line_items.push(LineItemRecord {
            id,
            sweep_id,
            supplier_ruc: ruc.to_string(),
            supplier_name: supplier_name.to_string(),
            item_number: item.number.clone(),
            cpc: item.cpc.clone(),
            description: item.description.clone(),
            unit: item.unit.clone(),
            quantity: item.quantity,
            unit_value: item.unit_value,
            total_value: item.total_value,
            collected_at: Utc::now(),
        });
        Ok(())
    }

    fn add_attachment(
        &self,
        sweep_id: i64,
        ruc: &str,
        attachment: &OfferAttachment,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let id = inner.next_id();
        inner.attachments.push(AttachmentRecord {
            id,
            sweep_id,
            supplier_ruc: ruc.to_string(),
            name: attachment.name.clone(),
            url: attachment.url.clone(),
            collected_at: Utc::now(),
        });
        Ok(())
    }

    fn line_items(&self, sweep_id: i64) -> Result<Vec<LineItemRecord>, StoreError> {
        Ok(self
            .lock()
            .line_items
            .iter()
            .filter(|i| i.sweep_id == sweep_id)
            .cloned()
            .collect())
    }

    fn attachments(&self, sweep_id: i64) -> Result<Vec<AttachmentRecord>, StoreError> {
        Ok(self
            .lock()
            .attachments
            .iter()
            .filter(|a| a.sweep_id == sweep_id)
            .cloned()
            .collect())
    }

    fn outcomes(&self, sweep_id: i64) -> Result<Vec<SupplierResultRecord>, StoreError> {
        Ok(self
            .lock()
            .outcomes
            .iter()
            .filter(|o| o.sweep_id == sweep_id)
            .cloned()
            .collect())
    }
}
