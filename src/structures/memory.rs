//! In-process store used when no database is configured, and by tests.
//!
//! Mirrors the Postgres semantics the dashboard relies on: ids are assigned
//! on insert, `fetch_one` returns the lowest id, and nothing stops two rows
//! sharing a (site, date).

use async_trait::async_trait;
use parking_lot::Mutex;
use time::{Date, OffsetDateTime};

use super::{
    errors::DashboardError,
    model::{ApprovalStatus, Measurement, MeasurementRecord, PendingAdmin, Site, SiteInput},
    store::{AdminStore, MeasurementStore, SiteStore, SortOrder},
};

#[derive(Debug, Default)]
struct Tables {
    records: Vec<MeasurementRecord>,
    sites: Vec<Site>,
    admins: Vec<PendingAdmin>,
    next_record_id: i64,
    next_site_id: i32,
    next_admin_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// When set every call fails the way a missing relation does.
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose tables do not exist.
    #[cfg(test)]
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    fn check(&self, table: &str) -> Result<(), DashboardError> {
        match self.unavailable {
            true => Err(DashboardError::Store(format!(
                "relation \"{}\" does not exist",
                table
            ))),
            false => Ok(()),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tables.lock().records.len()
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn fetch_all(&self, order: SortOrder) -> Result<Vec<MeasurementRecord>, DashboardError> {
        self.check("water_quality")?;
        let mut records = self.tables.lock().records.clone();
        records.sort_by_key(|r| (r.measurement.date, r.id));
        if order == SortOrder::Descending {
            records.sort_by(|a, b| b.measurement.date.cmp(&a.measurement.date));
        }
        Ok(records)
    }

    async fn fetch_one(
        &self,
        site: &str,
        date: Date,
    ) -> Result<Option<MeasurementRecord>, DashboardError> {
        self.check("water_quality")?;
        Ok(self
            .tables
            .lock()
            .records
            .iter()
            .filter(|r| r.measurement.site == site && r.measurement.date == date)
            .min_by_key(|r| r.id)
            .cloned())
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<MeasurementRecord>, DashboardError> {
        self.check("water_quality")?;
        Ok(self
            .tables
            .lock()
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn insert(&self, measurement: &Measurement) -> Result<i64, DashboardError> {
        self.check("water_quality")?;
        let mut tables = self.tables.lock();
        tables.next_record_id += 1;
        let id = tables.next_record_id;
        tables.records.push(MeasurementRecord {
            id,
            measurement: measurement.clone(),
        });
        Ok(id)
    }

    async fn update(&self, id: i64, measurement: &Measurement) -> Result<(), DashboardError> {
        self.check("water_quality")?;
        if let Some(record) = self.tables.lock().records.iter_mut().find(|r| r.id == id) {
            record.measurement = measurement.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), DashboardError> {
        self.check("water_quality")?;
        self.tables.lock().records.retain(|r| r.id != id);
        Ok(())
    }
}

#[async_trait]
impl SiteStore for MemoryStore {
    async fn list_sites(&self) -> Result<Vec<Site>, DashboardError> {
        self.check("sites")?;
        let mut sites = self.tables.lock().sites.clone();
        sites.sort_by_key(|s| s.details.site_number);
        Ok(sites)
    }

    async fn add_site(&self, site: &SiteInput) -> Result<i32, DashboardError> {
        self.check("sites")?;
        let mut tables = self.tables.lock();
        if tables
            .sites
            .iter()
            .any(|s| s.details.full_name == site.full_name)
        {
            return Err(DashboardError::Store(format!(
                "duplicate key value violates unique constraint: full_name={}",
                site.full_name
            )));
        }
        tables.next_site_id += 1;
        let id = tables.next_site_id;
        tables.sites.push(Site {
            id: Some(id),
            details: site.clone(),
        });
        Ok(id)
    }

    async fn update_site(&self, id: i32, site: &SiteInput) -> Result<(), DashboardError> {
        self.check("sites")?;
        if let Some(existing) = self
            .tables
            .lock()
            .sites
            .iter_mut()
            .find(|s| s.id == Some(id))
        {
            existing.details = site.clone();
        }
        Ok(())
    }
}

#[async_trait]
impl AdminStore for MemoryStore {
    async fn is_approved_admin(&self, email: &str) -> Result<bool, DashboardError> {
        self.check("pending_admins")?;
        Ok(self
            .tables
            .lock()
            .admins
            .iter()
            .any(|a| a.email == email && a.is_approved()))
    }

    async fn find_admin(&self, email: &str) -> Result<Option<PendingAdmin>, DashboardError> {
        self.check("pending_admins")?;
        Ok(self
            .tables
            .lock()
            .admins
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn list_approved_admins(&self) -> Result<Vec<PendingAdmin>, DashboardError> {
        self.check("pending_admins")?;
        let mut admins: Vec<_> = self
            .tables
            .lock()
            .admins
            .iter()
            .filter(|a| a.is_approved())
            .cloned()
            .collect();
        admins.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(admins)
    }

    async fn insert_approved_admin(
        &self,
        email: &str,
        approved_by: &str,
    ) -> Result<(), DashboardError> {
        self.check("pending_admins")?;
        let mut tables = self.tables.lock();
        tables.next_admin_id += 1;
        let id = tables.next_admin_id;
        tables.admins.push(PendingAdmin {
            id,
            email: email.to_string(),
            status: ApprovalStatus::Approved.as_str().to_string(),
            approved_by: Some(approved_by.to_string()),
            approved_at: Some(OffsetDateTime::now_utc()),
        });
        Ok(())
    }

    async fn approve_existing_admin(
        &self,
        email: &str,
        approved_by: &str,
    ) -> Result<(), DashboardError> {
        self.check("pending_admins")?;
        for admin in self
            .tables
            .lock()
            .admins
            .iter_mut()
            .filter(|a| a.email == email)
        {
            admin.status = ApprovalStatus::Approved.as_str().to_string();
            admin.approved_by = Some(approved_by.to_string());
            admin.approved_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn set_admin_status(
        &self,
        id: i64,
        status: ApprovalStatus,
    ) -> Result<(), DashboardError> {
        self.check("pending_admins")?;
        if let Some(admin) = self.tables.lock().admins.iter_mut().find(|a| a.id == id) {
            admin.status = status.as_str().to_string();
        }
        Ok(())
    }
}
