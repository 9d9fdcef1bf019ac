//! Storage seams for the three tables, and their Postgres implementation.
//!
//! Every call is a direct passthrough: no cache, no transaction, no version
//! check. Concurrent writers overwrite each other.

use async_trait::async_trait;
use log::debug;
use sqlx::{
    postgres::{PgArguments, PgPool},
    query::Query,
    Postgres, Row,
};
use time::Date;

use super::{
    errors::DashboardError,
    model::{ApprovalStatus, Measurement, MeasurementRecord, PendingAdmin, Site, SiteInput},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Whole table ordered by date; ties keep insertion (id) order.
    async fn fetch_all(&self, order: SortOrder) -> Result<Vec<MeasurementRecord>, DashboardError>;

    /// First row (lowest id) stored under exactly `site` on `date`.
    async fn fetch_one(
        &self,
        site: &str,
        date: Date,
    ) -> Result<Option<MeasurementRecord>, DashboardError>;

    async fn fetch_by_id(&self, id: i64) -> Result<Option<MeasurementRecord>, DashboardError>;

    /// Returns the id assigned by storage.
    async fn insert(&self, measurement: &Measurement) -> Result<i64, DashboardError>;

    async fn update(&self, id: i64, measurement: &Measurement) -> Result<(), DashboardError>;

    async fn delete(&self, id: i64) -> Result<(), DashboardError>;
}

#[async_trait]
pub trait SiteStore: Send + Sync {
    /// All rows of `sites` ordered by site number.
    async fn list_sites(&self) -> Result<Vec<Site>, DashboardError>;

    async fn add_site(&self, site: &SiteInput) -> Result<i32, DashboardError>;

    async fn update_site(&self, id: i32, site: &SiteInput) -> Result<(), DashboardError>;
}

#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn is_approved_admin(&self, email: &str) -> Result<bool, DashboardError>;

    async fn find_admin(&self, email: &str) -> Result<Option<PendingAdmin>, DashboardError>;

    async fn list_approved_admins(&self) -> Result<Vec<PendingAdmin>, DashboardError>;

    async fn insert_approved_admin(
        &self,
        email: &str,
        approved_by: &str,
    ) -> Result<(), DashboardError>;

    /// Flips every row for `email` back to approved.
    async fn approve_existing_admin(
        &self,
        email: &str,
        approved_by: &str,
    ) -> Result<(), DashboardError>;

    async fn set_admin_status(&self, id: i64, status: ApprovalStatus)
        -> Result<(), DashboardError>;
}

/// Everything the dashboard needs from its database.
pub trait Store: MeasurementStore + SiteStore + AdminStore {}

impl<T: MeasurementStore + SiteStore + AdminStore> Store for T {}

const RECORD_COLUMNS: &str = "id, site, date, dissolved_oxygen_mg, dissolved_oxygen_sat, \
     hardness, alkalinity, ph, temperature, flow, notes, user_id";

const SITE_COLUMNS: &str =
    "id, site_number, full_name, short_name, latitude, longitude, elevation, description";

const ADMIN_COLUMNS: &str = "id, email, status, approved_by, approved_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn bind_measurement<'q>(
    query: Query<'q, Postgres, PgArguments>,
    m: &'q Measurement,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(&m.site)
        .bind(m.date)
        .bind(m.readings.dissolved_oxygen_mg)
        .bind(m.readings.dissolved_oxygen_sat)
        .bind(m.readings.hardness)
        .bind(m.readings.alkalinity)
        .bind(m.readings.ph)
        .bind(m.readings.temperature)
        .bind(m.readings.flow)
        .bind(&m.notes)
        .bind(&m.user_id)
}

fn bind_site<'q>(
    query: Query<'q, Postgres, PgArguments>,
    s: &'q SiteInput,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(s.site_number)
        .bind(&s.full_name)
        .bind(&s.short_name)
        .bind(s.latitude)
        .bind(s.longitude)
        .bind(s.elevation)
        .bind(&s.description)
}

#[async_trait]
impl MeasurementStore for PgStore {
    async fn fetch_all(&self, order: SortOrder) -> Result<Vec<MeasurementRecord>, DashboardError> {
        let sql = format!(
            "SELECT {} FROM water_quality ORDER BY date {}, id",
            RECORD_COLUMNS,
            order.sql()
        );
        Ok(sqlx::query_as::<_, MeasurementRecord>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn fetch_one(
        &self,
        site: &str,
        date: Date,
    ) -> Result<Option<MeasurementRecord>, DashboardError> {
        debug!("looking up {} on {}", site, date);
        let sql = format!(
            "SELECT {} FROM water_quality WHERE site = $1 AND date = $2 ORDER BY id LIMIT 1",
            RECORD_COLUMNS
        );
        Ok(sqlx::query_as::<_, MeasurementRecord>(&sql)
            .bind(site)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<MeasurementRecord>, DashboardError> {
        let sql = format!("SELECT {} FROM water_quality WHERE id = $1", RECORD_COLUMNS);
        Ok(sqlx::query_as::<_, MeasurementRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert(&self, measurement: &Measurement) -> Result<i64, DashboardError> {
        let row = bind_measurement(
            sqlx::query(
                "INSERT INTO water_quality (site, date, dissolved_oxygen_mg, dissolved_oxygen_sat, \
                 hardness, alkalinity, ph, temperature, flow, notes, user_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING id",
            ),
            measurement,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update(&self, id: i64, measurement: &Measurement) -> Result<(), DashboardError> {
        bind_measurement(
            sqlx::query(
                "UPDATE water_quality SET site = $1, date = $2, dissolved_oxygen_mg = $3, \
                 dissolved_oxygen_sat = $4, hardness = $5, alkalinity = $6, ph = $7, \
                 temperature = $8, flow = $9, notes = $10, user_id = $11 WHERE id = $12",
            ),
            measurement,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), DashboardError> {
        sqlx::query("DELETE FROM water_quality WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SiteStore for PgStore {
    async fn list_sites(&self) -> Result<Vec<Site>, DashboardError> {
        let sql = format!("SELECT {} FROM sites ORDER BY site_number", SITE_COLUMNS);
        Ok(sqlx::query_as::<_, Site>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn add_site(&self, site: &SiteInput) -> Result<i32, DashboardError> {
        let row = bind_site(
            sqlx::query(
                "INSERT INTO sites (site_number, full_name, short_name, latitude, longitude, \
                 elevation, description) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
            ),
            site,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update_site(&self, id: i32, site: &SiteInput) -> Result<(), DashboardError> {
        bind_site(
            sqlx::query(
                "UPDATE sites SET site_number = $1, full_name = $2, short_name = $3, \
                 latitude = $4, longitude = $5, elevation = $6, description = $7 WHERE id = $8",
            ),
            site,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AdminStore for PgStore {
    async fn is_approved_admin(&self, email: &str) -> Result<bool, DashboardError> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM pending_admins WHERE email = $1 AND status = $2)",
        )
        .bind(email)
        .bind(ApprovalStatus::Approved.as_str())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_admin(&self, email: &str) -> Result<Option<PendingAdmin>, DashboardError> {
        let sql = format!(
            "SELECT {} FROM pending_admins WHERE email = $1 ORDER BY id LIMIT 1",
            ADMIN_COLUMNS
        );
        Ok(sqlx::query_as::<_, PendingAdmin>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_approved_admins(&self) -> Result<Vec<PendingAdmin>, DashboardError> {
        let sql = format!(
            "SELECT {} FROM pending_admins WHERE status = $1 ORDER BY email",
            ADMIN_COLUMNS
        );
        Ok(sqlx::query_as::<_, PendingAdmin>(&sql)
            .bind(ApprovalStatus::Approved.as_str())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_approved_admin(
        &self,
        email: &str,
        approved_by: &str,
    ) -> Result<(), DashboardError> {
        sqlx::query(
            "INSERT INTO pending_admins (email, status, approved_by, approved_at) \
             VALUES ($1, $2, $3, now())",
        )
        .bind(email)
        .bind(ApprovalStatus::Approved.as_str())
        .bind(approved_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn approve_existing_admin(
        &self,
        email: &str,
        approved_by: &str,
    ) -> Result<(), DashboardError> {
        sqlx::query(
            "UPDATE pending_admins SET status = $2, approved_by = $3, approved_at = now() \
             WHERE email = $1",
        )
        .bind(email)
        .bind(ApprovalStatus::Approved.as_str())
        .bind(approved_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_admin_status(
        &self,
        id: i64,
        status: ApprovalStatus,
    ) -> Result<(), DashboardError> {
        sqlx::query("UPDATE pending_admins SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
