//! Row types for the three dashboard tables and the measured parameters.

use serde::Deserialize;
use time::{macros::format_description, Date, OffsetDateTime};

use super::errors::DashboardError;

/// The seven measured parameters, in the order the dashboard shows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    DissolvedOxygenMg,
    DissolvedOxygenSat,
    Hardness,
    Alkalinity,
    Ph,
    Temperature,
    Flow,
}

impl Parameter {
    pub const ALL: [Parameter; 7] = [
        Parameter::DissolvedOxygenMg,
        Parameter::DissolvedOxygenSat,
        Parameter::Hardness,
        Parameter::Alkalinity,
        Parameter::Ph,
        Parameter::Temperature,
        Parameter::Flow,
    ];

    /// Column name in `water_quality`, also used as the form field name.
    pub fn column(self) -> &'static str {
        match self {
            Parameter::DissolvedOxygenMg => "dissolved_oxygen_mg",
            Parameter::DissolvedOxygenSat => "dissolved_oxygen_sat",
            Parameter::Hardness => "hardness",
            Parameter::Alkalinity => "alkalinity",
            Parameter::Ph => "ph",
            Parameter::Temperature => "temperature",
            Parameter::Flow => "flow",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Parameter::DissolvedOxygenMg => "Dissolved Oxygen (mg/L)",
            Parameter::DissolvedOxygenSat => "Dissolved Oxygen (% saturation)",
            Parameter::Hardness => "Hardness (mg/L CaCO3)",
            Parameter::Alkalinity => "Alkalinity (mg/L CaCO3)",
            Parameter::Ph => "pH (S.U.s)",
            Parameter::Temperature => "Temperature (°C)",
            Parameter::Flow => "Flow (cfs)",
        }
    }

    pub fn from_column(column: &str) -> Option<Parameter> {
        Parameter::ALL.into_iter().find(|p| p.column() == column)
    }

    /// Whether a stored zero means "no reading" on a chart. Only the
    /// chemistry parameters qualify; zero temperature and zero flow are real.
    pub fn zero_is_gap(self) -> bool {
        matches!(
            self,
            Parameter::DissolvedOxygenMg
                | Parameter::DissolvedOxygenSat
                | Parameter::Hardness
                | Parameter::Alkalinity
                | Parameter::Ph
        )
    }

    /// Value shown in the numeric widget when there is nothing to pre-populate.
    pub fn widget_default(self) -> f64 {
        match self {
            Parameter::Ph => 7.0,
            _ => 0.0,
        }
    }

    /// Client-side (min, max) hint for the numeric widget.
    pub fn range_hint(self) -> Option<(f64, f64)> {
        match self {
            Parameter::DissolvedOxygenSat => Some((0.0, 200.0)),
            Parameter::Ph => Some((0.0, 14.0)),
            _ => None,
        }
    }

    pub fn step(self) -> &'static str {
        match self {
            Parameter::DissolvedOxygenMg | Parameter::Flow => "0.01",
            _ => "0.1",
        }
    }
}

/// Measured values of one observation. `None` means not measured.
#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct Readings {
    pub dissolved_oxygen_mg: Option<f64>,
    pub dissolved_oxygen_sat: Option<f64>,
    pub hardness: Option<f64>,
    pub alkalinity: Option<f64>,
    pub ph: Option<f64>,
    pub temperature: Option<f64>,
    pub flow: Option<f64>,
}

impl Readings {
    pub fn get(&self, parameter: Parameter) -> Option<f64> {
        match parameter {
            Parameter::DissolvedOxygenMg => self.dissolved_oxygen_mg,
            Parameter::DissolvedOxygenSat => self.dissolved_oxygen_sat,
            Parameter::Hardness => self.hardness,
            Parameter::Alkalinity => self.alkalinity,
            Parameter::Ph => self.ph,
            Parameter::Temperature => self.temperature,
            Parameter::Flow => self.flow,
        }
    }

    pub fn set(&mut self, parameter: Parameter, value: Option<f64>) {
        let slot = match parameter {
            Parameter::DissolvedOxygenMg => &mut self.dissolved_oxygen_mg,
            Parameter::DissolvedOxygenSat => &mut self.dissolved_oxygen_sat,
            Parameter::Hardness => &mut self.hardness,
            Parameter::Alkalinity => &mut self.alkalinity,
            Parameter::Ph => &mut self.ph,
            Parameter::Temperature => &mut self.temperature,
            Parameter::Flow => &mut self.flow,
        };
        *slot = value;
    }
}

/// A `water_quality` row without its surrogate id; the insert/update payload.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Measurement {
    pub site: String,
    pub date: Date,
    #[sqlx(flatten)]
    pub readings: Readings,
    pub notes: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MeasurementRecord {
    pub id: i64,
    #[sqlx(flatten)]
    pub measurement: Measurement,
}

/// Every attribute of a monitoring site except its surrogate id.
#[derive(Debug, Clone, PartialEq, Deserialize, sqlx::FromRow)]
#[serde(deny_unknown_fields)]
pub struct SiteInput {
    pub site_number: i32,
    pub full_name: String,
    pub short_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<i32>,
    pub description: Option<String>,
}

/// A monitoring site. `id` is `None` for entries of the built-in fallback list.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Site {
    pub id: Option<i32>,
    #[sqlx(flatten)]
    pub details: SiteInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    Approved,
    Denied,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PendingAdmin {
    pub id: i64,
    pub email: String,
    pub status: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<OffsetDateTime>,
}

impl PendingAdmin {
    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved.as_str()
    }
}

/// Parses the `YYYY-MM-DD` form used by HTML date inputs and the database.
pub fn parse_iso_date(value: &str) -> Result<Date, DashboardError> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|e| DashboardError::Validation(format!("invalid date '{}': {}", value, e)))
}

/// `MM/DD/YYYY`, the format volunteers see.
pub fn display_date(date: Date) -> String {
    format!(
        "{:02}/{:02}/{}",
        u8::from(date.month()),
        date.day(),
        date.year()
    )
}
