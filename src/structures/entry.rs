//! Measurement entry and edit flow.
//!
//! The form opens on a (site, date) pair or on a record picked from the chart
//! or the admin list. Submitting stages the record; only an explicit confirm
//! writes it. Whether the write is an insert or an update is fixed at staging
//! time by whether the draft knows an existing record id.

use std::collections::HashMap;

use log::{debug, info, warn};
use time::Date;

use super::{
    errors::DashboardError,
    form::{DeleteAction, DeleteGuard, FormState, Notice, NumericField, Outcome},
    model::{display_date, Measurement, MeasurementRecord, Parameter, Readings},
    sites::SiteCatalog,
    store::MeasurementStore,
};

/// What the user is editing.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    /// Full name of the chosen site.
    pub site: String,
    pub date: Date,
    /// Id of the record being edited, if one exists for this site and date.
    pub target: Option<i64>,
    pub fields: Vec<(Parameter, NumericField)>,
    pub notes: String,
}

/// A record waiting for confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedEntry {
    pub measurement: Measurement,
    pub target: Option<i64>,
}

pub type EntryForm = FormState<EntryDraft, StagedEntry>;

impl EntryDraft {
    pub fn new(site: String, date: Date, existing: Option<&MeasurementRecord>) -> Self {
        let readings = existing.map(|r| &r.measurement.readings);
        EntryDraft {
            site,
            date,
            target: existing.map(|r| r.id),
            fields: Parameter::ALL
                .into_iter()
                .map(|p| (p, NumericField::prefill(p, readings)))
                .collect(),
            notes: existing
                .and_then(|r| r.measurement.notes.clone())
                .unwrap_or_default(),
        }
    }

    pub fn is_update(&self) -> bool {
        self.target.is_some()
    }
}

/// Values posted by the entry form.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySubmission {
    pub fields: Vec<(Parameter, NumericField)>,
    pub notes: String,
}

impl EntrySubmission {
    /// Reads `<column>` and `<column>_na` pairs. A ticked N/A makes the
    /// number irrelevant; otherwise the number must parse.
    pub fn from_form(form: &HashMap<String, String>) -> Result<Self, DashboardError> {
        let mut fields = Vec::with_capacity(Parameter::ALL.len());
        for parameter in Parameter::ALL {
            let not_available = form.contains_key(&format!("{}_na", parameter.column()));
            let raw = form
                .get(parameter.column())
                .map(|v| v.trim())
                .unwrap_or_default();
            let value = match (raw.parse::<f64>(), not_available) {
                (Ok(value), _) => value,
                (Err(_), true) => parameter.widget_default(),
                (Err(_), false) => {
                    return Err(DashboardError::Validation(format!(
                        "{}: enter a number or tick N/A",
                        parameter.title()
                    )))
                }
            };
            fields.push((
                parameter,
                NumericField {
                    value,
                    not_available,
                },
            ));
        }
        Ok(EntrySubmission {
            fields,
            notes: form.get("notes").cloned().unwrap_or_default(),
        })
    }
}

/// How the form was opened.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenRequest {
    /// A record picked on the chart or in the admin list.
    Selected(i64),
    /// A site under either naming scheme and a date; `None` picks the first
    /// catalog site.
    Lookup { site: Option<String>, date: Date },
}

/// Looks up the record stored for `site` on `date` under any of the site's
/// names.
pub async fn find_existing<S: MeasurementStore + ?Sized>(
    store: &S,
    catalog: &SiteCatalog,
    site: &str,
    date: Date,
) -> Result<Option<MeasurementRecord>, DashboardError> {
    let full_name = catalog.full_name(catalog.key(site));
    for alias in catalog.stored_aliases(full_name) {
        if let Some(record) = store.fetch_one(alias, date).await? {
            debug!("found record {} for {} on {}", record.id, alias, date);
            return Ok(Some(record));
        }
    }
    Ok(None)
}

/// `Idle -> Drafting`. Lookup failures still open a blank form; the notice
/// says what happened.
pub async fn open<S: MeasurementStore + ?Sized>(
    store: &S,
    catalog: &SiteCatalog,
    request: OpenRequest,
) -> (EntryForm, Notice) {
    let (site, date) = match request {
        OpenRequest::Selected(id) => match store.fetch_by_id(id).await {
            Ok(Some(record)) => {
                let key = catalog.key(&record.measurement.site);
                let notice = Notice::Success(format!(
                    "Editing: {} - {}",
                    catalog.short_name(key),
                    display_date(record.measurement.date)
                ));
                let draft = EntryDraft::new(
                    catalog.full_name(key).to_string(),
                    record.measurement.date,
                    Some(&record),
                );
                return (EntryForm::open(draft), notice);
            }
            Ok(None) => {
                debug!("selected record {} no longer exists", id);
                (None, time::OffsetDateTime::now_utc().date())
            }
            Err(e) => {
                warn!("loading selected record {} failed: {}", id, e);
                let draft = EntryDraft::new(
                    default_site(catalog, None),
                    time::OffsetDateTime::now_utc().date(),
                    None,
                );
                return (
                    EntryForm::open(draft),
                    Notice::Error(format!("Error loading selected data: {}", e)),
                );
            }
        },
        OpenRequest::Lookup { site, date } => (site, date),
    };

    let site = default_site(catalog, site);
    let site = catalog.full_name(catalog.key(&site)).to_string();
    match find_existing(store, catalog, &site, date).await {
        Ok(Some(record)) => (
            EntryForm::open(EntryDraft::new(site, date, Some(&record))),
            Notice::Info("Editing existing data entry".to_string()),
        ),
        Ok(None) => (
            EntryForm::open(EntryDraft::new(site, date, None)),
            Notice::Info("Creating new data entry".to_string()),
        ),
        Err(e) => {
            warn!("checking for existing data failed: {}", e);
            (
                EntryForm::open(EntryDraft::new(site, date, None)),
                Notice::Error(format!("Error checking for existing data: {}", e)),
            )
        }
    }
}

fn default_site(catalog: &SiteCatalog, site: Option<String>) -> String {
    site.filter(|s| !s.trim().is_empty())
        .or_else(|| {
            catalog
                .list_sites()
                .first()
                .map(|(full_name, _)| full_name.to_string())
        })
        .unwrap_or_default()
}

/// `Drafting -> PendingConfirm`.
pub fn submit(
    form: EntryForm,
    submission: &EntrySubmission,
    catalog: &SiteCatalog,
    user_id: Option<&str>,
) -> Result<EntryForm, DashboardError> {
    let draft = form
        .draft()
        .ok_or(DashboardError::InvalidState("no entry is being edited"))?;
    if draft.site.trim().is_empty() {
        return Err(DashboardError::Validation(
            "Please select a site before submitting.".to_string(),
        ));
    }

    let mut readings = Readings::default();
    for (parameter, field) in &submission.fields {
        readings.set(*parameter, field.resolve());
    }
    let notes = submission.notes.trim();
    let staged = StagedEntry {
        measurement: Measurement {
            site: catalog.full_name(catalog.key(&draft.site)).to_string(),
            date: draft.date,
            readings,
            notes: (!notes.is_empty()).then(|| notes.to_string()),
            user_id: user_id.map(str::to_string),
        },
        target: draft.target,
    };
    form.stage(staged)
}

/// `PendingConfirm -> Done`. On a store error the error is returned and the
/// caller keeps its pending state.
pub async fn commit<S: MeasurementStore + ?Sized>(
    form: EntryForm,
    store: &S,
) -> Result<EntryForm, DashboardError> {
    let staged = form
        .pending()
        .ok_or(DashboardError::InvalidState("no changes are awaiting confirmation"))?;
    let outcome = match staged.target {
        Some(id) => {
            store.update(id, &staged.measurement).await?;
            info!(
                "updated record {} ({} on {})",
                id, staged.measurement.site, staged.measurement.date
            );
            Outcome::Updated
        }
        None => {
            let id = store.insert(&staged.measurement).await?;
            info!(
                "inserted record {} ({} on {})",
                id, staged.measurement.site, staged.measurement.date
            );
            Outcome::Inserted
        }
    };
    form.finish(outcome)
}

/// Admin list delete: the first press arms, the second deletes.
pub async fn press_delete<S: MeasurementStore + ?Sized>(
    store: &S,
    guard: DeleteGuard,
    id: i64,
) -> Result<(DeleteGuard, DeleteAction), DashboardError> {
    let (next, action) = guard.press(id);
    if action == DeleteAction::Confirmed {
        store.delete(id).await?;
        info!("deleted record {}", id);
    }
    Ok((next, action))
}
