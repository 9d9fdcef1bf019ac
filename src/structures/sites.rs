//! Site registry.
//!
//! Rows in `water_quality` name their site in one of two ways: records
//! written before the `sites` table existed use the tokens `Site 1` to
//! `Site 3`, newer ones use the site's full name. Both resolve to a single
//! [`SiteKey`] here, so nothing else in the crate compares site strings.

use log::{info, warn};
use serde::Deserialize;

use super::{
    errors::DashboardError,
    form::{FormState, Outcome},
    model::{Site, SiteInput},
    store::SiteStore,
};

/// A historical site token and the site it always meant.
#[derive(Debug, Clone, Copy)]
pub struct LegacySite {
    pub token: &'static str,
    pub full_name: &'static str,
    pub short_name: &'static str,
}

pub static LEGACY_SITES: [LegacySite; 3] = [
    LegacySite {
        token: "Site 1",
        full_name: "Blue River at Silverthorne Pavilion- 196",
        short_name: "Blue River",
    },
    LegacySite {
        token: "Site 2",
        full_name: "Snake River KSS- 52",
        short_name: "Snake River",
    },
    LegacySite {
        token: "Site 3",
        full_name: "Swan River Reach A- 1007",
        short_name: "Swan River",
    },
];

/// The sites shown when the `sites` table cannot be read.
pub fn builtin_sites() -> Vec<SiteInput> {
    vec![
        SiteInput {
            site_number: 196,
            full_name: LEGACY_SITES[0].full_name.to_string(),
            short_name: LEGACY_SITES[0].short_name.to_string(),
            latitude: 39.6297,
            longitude: -106.0711,
            elevation: Some(9035),
            description: Some(
                "Located at Silverthorne Pavilion, this site monitors the Blue River \
                 as it flows through the town of Silverthorne."
                    .to_string(),
            ),
        },
        SiteInput {
            site_number: 52,
            full_name: LEGACY_SITES[1].full_name.to_string(),
            short_name: LEGACY_SITES[1].short_name.to_string(),
            latitude: 39.6123,
            longitude: -106.0856,
            elevation: Some(9150),
            description: Some(
                "Monitoring location on the Snake River at Keystone Science School, \
                 providing data on this important tributary."
                    .to_string(),
            ),
        },
        SiteInput {
            site_number: 1007,
            full_name: LEGACY_SITES[2].full_name.to_string(),
            short_name: LEGACY_SITES[2].short_name.to_string(),
            latitude: 39.6445,
            longitude: -106.0789,
            elevation: Some(9200),
            description: Some(
                "Swan River monitoring site in Reach A, tracking water quality in this \
                 scenic mountain watershed."
                    .to_string(),
            ),
        },
    ]
}

/// Where a [`SiteCatalog`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteSource {
    FromStore,
    Default,
}

/// Canonical identity of whatever a record stores in its `site` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteKey<'a> {
    /// Index into the catalog.
    Catalog(usize),
    /// A legacy token whose site is missing from the catalog.
    Legacy(usize),
    /// Nothing known; shown as stored.
    Unmapped(&'a str),
}

#[derive(Debug, Clone)]
pub struct SiteCatalog {
    sites: Vec<Site>,
    source: SiteSource,
}

impl SiteCatalog {
    pub fn new(sites: Vec<Site>, source: SiteSource) -> Self {
        Self { sites, source }
    }

    pub fn defaults(fallback: &[SiteInput]) -> Self {
        let sites = fallback
            .iter()
            .cloned()
            .map(|details| Site { id: None, details })
            .collect();
        Self::new(sites, SiteSource::Default)
    }

    /// Reads the `sites` table, falling back to `fallback` when the read
    /// fails or returns nothing.
    pub async fn load<S: SiteStore + ?Sized>(store: &S, fallback: &[SiteInput]) -> Self {
        match store.list_sites().await {
            Ok(sites) if !sites.is_empty() => Self::new(sites, SiteSource::FromStore),
            Ok(_) => {
                info!("sites table is empty, using built-in sites");
                Self::defaults(fallback)
            }
            Err(e) => {
                warn!("could not load sites, using built-in sites: {}", e);
                Self::defaults(fallback)
            }
        }
    }

    pub fn source(&self) -> SiteSource {
        self.source
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn get(&self, index: usize) -> Option<&Site> {
        self.sites.get(index)
    }

    /// Ordered `(full_name, short_name)` pairs.
    pub fn list_sites(&self) -> Vec<(&str, &str)> {
        self.sites
            .iter()
            .map(|s| (s.details.full_name.as_str(), s.details.short_name.as_str()))
            .collect()
    }

    fn position(&self, full_name: &str) -> Option<usize> {
        self.sites
            .iter()
            .position(|s| s.details.full_name == full_name)
    }

    pub fn key<'a>(&self, stored: &'a str) -> SiteKey<'a> {
        if let Some(index) = self.position(stored) {
            return SiteKey::Catalog(index);
        }
        match LEGACY_SITES.iter().position(|l| l.token == stored) {
            Some(legacy) => match self.position(LEGACY_SITES[legacy].full_name) {
                Some(index) => SiteKey::Catalog(index),
                None => SiteKey::Legacy(legacy),
            },
            None => SiteKey::Unmapped(stored),
        }
    }

    pub fn short_name<'a>(&'a self, key: SiteKey<'a>) -> &'a str {
        match key {
            SiteKey::Catalog(index) => &self.sites[index].details.short_name,
            SiteKey::Legacy(legacy) => LEGACY_SITES[legacy].short_name,
            SiteKey::Unmapped(raw) => raw,
        }
    }

    pub fn full_name<'a>(&'a self, key: SiteKey<'a>) -> &'a str {
        match key {
            SiteKey::Catalog(index) => &self.sites[index].details.full_name,
            SiteKey::Legacy(legacy) => LEGACY_SITES[legacy].full_name,
            SiteKey::Unmapped(raw) => raw,
        }
    }

    /// Short name for a stored `site` value; unknown values come back as-is.
    pub fn resolve_display_name<'a>(&'a self, stored: &'a str) -> &'a str {
        self.short_name(self.key(stored))
    }

    /// Every string a record for `full_name` may be stored under, newest
    /// convention first.
    pub fn stored_aliases<'a>(&self, full_name: &'a str) -> Vec<&'a str> {
        let mut aliases = vec![full_name];
        aliases.extend(
            LEGACY_SITES
                .iter()
                .filter(|l| l.full_name == full_name)
                .map(|l| l.token),
        );
        aliases
    }
}

fn require(value: &str, field: &str) -> Result<(), DashboardError> {
    match value.trim().is_empty() {
        true => Err(DashboardError::Validation(format!("{} is required", field))),
        false => Ok(()),
    }
}

/// Adds a site after checking the fields the dashboard cannot do without.
pub async fn add_site<S: SiteStore + ?Sized>(
    store: &S,
    site: &SiteInput,
) -> Result<i32, DashboardError> {
    require(&site.full_name, "Full site name")?;
    require(&site.short_name, "Short name")?;
    require(site.description.as_deref().unwrap_or_default(), "Description")?;
    let id = store.add_site(site).await?;
    info!("added site {} ({}) as id {}", site.short_name, site.full_name, id);
    Ok(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteUpdate {
    Updated,
    /// The site has no stored id (it came from the fallback list); nothing written.
    MissingId,
}

pub async fn update_site<S: SiteStore + ?Sized>(
    store: &S,
    id: Option<i32>,
    site: &SiteInput,
) -> Result<SiteUpdate, DashboardError> {
    let Some(id) = id else {
        warn!("site {} has no id, update skipped", site.full_name);
        return Ok(SiteUpdate::MissingId);
    };
    require(&site.full_name, "Full site name")?;
    require(&site.short_name, "Short name")?;
    store.update_site(id, site).await?;
    info!("updated site {} ({})", id, site.full_name);
    Ok(SiteUpdate::Updated)
}

/// The site add/edit form as posted; numbers arrive as text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteFields {
    pub site_number: String,
    pub full_name: String,
    pub short_name: String,
    pub latitude: String,
    pub longitude: String,
    #[serde(default)]
    pub elevation: String,
    #[serde(default)]
    pub description: String,
}

fn number<T: std::str::FromStr>(value: &str, field: &str) -> Result<T, DashboardError> {
    value
        .trim()
        .parse()
        .map_err(|_| DashboardError::Validation(format!("{} must be a number", field)))
}

impl SiteFields {
    pub fn parse(&self) -> Result<SiteInput, DashboardError> {
        let elevation = match self.elevation.trim() {
            "" => None,
            raw => Some(number(raw, "Elevation")?),
        };
        let description = self.description.trim();
        Ok(SiteInput {
            site_number: number(&self.site_number, "Site number")?,
            full_name: self.full_name.trim().to_string(),
            short_name: self.short_name.trim().to_string(),
            latitude: number(&self.latitude, "Latitude")?,
            longitude: number(&self.longitude, "Longitude")?,
            elevation,
            description: (!description.is_empty()).then(|| description.to_string()),
        })
    }
}

/// A site opened for editing from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteDraft {
    pub index: usize,
    pub target: Option<i32>,
    pub input: SiteInput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagedSite {
    pub target: Option<i32>,
    pub input: SiteInput,
}

pub type SiteForm = FormState<SiteDraft, StagedSite>;

impl SiteDraft {
    pub fn from_catalog(catalog: &SiteCatalog, index: usize) -> Option<Self> {
        catalog.get(index).map(|site| SiteDraft {
            index,
            target: site.id,
            input: site.details.clone(),
        })
    }
}

/// `Drafting -> PendingConfirm`.
pub fn stage_site(form: SiteForm, fields: &SiteFields) -> Result<SiteForm, DashboardError> {
    let draft = form
        .draft()
        .ok_or(DashboardError::InvalidState("no site is being edited"))?;
    let input = fields.parse()?;
    require(&input.full_name, "Full site name")?;
    require(&input.short_name, "Short name")?;
    let staged = StagedSite {
        target: draft.target,
        input,
    };
    form.stage(staged)
}

/// `PendingConfirm -> Done`. A site without a stored id finishes as
/// [`Outcome::Skipped`].
pub async fn commit_site<S: SiteStore + ?Sized>(
    form: SiteForm,
    store: &S,
) -> Result<SiteForm, DashboardError> {
    let staged = form
        .pending()
        .ok_or(DashboardError::InvalidState("no site changes are awaiting confirmation"))?;
    let outcome = match update_site(store, staged.target, &staged.input).await? {
        SiteUpdate::Updated => Outcome::Updated,
        SiteUpdate::MissingId => Outcome::Skipped,
    };
    form.finish(outcome)
}
