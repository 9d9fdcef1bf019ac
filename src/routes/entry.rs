use std::collections::HashMap;

use actix_web::{get, post, web, HttpResponse};
use askama::Template;
use log::warn;
use serde::Deserialize;
use time::OffsetDateTime;

use super::{AppState, Nav, NoticeView, Visit};
use crate::structures::{
    entry::{self, EntryDraft, EntrySubmission, OpenRequest, StagedEntry},
    errors::DashboardError,
    form::{FormState, Notice, Outcome},
    model::{display_date, parse_iso_date, Parameter},
    session::{SessionId, SessionStore},
    sites::SiteCatalog,
    store::Store,
};

pub struct SiteOption {
    pub full_name: String,
    pub short_name: String,
    pub selected: bool,
}

pub struct FieldView {
    pub column: &'static str,
    pub title: &'static str,
    pub value: String,
    pub not_available: bool,
    pub step: &'static str,
    pub min: String,
    pub max: String,
}

pub struct DraftView {
    pub date: String,
    pub is_update: bool,
    pub fields: Vec<FieldView>,
    pub notes: String,
}

impl DraftView {
    fn new(draft: &EntryDraft) -> Self {
        DraftView {
            date: draft.date.to_string(),
            is_update: draft.is_update(),
            fields: draft
                .fields
                .iter()
                .map(|(parameter, field)| {
                    let (min, max) = parameter
                        .range_hint()
                        .map(|(lo, hi)| (lo.to_string(), hi.to_string()))
                        .unwrap_or_default();
                    FieldView {
                        column: parameter.column(),
                        title: parameter.title(),
                        value: field.value.to_string(),
                        not_available: field.not_available,
                        step: parameter.step(),
                        min,
                        max,
                    }
                })
                .collect(),
            notes: draft.notes.clone(),
        }
    }
}

pub struct ValueLine {
    pub title: &'static str,
    pub value: String,
}

/// What is about to be written, for the confirmation panel.
pub struct PendingView {
    pub site: String,
    pub date: String,
    pub is_update: bool,
    pub values: Vec<ValueLine>,
    pub notes: Option<String>,
}

impl PendingView {
    fn new(staged: &StagedEntry, catalog: &SiteCatalog) -> Self {
        let measurement = &staged.measurement;
        PendingView {
            site: catalog.resolve_display_name(&measurement.site).to_string(),
            date: display_date(measurement.date),
            is_update: staged.target.is_some(),
            values: Parameter::ALL
                .into_iter()
                .filter_map(|p| {
                    measurement.readings.get(p).map(|v| ValueLine {
                        title: p.title(),
                        value: v.to_string(),
                    })
                })
                .collect(),
            notes: measurement.notes.clone(),
        }
    }
}

#[derive(Template)]
#[template(path = "entry.html")]
struct EntryTemplate {
    nav: Nav,
    notices: Vec<NoticeView>,
    sites: Vec<SiteOption>,
    draft: Option<DraftView>,
    pending: Option<PendingView>,
}

#[derive(Debug, Deserialize)]
pub struct EntryQuery {
    site: Option<String>,
    date: Option<String>,
}

/// Opens or re-renders the entry form. A pending chart/list selection wins,
/// then an explicit site/date, then whatever is already being edited.
#[get("/entry")]
pub async fn entry_page(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
    query: web::Query<EntryQuery>,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    if !visit.signed_in() {
        return Ok(visit.require_login(&sessions));
    }
    let catalog = SiteCatalog::load(store, &state.fallback_sites).await;
    let today = OffsetDateTime::now_utc().date();

    let request = match (visit.session.selection.take(), &query.site, &query.date) {
        (Some(id), ..) => Some(OpenRequest::Selected(id)),
        (None, None, None) => match visit.session.entry {
            FormState::Drafting(_) | FormState::PendingConfirm(_) => None,
            _ => Some(OpenRequest::Lookup { site: None, date: today }),
        },
        (None, site, date) => {
            let date = match date.as_deref().map(parse_iso_date) {
                Some(Ok(date)) => date,
                Some(Err(e)) => {
                    visit.notify(Notice::Error(e.to_string()));
                    today
                }
                None => today,
            };
            Some(OpenRequest::Lookup {
                site: site.clone(),
                date,
            })
        }
    };
    if let Some(request) = request {
        let (form, notice) = entry::open(store, &catalog, request).await;
        visit.session.entry = form;
        visit.notify(notice);
    }

    let chosen = visit
        .session
        .entry
        .draft()
        .map(|d| d.site.clone())
        .or_else(|| visit.session.entry.pending().map(|p| p.measurement.site.clone()))
        .unwrap_or_default();
    let sites = catalog
        .list_sites()
        .into_iter()
        .map(|(full_name, short_name)| SiteOption {
            full_name: full_name.to_string(),
            short_name: short_name.to_string(),
            selected: catalog.key(full_name) == catalog.key(&chosen),
        })
        .collect();
    let page = EntryTemplate {
        nav: visit.nav(),
        notices: visit.notices(),
        sites,
        draft: visit.session.entry.draft().map(DraftView::new),
        pending: visit
            .session
            .entry
            .pending()
            .map(|p| PendingView::new(p, &catalog)),
    };
    Ok(visit.page(&sessions, page.render()?))
}

#[post("/entry/submit")]
pub async fn submit_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    if !visit.signed_in() {
        return Ok(visit.require_login(&sessions));
    }
    let catalog = SiteCatalog::load(store, &state.fallback_sites).await;
    let user_id = visit.session.user.as_ref().map(|u| u.id.clone());

    let staged = EntrySubmission::from_form(&form).and_then(|submission| {
        entry::submit(
            visit.session.entry.clone(),
            &submission,
            &catalog,
            user_id.as_deref(),
        )
    });
    match staged {
        Ok(next) => visit.session.entry = next,
        Err(e) => visit.notify(Notice::Error(e.to_string())),
    }
    Ok(visit.redirect(&sessions, "/entry"))
}

#[post("/entry/confirm")]
pub async fn confirm_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    if !visit.signed_in() {
        return Ok(visit.require_login(&sessions));
    }
    match entry::commit(visit.session.entry.clone(), store).await {
        Ok(done) => {
            let message = match done.outcome() {
                Some(Outcome::Updated) => "Data updated successfully!",
                _ => "Data saved successfully!",
            };
            visit.session.entry = done;
            visit.notify(Notice::Success(message.to_string()));
        }
        Err(e) => {
            warn!("saving entry failed: {}", e);
            visit.notify(Notice::Error(format!("Error saving data: {}", e)));
        }
    }
    Ok(visit.redirect(&sessions, "/entry"))
}

#[post("/entry/cancel")]
pub async fn cancel_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
) -> Result<HttpResponse, DashboardError> {
    let mut visit = Visit::begin(store.get_ref(), &state, &sessions, sid).await;
    let entry = std::mem::take(&mut visit.session.entry);
    visit.session.entry = entry.cancel();
    visit.notify(Notice::Info("Changes discarded.".to_string()));
    Ok(visit.redirect(&sessions, "/entry"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::test;

    use super::*;
    use crate::routes::testing::*;
    use crate::structures::{
        memory::MemoryStore,
        store::{MeasurementStore, SortOrder},
    };

    /// POSTs to `uri` with the session cookie and returns the redirect target.
    macro_rules! post {
        ($app:expr, $uri:expr, $cookie:expr) => {{
            let req = test::TestRequest::post()
                .uri($uri)
                .cookie($cookie.clone())
                .to_request();
            location(&test::call_service($app, req).await).to_string()
        }};
        ($app:expr, $uri:expr, $cookie:expr, $form:expr) => {{
            let req = test::TestRequest::post()
                .uri($uri)
                .cookie($cookie.clone())
                .set_form($form)
                .to_request();
            location(&test::call_service($app, req).await).to_string()
        }};
    }

    fn values(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut values: Vec<_> = Parameter::ALL.iter().map(|p| (p.column(), "1")).collect();
        values.retain(|(k, _)| !extra.iter().any(|(e, _)| e == k));
        values.extend_from_slice(extra);
        values.push(("notes", "clear and cold"));
        values
    }

    #[actix_web::test]
    async fn test_entry_requires_login() {
        let app = test::init_service(app(Arc::new(MemoryStore::new()))).await;
        let req = test::TestRequest::get().uri("/entry").to_request();
        assert_eq!(location(&test::call_service(&app, req).await), "/login");
    }

    #[actix_web::test]
    async fn test_submit_confirm_then_resubmit_updates() {
        let store = Arc::new(MemoryStore::new());
        let app = test::init_service(app(store.clone())).await;
        let login = test::call_service(&app, login_request(VOLUNTEER).to_request()).await;
        let cookie = session_cookie(&login);
        let open = || {
            test::TestRequest::get()
                .uri("/entry?site=Swan%20River%20Reach%20A-%201007&date=2024-06-15")
                .cookie(cookie.clone())
                .to_request()
        };

        let body = body_text(test::call_service(&app, open()).await).await;
        assert!(body.contains("Creating new data entry"));

        assert_eq!(post!(&app, "/entry/submit", cookie, &values(&[("ph_na", "on")])), "/entry");
        let req = test::TestRequest::get().uri("/entry").cookie(cookie.clone()).to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains("action=\"/entry/confirm\""));
        assert!(body.contains("clear and cold"));
        assert_eq!(store.len(), 0);

        assert_eq!(post!(&app, "/entry/confirm", cookie), "/entry");
        assert_eq!(store.len(), 1);
        let saved = &store.fetch_all(SortOrder::Ascending).await.unwrap()[0];
        assert_eq!(saved.measurement.site, "Swan River Reach A- 1007");
        assert_eq!(saved.measurement.readings.ph, None);
        assert_eq!(saved.measurement.user_id.as_deref(), Some("id-volunteer@example.org"));

        let body = body_text(test::call_service(&app, open()).await).await;
        assert!(body.contains("Editing existing data entry"));
        post!(&app, "/entry/submit", cookie, &values(&[("flow", "4.5")]));
        post!(&app, "/entry/confirm", cookie);
        assert_eq!(store.len(), 1);
        let saved = &store.fetch_all(SortOrder::Ascending).await.unwrap()[0];
        assert_eq!(saved.measurement.readings.flow, Some(4.5));
    }

    #[actix_web::test]
    async fn test_cancel_discards_pending_entry() {
        let store = Arc::new(MemoryStore::new());
        let app = test::init_service(app(store.clone())).await;
        let login = test::call_service(&app, login_request(VOLUNTEER).to_request()).await;
        let cookie = session_cookie(&login);

        let req = test::TestRequest::get().uri("/entry").cookie(cookie.clone()).to_request();
        test::call_service(&app, req).await;
        post!(&app, "/entry/submit", cookie, &values(&[]));
        post!(&app, "/entry/cancel", cookie);
        post!(&app, "/entry/confirm", cookie);
        assert_eq!(store.len(), 0);
    }

    #[actix_web::test]
    async fn test_invalid_number_keeps_the_draft() {
        let store = Arc::new(MemoryStore::new());
        let app = test::init_service(app(store.clone())).await;
        let login = test::call_service(&app, login_request(VOLUNTEER).to_request()).await;
        let cookie = session_cookie(&login);

        let req = test::TestRequest::get().uri("/entry").cookie(cookie.clone()).to_request();
        test::call_service(&app, req).await;
        post!(&app, "/entry/submit", cookie, &values(&[("hardness", "lots")]));

        let req = test::TestRequest::get().uri("/entry").cookie(cookie).to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains("enter a number or tick"));
        assert!(body.contains("action=\"/entry/submit\""));
        assert_eq!(store.len(), 0);
    }
}
