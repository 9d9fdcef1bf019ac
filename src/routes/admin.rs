//! Admin-only pages: record list, site management and admin accounts.

use actix_web::{get, post, web, HttpResponse};
use askama::Template;
use log::warn;

use super::{public::SiteView, AppState, Nav, NoticeView, Visit};
use crate::structures::{
    access::{create_admin, revoke_admin, AdminGrant, NewAdmin},
    auth::AuthProvider,
    entry::{press_delete, EntryForm},
    errors::DashboardError,
    form::{DeleteAction, DeleteGuard, Notice, Outcome},
    model::{display_date, Parameter, SiteInput},
    session::{SessionId, SessionStore},
    sites::{
        self, commit_site, stage_site, SiteCatalog, SiteDraft, SiteFields, SiteForm, SiteSource,
    },
    store::{SortOrder, Store},
};

pub struct EntryRow {
    pub id: i64,
    pub site: String,
    pub date: String,
    pub values: Vec<String>,
    pub notes: String,
    pub armed: bool,
}

#[derive(Template)]
#[template(path = "entries.html")]
struct EntriesTemplate {
    nav: Nav,
    notices: Vec<NoticeView>,
    headers: Vec<&'static str>,
    rows: Vec<EntryRow>,
}

/// Site form values as the inputs show them.
pub struct SiteFormView {
    pub site_number: String,
    pub full_name: String,
    pub short_name: String,
    pub latitude: String,
    pub longitude: String,
    pub elevation: String,
    pub description: String,
}

impl From<&SiteInput> for SiteFormView {
    fn from(input: &SiteInput) -> Self {
        SiteFormView {
            site_number: input.site_number.to_string(),
            full_name: input.full_name.clone(),
            short_name: input.short_name.clone(),
            latitude: input.latitude.to_string(),
            longitude: input.longitude.to_string(),
            elevation: input.elevation.map(|e| e.to_string()).unwrap_or_default(),
            description: input.description.clone().unwrap_or_default(),
        }
    }
}

#[derive(Template)]
#[template(path = "sites.html")]
struct SitesTemplate {
    nav: Nav,
    notices: Vec<NoticeView>,
    builtin_sites: bool,
    sites: Vec<SiteView>,
    edit_index: usize,
    editing: Option<SiteFormView>,
    /// Whether the staged site has a database row to update.
    pending_stored: bool,
    pending: Option<SiteFormView>,
}

pub struct AdminRow {
    pub id: Option<i64>,
    pub email: String,
    pub approved_by: String,
    pub approved_at: String,
}

#[derive(Template)]
#[template(path = "admins.html")]
struct AdminsTemplate {
    nav: Nav,
    notices: Vec<NoticeView>,
    admins: Vec<AdminRow>,
}

#[get("/admin/entries")]
pub async fn entries_page(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    if !visit.is_admin {
        return Ok(visit.require_admin(&sessions));
    }
    let catalog = SiteCatalog::load(store, &state.fallback_sites).await;
    let records = match store.fetch_all(SortOrder::Descending).await {
        Ok(records) => records,
        Err(e) => {
            warn!("loading records failed: {}", e);
            visit.notify(Notice::Error(format!("Error loading data: {}", e)));
            Vec::new()
        }
    };
    let armed = visit.session.delete_guard.armed();
    let rows = records
        .iter()
        .map(|record| {
            let m = &record.measurement;
            EntryRow {
                id: record.id,
                site: catalog.resolve_display_name(&m.site).to_string(),
                date: display_date(m.date),
                values: Parameter::ALL
                    .into_iter()
                    .map(|p| m.readings.get(p).map(|v| v.to_string()).unwrap_or_default())
                    .collect(),
                notes: m.notes.clone().unwrap_or_default(),
                armed: armed == Some(record.id),
            }
        })
        .collect();
    let page = EntriesTemplate {
        nav: visit.nav(),
        notices: visit.notices(),
        headers: Parameter::ALL.into_iter().map(Parameter::title).collect(),
        rows,
    };
    Ok(visit.page(&sessions, page.render()?))
}

#[post("/admin/entries/{id}/edit")]
pub async fn edit_entry_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
    path: web::Path<i64>,
) -> Result<HttpResponse, DashboardError> {
    let mut visit = Visit::begin(store.get_ref(), &state, &sessions, sid).await;
    if !visit.is_admin {
        return Ok(visit.require_admin(&sessions));
    }
    visit.session.selection = Some(path.into_inner());
    visit.session.entry = EntryForm::Idle;
    visit.session.delete_guard = DeleteGuard::default();
    Ok(visit.redirect(&sessions, "/entry"))
}

#[post("/admin/entries/{id}/delete")]
pub async fn delete_entry_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
    path: web::Path<i64>,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    if !visit.is_admin {
        return Ok(visit.require_admin(&sessions));
    }
    let id = path.into_inner();
    match press_delete(store, visit.session.delete_guard, id).await {
        Ok((guard, DeleteAction::Armed)) => {
            visit.session.delete_guard = guard;
            visit.notify(Notice::Warning(format!(
                "Press delete again to permanently remove entry {}.",
                id
            )));
        }
        Ok((guard, DeleteAction::Confirmed)) => {
            visit.session.delete_guard = guard;
            visit.notify(Notice::Success("Entry deleted successfully!".to_string()));
        }
        Err(e) => {
            warn!("deleting record {} failed: {}", id, e);
            visit.session.delete_guard = DeleteGuard::default();
            visit.notify(Notice::Error(format!("Error deleting entry: {}", e)));
        }
    }
    Ok(visit.redirect(&sessions, "/admin/entries"))
}

#[get("/admin/sites")]
pub async fn sites_page(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    if !visit.is_admin {
        return Ok(visit.require_admin(&sessions));
    }
    let catalog = SiteCatalog::load(store, &state.fallback_sites).await;
    let site_edit = &visit.session.site_edit;
    let page = SitesTemplate {
        builtin_sites: catalog.source() == SiteSource::Default,
        sites: SiteView::list(&catalog),
        edit_index: site_edit.draft().map(|d| d.index).unwrap_or_default(),
        editing: site_edit.draft().map(|d| SiteFormView::from(&d.input)),
        pending_stored: site_edit.pending().is_some_and(|p| p.target.is_some()),
        pending: site_edit.pending().map(|p| SiteFormView::from(&p.input)),
        nav: visit.nav(),
        notices: visit.notices(),
    };
    Ok(visit.page(&sessions, page.render()?))
}

#[post("/admin/sites")]
pub async fn add_site_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
    form: web::Form<SiteFields>,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    if !visit.is_admin {
        return Ok(visit.require_admin(&sessions));
    }
    let added = match form.parse() {
        Ok(input) => sites::add_site(store, &input).await.map(|_| input),
        Err(e) => Err(e),
    };
    match added {
        Ok(input) => visit.notify(Notice::Success(format!(
            "Site '{}' added successfully!",
            input.short_name
        ))),
        Err(e) => {
            warn!("adding site failed: {}", e);
            visit.notify(Notice::Error(format!("Error adding site: {}", e)));
        }
    }
    Ok(visit.redirect(&sessions, "/admin/sites"))
}

#[post("/admin/sites/{index}/edit")]
pub async fn edit_site_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
    path: web::Path<usize>,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    if !visit.is_admin {
        return Ok(visit.require_admin(&sessions));
    }
    let catalog = SiteCatalog::load(store, &state.fallback_sites).await;
    match SiteDraft::from_catalog(&catalog, path.into_inner()) {
        Some(draft) => visit.session.site_edit = SiteForm::open(draft),
        None => visit.notify(Notice::Error("That site no longer exists.".to_string())),
    }
    Ok(visit.redirect(&sessions, "/admin/sites"))
}

#[post("/admin/sites/{index}/stage")]
pub async fn stage_site_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
    path: web::Path<usize>,
    form: web::Form<SiteFields>,
) -> Result<HttpResponse, DashboardError> {
    let mut visit = Visit::begin(store.get_ref(), &state, &sessions, sid).await;
    if !visit.is_admin {
        return Ok(visit.require_admin(&sessions));
    }
    let index = path.into_inner();
    let current = visit.session.site_edit.clone();
    let staged = match current.draft() {
        Some(draft) if draft.index == index => stage_site(current, &form),
        _ => Err(DashboardError::InvalidState("that site is not being edited")),
    };
    match staged {
        Ok(next) => visit.session.site_edit = next,
        Err(e) => visit.notify(Notice::Error(e.to_string())),
    }
    Ok(visit.redirect(&sessions, "/admin/sites"))
}

#[post("/admin/sites/confirm")]
pub async fn confirm_site_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    if !visit.is_admin {
        return Ok(visit.require_admin(&sessions));
    }
    match commit_site(visit.session.site_edit.clone(), store).await {
        Ok(done) => {
            let notice = match done.outcome() {
                Some(Outcome::Skipped) => Notice::Warning(
                    "This site comes from the built-in list and has no database id; \
                     nothing was saved."
                        .to_string(),
                ),
                _ => Notice::Success("Site updated successfully!".to_string()),
            };
            visit.session.site_edit = done;
            visit.notify(notice);
        }
        Err(e) => {
            warn!("updating site failed: {}", e);
            visit.notify(Notice::Error(format!("Error updating site: {}", e)));
        }
    }
    Ok(visit.redirect(&sessions, "/admin/sites"))
}

#[post("/admin/sites/cancel")]
pub async fn cancel_site_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
) -> Result<HttpResponse, DashboardError> {
    let mut visit = Visit::begin(store.get_ref(), &state, &sessions, sid).await;
    if !visit.is_admin {
        return Ok(visit.require_admin(&sessions));
    }
    let site_edit = std::mem::take(&mut visit.session.site_edit);
    visit.session.site_edit = site_edit.cancel();
    visit.notify(Notice::Info("Site changes discarded.".to_string()));
    Ok(visit.redirect(&sessions, "/admin/sites"))
}

#[get("/admin/admins")]
pub async fn admins_page(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    if !visit.is_admin {
        return Ok(visit.require_admin(&sessions));
    }
    let mut admins = vec![AdminRow {
        id: None,
        email: state.policy.admin_email().to_string(),
        approved_by: "configuration".to_string(),
        approved_at: String::new(),
    }];
    match store.list_approved_admins().await {
        Ok(rows) => admins.extend(
            rows.into_iter()
                .filter(|a| a.email != state.policy.admin_email())
                .map(|a| AdminRow {
                    id: Some(a.id),
                    email: a.email,
                    approved_by: a.approved_by.unwrap_or_default(),
                    approved_at: a
                        .approved_at
                        .map(|at| display_date(at.date()))
                        .unwrap_or_default(),
                }),
        ),
        Err(e) => {
            warn!("loading admins failed: {}", e);
            visit.notify(Notice::Error(format!("Error loading admins: {}", e)));
        }
    }
    let page = AdminsTemplate {
        nav: visit.nav(),
        notices: visit.notices(),
        admins,
    };
    Ok(visit.page(&sessions, page.render()?))
}

#[post("/admin/admins")]
pub async fn create_admin_handler(
    store: web::Data<dyn Store>,
    auth: web::Data<dyn AuthProvider>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
    form: web::Form<NewAdmin>,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    if !visit.is_admin {
        return Ok(visit.require_admin(&sessions));
    }
    let approved_by = visit.session.email().unwrap_or_default().to_string();
    let email = form.email.trim().to_string();
    let notice = match create_admin(store, auth.get_ref(), &form, &approved_by).await {
        Ok(AdminGrant::Created) => {
            Notice::Success(format!("Admin account created for {}.", email))
        }
        Ok(AdminGrant::Promoted) => Notice::Success(format!(
            "{} was already registered; admin access restored.",
            email
        )),
        Ok(AdminGrant::Added) => Notice::Success(format!(
            "{} was already registered; admin access granted.",
            email
        )),
        Err(e) => {
            warn!("creating admin {} failed: {}", email, e);
            Notice::Error(format!("Error creating admin: {}", e))
        }
    };
    visit.notify(notice);
    Ok(visit.redirect(&sessions, "/admin/admins"))
}

#[post("/admin/admins/{id}/revoke")]
pub async fn revoke_admin_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
    path: web::Path<i64>,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    if !visit.is_admin {
        return Ok(visit.require_admin(&sessions));
    }
    match revoke_admin(store, path.into_inner()).await {
        Ok(()) => visit.notify(Notice::Success("Admin access revoked.".to_string())),
        Err(e) => {
            warn!("revoking admin failed: {}", e);
            visit.notify(Notice::Error(format!("Error revoking admin: {}", e)));
        }
    }
    Ok(visit.redirect(&sessions, "/admin/admins"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::test;
    use time::macros::date;

    use crate::routes::testing::*;
    use crate::structures::{
        memory::MemoryStore,
        model::{Measurement, Readings},
        sites::builtin_sites,
        store::{AdminStore, MeasurementStore, SiteStore},
    };

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

    async fn with_record(store: &MemoryStore) -> i64 {
        store
            .insert(&Measurement {
                site: "Site 2".to_string(),
                date: date!(2023 - 09 - 12),
                readings: Readings::default(),
                notes: Some("low water".to_string()),
                user_id: None,
            })
            .await
            .unwrap()
    }

    fn site_form(short_name: &str) -> Vec<(&'static str, String)> {
        vec![
            ("site_number", "196".to_string()),
            ("full_name", "Blue River at Silverthorne Pavilion- 196".to_string()),
            ("short_name", short_name.to_string()),
            ("latitude", "39.6297".to_string()),
            ("longitude", "-106.0711".to_string()),
            ("elevation", "9035".to_string()),
            ("description", "Pavilion".to_string()),
        ]
    }

    #[actix_web::test]
    async fn test_admin_pages_turn_visitors_away() {
        let app = test::init_service(app(Arc::new(MemoryStore::new()))).await;
        let login = test::call_service(&app, login_request(VOLUNTEER).to_request()).await;
        let cookie = session_cookie(&login);
        for uri in ["/admin/entries", "/admin/sites", "/admin/admins"] {
            let req = test::TestRequest::get().uri(uri).cookie(cookie.clone()).to_request();
            assert_eq!(location(&test::call_service(&app, req).await), "/", "{}", uri);
        }
    }

    #[actix_web::test]
    async fn test_entry_list_shows_short_names_and_deletes_on_second_press() {
        let store = Arc::new(MemoryStore::new());
        let id = with_record(&store).await;
        let app = test::init_service(app(store.clone())).await;
        let login = test::call_service(&app, login_request(OWNER).to_request()).await;
        let cookie = session_cookie(&login);

        let req = test::TestRequest::get().uri("/admin/entries").cookie(cookie.clone()).to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains("Snake River"));
        assert!(body.contains("low water"));

        let uri = format!("/admin/entries/{}/delete", id);
        post!(&app, &uri, cookie);
        assert_eq!(store.len(), 1);
        post!(&app, &uri, cookie);
        assert_eq!(store.len(), 0);
    }

    #[actix_web::test]
    async fn test_list_edit_hands_the_record_to_the_entry_form() {
        let store = Arc::new(MemoryStore::new());
        let id = with_record(&store).await;
        let app = test::init_service(app(store.clone())).await;
        let login = test::call_service(&app, login_request(OWNER).to_request()).await;
        let cookie = session_cookie(&login);

        let uri = format!("/admin/entries/{}/edit", id);
        assert_eq!(post!(&app, &uri, cookie), "/entry");
        let req = test::TestRequest::get().uri("/entry").cookie(cookie).to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains("Editing: Snake River - 09"));
        assert!(body.contains("low water"));
    }

    #[actix_web::test]
    async fn test_site_edit_waits_for_confirmation() {
        let store = Arc::new(MemoryStore::new());
        store.add_site(&builtin_sites()[0]).await.unwrap();
        let app = test::init_service(app(store.clone())).await;
        let login = test::call_service(&app, login_request(OWNER).to_request()).await;
        let cookie = session_cookie(&login);

        post!(&app, "/admin/sites/0/edit", cookie);
        post!(&app, "/admin/sites/0/stage", cookie, &site_form("Blue"));
        assert_eq!(store.list_sites().await.unwrap()[0].details.short_name, "Blue River");

        post!(&app, "/admin/sites/confirm", cookie);
        assert_eq!(store.list_sites().await.unwrap()[0].details.short_name, "Blue");
    }

    #[actix_web::test]
    async fn test_site_add_requires_description() {
        let store = Arc::new(MemoryStore::new());
        let app = test::init_service(app(store.clone())).await;
        let login = test::call_service(&app, login_request(OWNER).to_request()).await;
        let cookie = session_cookie(&login);

        let mut form = site_form("Blue");
        form.retain(|(k, _)| *k != "description");
        post!(&app, "/admin/sites", cookie, &form);
        assert!(store.list_sites().await.unwrap().is_empty());

        post!(&app, "/admin/sites", cookie, &site_form("Blue"));
        assert_eq!(store.list_sites().await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_created_admin_can_be_revoked() {
        let store = Arc::new(MemoryStore::new());
        let app = test::init_service(app(store.clone())).await;
        let login = test::call_service(&app, login_request(OWNER).to_request()).await;
        let cookie = session_cookie(&login);

        let form = [
            ("email", VOLUNTEER),
            ("password", PASSWORD),
            ("confirm_password", PASSWORD),
        ];
        assert_eq!(post!(&app, "/admin/admins", cookie, &form), "/admin/admins");
        let row = store.find_admin(VOLUNTEER).await.unwrap().unwrap();
        assert!(row.is_approved());

        let req = test::TestRequest::get().uri("/admin/admins").cookie(cookie.clone()).to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains(VOLUNTEER));
        assert!(body.contains("already registered"));

        post!(&app, &format!("/admin/admins/{}/revoke", row.id), cookie);
        assert!(!store.is_approved_admin(VOLUNTEER).await.unwrap());
    }
}
