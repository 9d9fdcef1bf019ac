use actix_web::{get, post, web, HttpResponse};
use askama::Template;
use log::{debug, warn};
use serde::Deserialize;

use super::{AppState, Nav, NoticeView, Visit};
use crate::structures::{
    chart::{build_chart, build_charts},
    entry::EntryForm,
    errors::DashboardError,
    form::Notice,
    model::{MeasurementRecord, Parameter},
    session::{SessionId, SessionStore},
    sites::{SiteCatalog, SiteSource},
    store::{SortOrder, Store},
};

pub struct SiteView {
    pub site_number: i32,
    pub full_name: String,
    pub short_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: String,
    pub description: String,
}

impl SiteView {
    pub fn list(catalog: &SiteCatalog) -> Vec<SiteView> {
        catalog
            .sites()
            .iter()
            .map(|site| SiteView {
                site_number: site.details.site_number,
                full_name: site.details.full_name.clone(),
                short_name: site.details.short_name.clone(),
                latitude: site.details.latitude,
                longitude: site.details.longitude,
                elevation: site
                    .details
                    .elevation
                    .map(|e| format!("{} ft", e))
                    .unwrap_or_else(|| "n/a".to_string()),
                description: site.details.description.clone().unwrap_or_default(),
            })
            .collect()
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    nav: Nav,
    notices: Vec<NoticeView>,
    charts_json: String,
    interactive: bool,
    show_sites: bool,
    builtin_sites: bool,
    sites: Vec<SiteView>,
}

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    panel: Option<String>,
}

async fn load_records(store: &dyn Store, visit: &mut Visit) -> Vec<MeasurementRecord> {
    match store.fetch_all(SortOrder::Ascending).await {
        Ok(records) => records,
        Err(e) => {
            warn!("loading records failed: {}", e);
            visit.notify(Notice::Error(format!("Error loading data: {}", e)));
            Vec::new()
        }
    }
}

#[get("/")]
pub async fn index_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
    query: web::Query<IndexQuery>,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    let records = load_records(store, &mut visit).await;
    let catalog = SiteCatalog::load(store, &state.fallback_sites).await;

    // keep the JSON from closing the surrounding <script>
    let charts_json =
        serde_json::to_string(&build_charts(&records, &catalog))?.replace("</", "<\\/");
    let index = IndexTemplate {
        nav: visit.nav(),
        notices: visit.notices(),
        charts_json,
        interactive: visit.is_admin,
        show_sites: query.panel.as_deref() == Some("sites"),
        builtin_sites: catalog.source() == SiteSource::Default,
        sites: SiteView::list(&catalog),
    };
    Ok(visit.page(&sessions, index.render()?))
}

#[derive(Debug, Deserialize)]
pub struct ChartClick {
    parameter: String,
    curve: usize,
    point: usize,
}

/// Resolves a chart click to a record and hands it to the entry form.
#[post("/chart/select")]
pub async fn select_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
    click: web::Form<ChartClick>,
) -> Result<HttpResponse, DashboardError> {
    let store = store.get_ref();
    let mut visit = Visit::begin(store, &state, &sessions, sid).await;
    if !visit.is_admin {
        debug!("ignoring chart click from non-admin");
        return Ok(visit.redirect(&sessions, "/"));
    }
    let Some(parameter) = Parameter::from_column(&click.parameter) else {
        debug!("ignoring chart click on unknown parameter {}", click.parameter);
        return Ok(visit.redirect(&sessions, "/"));
    };

    let records = load_records(store, &mut visit).await;
    let catalog = SiteCatalog::load(store, &state.fallback_sites).await;
    let chart = build_chart(&records, &catalog, parameter);
    match chart.resolve_click(click.curve, click.point) {
        Some(id) => {
            debug!("chart click {}:{} selected record {}", click.curve, click.point, id);
            visit.session.selection = Some(id);
            visit.session.entry = EntryForm::Idle;
            Ok(visit.redirect(&sessions, "/entry"))
        }
        None => {
            debug!("chart click {}:{} out of range", click.curve, click.point);
            Ok(visit.redirect(&sessions, "/"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{test, web};
    use time::macros::date;

    use crate::routes::testing::*;
    use crate::structures::{
        memory::MemoryStore,
        session::SessionStore,
        model::{Measurement, Readings},
        store::MeasurementStore,
    };

    async fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut readings = Readings::default();
        readings.ph = Some(7.4);
        store
            .insert(&Measurement {
                site: "Site 1".to_string(),
                date: date!(2024 - 05 - 01),
                readings,
                notes: None,
                user_id: None,
            })
            .await
            .unwrap();
        store
    }

    fn click(curve: &str, point: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/chart/select")
            .set_form([("parameter", "ph"), ("curve", curve), ("point", point)])
    }

    #[actix_web::test]
    async fn test_index_renders_static_charts_for_visitors() {
        let app = test::init_service(app(seeded().await)).await;
        let req = test::TestRequest::get().uri("/").to_request();
        let response = test::call_service(&app, req).await;
        assert!(response.status().is_success());
        let body = body_text(response).await;
        assert!(body.contains("pH (S.U.s) - All Sites"));
        assert!(body.contains("const interactive = false;"));
    }

    #[actix_web::test]
    async fn test_anonymous_visits_leave_no_session_behind() {
        let sessions = web::Data::new(SessionStore::default());
        let app = test::init_service(app_with_sessions(seeded().await, sessions.clone())).await;
        for _ in 0..50 {
            let req = test::TestRequest::get().uri("/").to_request();
            let response = test::call_service(&app, req).await;
            assert!(response.status().is_success());
            assert!(response.response().cookies().next().is_none());
        }
        assert_eq!(sessions.len(), 0);
    }

    #[actix_web::test]
    async fn test_sites_panel_lists_metadata() {
        let app = test::init_service(app(seeded().await)).await;
        let req = test::TestRequest::get().uri("/?panel=sites").to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains("Snake River KSS- 52"));
        assert!(body.contains("9150 ft"));
    }

    #[actix_web::test]
    async fn test_visitor_click_is_ignored() {
        let app = test::init_service(app(seeded().await)).await;
        let login = test::call_service(&app, login_request(VOLUNTEER).to_request()).await;
        let cookie = session_cookie(&login);
        let req = click("0", "0").cookie(cookie).to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(location(&response), "/");
    }

    #[actix_web::test]
    async fn test_admin_click_opens_the_record_for_editing() {
        let app = test::init_service(app(seeded().await)).await;
        let login = test::call_service(&app, login_request(OWNER).to_request()).await;
        let cookie = session_cookie(&login);

        let req = click("0", "0").cookie(cookie.clone()).to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(location(&response), "/entry");

        let req = test::TestRequest::get().uri("/entry").cookie(cookie).to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains("Editing: Blue River - 05"));
        assert!(body.contains("value=\"7.4\""));
    }

    #[actix_web::test]
    async fn test_out_of_range_click_changes_nothing() {
        let app = test::init_service(app(seeded().await)).await;
        let login = test::call_service(&app, login_request(OWNER).to_request()).await;
        let cookie = session_cookie(&login);
        let req = click("0", "5").cookie(cookie).to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(location(&response), "/");
    }
}
