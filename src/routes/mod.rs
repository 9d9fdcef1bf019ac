//! HTTP handlers. Every handler follows the same shape: load the caller's
//! session, do the work, store the session back, then render or redirect.

pub mod account;
pub mod admin;
pub mod entry;
pub mod public;

use actix_web::{http::header, web, HttpResponse, HttpResponseBuilder};
use log::debug;

use crate::structures::{
    access::AccessPolicy,
    form::Notice,
    model::SiteInput,
    notify::MailSettings,
    session::{Session, SessionId, SessionStore},
    store::Store,
};

/// Read-only settings shared by all workers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub policy: AccessPolicy,
    pub mail: MailSettings,
    pub fallback_sites: Vec<SiteInput>,
}

#[derive(Debug, Clone, Default)]
pub struct Nav {
    pub email: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct NoticeView {
    pub level: &'static str,
    pub text: String,
}

impl From<Notice> for NoticeView {
    fn from(notice: Notice) -> Self {
        NoticeView {
            level: notice.level(),
            text: notice.text().to_string(),
        }
    }
}

/// One request's view of its session.
pub struct Visit {
    id: SessionId,
    pub session: Session,
    pub is_admin: bool,
}

impl Visit {
    pub async fn begin(
        store: &dyn Store,
        state: &AppState,
        sessions: &SessionStore,
        id: SessionId,
    ) -> Self {
        if id.is_fresh() {
            debug!("starting a new session");
        }
        let session = sessions.load(&id);
        let is_admin = match session.email() {
            Some(email) => state.policy.is_admin(store, email).await,
            None => false,
        };
        Visit {
            id,
            session,
            is_admin,
        }
    }

    pub fn signed_in(&self) -> bool {
        self.session.user.is_some()
    }

    pub fn nav(&self) -> Nav {
        Nav {
            email: self.session.email().map(str::to_string),
            is_admin: self.is_admin,
        }
    }

    pub fn notify(&mut self, notice: Notice) {
        self.session.notify(notice);
    }

    pub fn notices(&mut self) -> Vec<NoticeView> {
        self.session
            .take_notices()
            .into_iter()
            .map(NoticeView::from)
            .collect()
    }

    /// Moves the session to a new id and drops the old one. Called whenever
    /// the signed-in user changes.
    pub fn rotate(&mut self, sessions: &SessionStore) {
        sessions.remove(&self.id);
        self.id = SessionId::mint();
    }

    /// Stores the session and sets the cookie on `response` if there is
    /// anything to keep.
    fn persist(self, sessions: &SessionStore, response: &mut HttpResponseBuilder) {
        let cookie = self.id.cookie();
        if sessions.save(&self.id, self.session) {
            response.cookie(cookie);
        }
    }

    pub fn page(self, sessions: &SessionStore, body: String) -> HttpResponse {
        let mut response = HttpResponse::Ok();
        response.content_type("text/html");
        self.persist(sessions, &mut response);
        response.body(body)
    }

    pub fn redirect(self, sessions: &SessionStore, location: &str) -> HttpResponse {
        let mut response = HttpResponse::SeeOther();
        response.insert_header((header::LOCATION, location));
        self.persist(sessions, &mut response);
        response.finish()
    }

    pub fn require_login(mut self, sessions: &SessionStore) -> HttpResponse {
        self.notify(Notice::Warning("Please log in first.".to_string()));
        self.redirect(sessions, "/login")
    }

    pub fn require_admin(mut self, sessions: &SessionStore) -> HttpResponse {
        self.notify(Notice::Error("Admin access required.".to_string()));
        self.redirect(sessions, "/")
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(public::index_handler)
        .service(public::select_handler)
        .service(account::login_page)
        .service(account::login_handler)
        .service(account::signup_page)
        .service(account::signup_handler)
        .service(account::logout_handler)
        .service(entry::entry_page)
        .service(entry::submit_handler)
        .service(entry::confirm_handler)
        .service(entry::cancel_handler)
        .service(admin::entries_page)
        .service(admin::edit_entry_handler)
        .service(admin::delete_entry_handler)
        .service(admin::sites_page)
        .service(admin::add_site_handler)
        .service(admin::edit_site_handler)
        .service(admin::stage_site_handler)
        .service(admin::confirm_site_handler)
        .service(admin::cancel_site_handler)
        .service(admin::admins_page)
        .service(admin::create_admin_handler)
        .service(admin::revoke_admin_handler);
}

#[cfg(test)]
pub mod testing {
    //! Helpers for driving the handlers end to end.

    use std::sync::Arc;

    use actix_web::{
        body::MessageBody,
        cookie::Cookie,
        dev::ServiceResponse,
        test, web, App, Error,
    };

    use super::*;
    use crate::structures::{
        auth::{testing::FakeAuth, AuthProvider},
        memory::MemoryStore,
        session::SESSION_COOKIE,
        sites::builtin_sites,
    };

    pub const OWNER: &str = "owner@example.org";
    pub const VOLUNTEER: &str = "volunteer@example.org";
    pub const PASSWORD: &str = "hunter2";

    pub fn state() -> AppState {
        AppState {
            policy: AccessPolicy::new(OWNER),
            mail: MailSettings {
                server: "smtp.example.org".to_string(),
                port: 587,
                admin_email: OWNER.to_string(),
                password: None,
            },
            fallback_sites: builtin_sites(),
        }
    }

    pub fn auth() -> FakeAuth {
        FakeAuth::with_accounts(&[(OWNER, PASSWORD), (VOLUNTEER, PASSWORD)])
    }

    pub fn app(
        store: Arc<MemoryStore>,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl MessageBody>,
            Error = Error,
            InitError = (),
        >,
    > {
        app_with_sessions(store, web::Data::new(SessionStore::default()))
    }

    pub fn app_with_sessions(
        store: Arc<MemoryStore>,
        sessions: web::Data<SessionStore>,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl MessageBody>,
            Error = Error,
            InitError = (),
        >,
    > {
        let store: Arc<dyn Store> = store;
        let auth: Arc<dyn AuthProvider> = Arc::new(auth());
        App::new()
            .app_data(web::Data::from(store))
            .app_data(web::Data::from(auth))
            .app_data(web::Data::new(state()))
            .app_data(sessions)
            .configure(configure)
    }

    pub fn session_cookie<B>(response: &ServiceResponse<B>) -> Cookie<'static> {
        response
            .response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .map(|c| c.into_owned())
            .unwrap_or_else(|| Cookie::new(SESSION_COOKIE, ""))
    }

    pub fn location<B>(response: &ServiceResponse<B>) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    pub async fn body_text<B: MessageBody>(response: ServiceResponse<B>) -> String {
        String::from_utf8(test::read_body(response).await.to_vec()).unwrap()
    }

    pub fn login_request(email: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/login")
            .set_form([("email", email), ("password", PASSWORD)])
    }
}
