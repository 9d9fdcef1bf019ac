use actix_web::{get, post, web, HttpResponse};
use askama::Template;
use log::{info, warn};
use serde::Deserialize;
use time::OffsetDateTime;

use super::{AppState, Nav, NoticeView, Visit};
use crate::structures::{
    access::NewAdmin,
    auth::AuthProvider,
    errors::DashboardError,
    form::Notice,
    notify::{notify_admin, Delivery},
    session::{SessionId, SessionStore},
    store::Store,
};

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    nav: Nav,
    notices: Vec<NoticeView>,
}

#[derive(Template)]
#[template(path = "signup.html")]
struct SignupTemplate {
    nav: Nav,
    notices: Vec<NoticeView>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

#[get("/login")]
pub async fn login_page(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
) -> Result<HttpResponse, DashboardError> {
    let mut visit = Visit::begin(store.get_ref(), &state, &sessions, sid).await;
    let page = LoginTemplate {
        nav: visit.nav(),
        notices: visit.notices(),
    };
    Ok(visit.page(&sessions, page.render()?))
}

#[post("/login")]
pub async fn login_handler(
    store: web::Data<dyn Store>,
    auth: web::Data<dyn AuthProvider>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, DashboardError> {
    let mut visit = Visit::begin(store.get_ref(), &state, &sessions, sid).await;
    match auth.sign_in(form.email.trim(), &form.password).await {
        Ok(signed_in) => {
            info!("{} logged in", signed_in.user.email);
            visit.rotate(&sessions);
            visit.session.sign_in(signed_in, OffsetDateTime::now_utc());
            visit.notify(Notice::Success("Logged in successfully.".to_string()));
            Ok(visit.redirect(&sessions, "/"))
        }
        Err(e) => {
            warn!("login for {} failed: {}", form.email, e);
            visit.notify(Notice::Error(
                "Login failed. Please check your email and password.".to_string(),
            ));
            Ok(visit.redirect(&sessions, "/login"))
        }
    }
}

#[get("/signup")]
pub async fn signup_page(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
) -> Result<HttpResponse, DashboardError> {
    let mut visit = Visit::begin(store.get_ref(), &state, &sessions, sid).await;
    let page = SignupTemplate {
        nav: visit.nav(),
        notices: visit.notices(),
    };
    Ok(visit.page(&sessions, page.render()?))
}

/// Creates an account and asks the administrator, by email, to approve it.
#[post("/signup")]
pub async fn signup_handler(
    store: web::Data<dyn Store>,
    auth: web::Data<dyn AuthProvider>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
    form: web::Form<NewAdmin>,
) -> Result<HttpResponse, DashboardError> {
    let mut visit = Visit::begin(store.get_ref(), &state, &sessions, sid).await;
    if let Err(e) = form.validate() {
        visit.notify(Notice::Error(e.to_string()));
        return Ok(visit.redirect(&sessions, "/signup"));
    }
    let email = form.email.trim().to_string();
    match auth.sign_up(&email, &form.password).await {
        Ok(_) => info!("{} signed up", email),
        Err(DashboardError::AlreadyRegistered) => {
            visit.notify(Notice::Error("This email is already registered.".to_string()));
            return Ok(visit.redirect(&sessions, "/signup"));
        }
        Err(e) => {
            warn!("sign-up for {} failed: {}", email, e);
            visit.notify(Notice::Error(format!("Sign-up failed: {}", e)));
            return Ok(visit.redirect(&sessions, "/signup"));
        }
    }

    let mail = state.mail.clone();
    let delivery = web::block(move || notify_admin(&mail, &email)).await?;
    match delivery {
        Ok(Delivery::Sent) => visit.notify(Notice::Success(
            "Sign-up successful! The administrator has been notified of your request."
                .to_string(),
        )),
        Ok(Delivery::NotConfigured) => {
            visit.notify(Notice::Success("Sign-up successful!".to_string()));
            visit.notify(Notice::Warning(
                "Email notification is not configured. Please contact the administrator \
                 directly to request access."
                    .to_string(),
            ));
        }
        Err(e) => {
            warn!("admin notification failed: {}", e);
            visit.notify(Notice::Success("Sign-up successful!".to_string()));
            visit.notify(Notice::Warning(format!(
                "Could not notify the administrator: {}",
                e
            )));
        }
    }
    Ok(visit.redirect(&sessions, "/login"))
}

#[post("/logout")]
pub async fn logout_handler(
    store: web::Data<dyn Store>,
    state: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    sid: SessionId,
) -> Result<HttpResponse, DashboardError> {
    let mut visit = Visit::begin(store.get_ref(), &state, &sessions, sid).await;
    if let Some(email) = visit.session.email() {
        info!("{} logged out", email);
    }
    visit.session.sign_out();
    visit.rotate(&sessions);
    visit.notify(Notice::Info("Logged out.".to_string()));
    Ok(visit.redirect(&sessions, "/"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{cookie::Cookie, test, web};

    use crate::routes::testing::*;
    use crate::structures::{
        memory::MemoryStore,
        session::{SessionStore, SESSION_COOKIE},
    };

    #[actix_web::test]
    async fn test_bad_password_is_rejected_with_a_generic_message() {
        let app = test::init_service(app(Arc::new(MemoryStore::new()))).await;
        let req = test::TestRequest::post()
            .uri("/login")
            .set_form([("email", VOLUNTEER), ("password", "wrong")])
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(location(&response), "/login");

        let cookie = session_cookie(&response);
        let req = test::TestRequest::get().uri("/login").cookie(cookie).to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains("Login failed"));
    }

    #[actix_web::test]
    async fn test_signup_with_mismatched_passwords_never_reaches_the_provider() {
        let app = test::init_service(app(Arc::new(MemoryStore::new()))).await;
        let req = test::TestRequest::post()
            .uri("/signup")
            .set_form([
                ("email", "new@example.org"),
                ("password", "one"),
                ("confirm_password", "two"),
            ])
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(location(&response), "/signup");

        let req = test::TestRequest::post()
            .uri("/login")
            .set_form([("email", "new@example.org"), ("password", "one")])
            .to_request();
        assert_eq!(location(&test::call_service(&app, req).await), "/login");
    }

    #[actix_web::test]
    async fn test_signup_without_mail_settings_still_succeeds() {
        let app = test::init_service(app(Arc::new(MemoryStore::new()))).await;
        let req = test::TestRequest::post()
            .uri("/signup")
            .set_form([
                ("email", "new@example.org"),
                ("password", "pw"),
                ("confirm_password", "pw"),
            ])
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(location(&response), "/login");

        let cookie = session_cookie(&response);
        let req = test::TestRequest::get().uri("/login").cookie(cookie).to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains("Sign-up successful!"));
        assert!(body.contains("not configured"));
    }

    #[actix_web::test]
    async fn test_login_issues_a_new_session_id() {
        let sessions = web::Data::new(SessionStore::default());
        let store = Arc::new(MemoryStore::new());
        let app = test::init_service(app_with_sessions(store, sessions.clone())).await;

        let planted = Cookie::new(SESSION_COOKIE, "planted-id");
        let req = login_request(VOLUNTEER).cookie(planted.clone()).to_request();
        let login = test::call_service(&app, req).await;
        let cookie = session_cookie(&login);
        assert_ne!(cookie.value(), "planted-id");
        assert_eq!(sessions.len(), 1);

        let req = test::TestRequest::get().uri("/entry").cookie(planted).to_request();
        assert_eq!(location(&test::call_service(&app, req).await), "/login");
        let req = test::TestRequest::get().uri("/entry").cookie(cookie).to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
    }

    #[actix_web::test]
    async fn test_logout_drops_the_old_session() {
        let sessions = web::Data::new(SessionStore::default());
        let store = Arc::new(MemoryStore::new());
        let app = test::init_service(app_with_sessions(store, sessions.clone())).await;
        let login = test::call_service(&app, login_request(VOLUNTEER).to_request()).await;
        let cookie = session_cookie(&login);

        let req = test::TestRequest::post().uri("/logout").cookie(cookie.clone()).to_request();
        let logout = test::call_service(&app, req).await;
        assert_ne!(session_cookie(&logout).value(), cookie.value());

        // only the logout notice is left, under the new id
        assert_eq!(sessions.len(), 1);
        let req = test::TestRequest::get().uri("/").cookie(session_cookie(&logout)).to_request();
        test::call_service(&app, req).await;
        assert_eq!(sessions.len(), 0);
    }

    #[actix_web::test]
    async fn test_logout_forgets_the_user() {
        let app = test::init_service(app(Arc::new(MemoryStore::new()))).await;
        let login = test::call_service(&app, login_request(VOLUNTEER).to_request()).await;
        let cookie = session_cookie(&login);

        let req = test::TestRequest::post().uri("/logout").cookie(cookie.clone()).to_request();
        assert_eq!(location(&test::call_service(&app, req).await), "/");

        let req = test::TestRequest::get().uri("/entry").cookie(cookie).to_request();
        assert_eq!(location(&test::call_service(&app, req).await), "/login");
    }
}
