//! Per-browser state kept in process memory, keyed by a cookie.
//!
//! Handlers `load` a copy, work on it across awaits, then `save` it back, so
//! the map lock is only ever held for a clone or an insert.

use std::{
    collections::HashMap,
    future::{ready, Ready},
};

use actix_web::{
    cookie::{Cookie, SameSite},
    dev::Payload,
    FromRequest, HttpRequest,
};
use log::debug;
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::{
    auth::{AuthUser, SignedIn},
    entry::EntryForm,
    form::{DeleteGuard, Notice},
    sites::SiteForm,
};

pub const SESSION_COOKIE: &str = "wq_session";

/// Sessions untouched for this long are dropped, signed in or not.
const IDLE_TIMEOUT: Duration = Duration::hours(12);

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub user: Option<AuthUser>,
    pub entry: EntryForm,
    pub site_edit: SiteForm,
    /// Record picked on the chart or in the admin list, consumed when the
    /// entry form next opens.
    pub selection: Option<i64>,
    pub delete_guard: DeleteGuard,
    notices: Vec<Notice>,
    expires_at: Option<OffsetDateTime>,
}

impl Session {
    pub fn email(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.email.as_str())
    }

    pub fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Ends together with the provider's session.
    pub fn sign_in(&mut self, signed_in: SignedIn, now: OffsetDateTime) {
        self.expires_at = Some(now + Duration::seconds(signed_in.expires_in));
        self.user = Some(signed_in.user);
    }

    /// Forgets the user and everything they had staged.
    pub fn sign_out(&mut self) {
        *self = Session::default();
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Nothing worth remembering between requests.
    pub fn is_blank(&self) -> bool {
        self.user.is_none()
            && self.entry.draft().is_none()
            && self.entry.pending().is_none()
            && self.site_edit.draft().is_none()
            && self.site_edit.pending().is_none()
            && self.selection.is_none()
            && self.delete_guard.armed().is_none()
            && self.notices.is_empty()
    }
}

#[derive(Debug)]
struct Stored {
    session: Session,
    last_seen: OffsetDateTime,
}

impl Stored {
    fn is_live(&self, now: OffsetDateTime) -> bool {
        !self.session.is_expired(now) && now - self.last_seen < IDLE_TIMEOUT
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Stored>>,
}

impl SessionStore {
    pub fn load(&self, id: &SessionId) -> Session {
        self.load_at(id, OffsetDateTime::now_utc())
    }

    fn load_at(&self, id: &SessionId, now: OffsetDateTime) -> Session {
        let mut sessions = self.sessions.lock();
        let Some(stored) = sessions.get(&id.id) else {
            return Session::default();
        };
        if stored.is_live(now) {
            return stored.session.clone();
        }
        let was_signed_in = stored.session.user.is_some();
        sessions.remove(&id.id);
        debug!("session expired");
        let mut session = Session::default();
        if was_signed_in {
            session.notify(Notice::Warning(
                "Your session has expired. Please log in again.".to_string(),
            ));
        }
        session
    }

    /// Stores `session` unless it is blank. Returns whether the caller
    /// should keep its cookie.
    pub fn save(&self, id: &SessionId, session: Session) -> bool {
        self.save_at(id, session, OffsetDateTime::now_utc())
    }

    fn save_at(&self, id: &SessionId, session: Session, now: OffsetDateTime) -> bool {
        let mut sessions = self.sessions.lock();
        if session.is_blank() {
            sessions.remove(&id.id);
            return false;
        }
        if !sessions.contains_key(&id.id) {
            sessions.retain(|_, stored| stored.is_live(now));
        }
        sessions.insert(
            id.id.clone(),
            Stored {
                session,
                last_seen: now,
            },
        );
        true
    }

    pub fn remove(&self, id: &SessionId) {
        self.sessions.lock().remove(&id.id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// The caller's session key; a fresh one is minted when the cookie is
/// missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId {
    id: String,
    fresh: bool,
}

impl SessionId {
    pub fn mint() -> Self {
        SessionId {
            id: Uuid::new_v4().to_string(),
            fresh: true,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn cookie(&self) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, self.id.clone())
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .finish()
    }
}

impl FromRequest for SessionId {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let id = match req.cookie(SESSION_COOKIE) {
            Some(cookie) if !cookie.value().is_empty() => SessionId {
                id: cookie.value().to_string(),
                fresh: false,
            },
            _ => SessionId::mint(),
        };
        ready(Ok(id))
    }
}
