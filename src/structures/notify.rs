use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use log::{debug, info, warn};

use super::errors::DashboardError;

const SUBJECT: &str = "New Admin Access Request - Water Quality Dashboard";

/// SMTP settings. The administrator's own address is both sender and
/// recipient.
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub server: String,
    pub port: u16,
    pub admin_email: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No SMTP password configured; nothing was sent.
    NotConfigured,
}

fn compose(settings: &MailSettings, new_user_email: &str) -> Result<Message, DashboardError> {
    let admin: Mailbox = settings.admin_email.parse()?;
    let body = format!(
        "A new user has signed up and is requesting admin access:\n\n\
         Email: {}\n\n\
         To grant access, sign in to the dashboard and add this user from the \
         \"Manage Admins\" page.\n",
        new_user_email
    );
    Ok(Message::builder()
        .from(admin.clone())
        .to(admin)
        .subject(SUBJECT)
        .header(ContentType::TEXT_PLAIN)
        .body(body)?)
}

/// Blocking; call from `web::block`.
pub fn notify_admin(
    settings: &MailSettings,
    new_user_email: &str,
) -> Result<Delivery, DashboardError> {
    let Some(password) = settings.password.as_deref().filter(|p| !p.is_empty()) else {
        warn!(
            "no email password configured, admin not notified about {}",
            new_user_email
        );
        return Ok(Delivery::NotConfigured);
    };
    let message = compose(settings, new_user_email)?;
    debug!(
        "sending admin notification via {}:{}",
        settings.server, settings.port
    );
    let mailer = SmtpTransport::starttls_relay(&settings.server)?
        .port(settings.port)
        .credentials(Credentials::new(
            settings.admin_email.clone(),
            password.to_string(),
        ))
        .build();
    mailer.send(&message)?;
    info!("notified {} about sign-up of {}", settings.admin_email, new_user_email);
    Ok(Delivery::Sent)
}
