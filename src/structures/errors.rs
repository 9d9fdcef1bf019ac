use actix_web::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("IO error\n{0}")]
    Read(#[from] std::io::Error),

    #[error("askama templating error\n{0}")]
    Askama(#[from] askama::Error),

    #[error("reqwest error\n{0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("sqlx error\n{0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("sqlx migrate error\n{0}")]
    SqlxMigrate(#[from] sqlx::migrate::MigrateError),

    #[error("serde_yaml error\n{0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("serde_json error\n{0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("smtp error\n{0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("email error\n{0}")]
    Email(#[from] lettre::error::Error),

    #[error("email address error\n{0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("blocking task error\n{0}")]
    Blocking(#[from] actix_web::error::BlockingError),

    #[error("{0}")]
    Validation(String),

    #[error("invalid form state: {0}")]
    InvalidState(&'static str),

    #[error("authentication error\n{0}")]
    Auth(String),

    #[error("user already registered")]
    AlreadyRegistered,

    #[error("store error\n{0}")]
    Store(String),
}

impl actix_web::error::ResponseError for DashboardError {
    fn status_code(&self) -> StatusCode {
        match self {
            DashboardError::Validation(_) | DashboardError::InvalidState(_) => {
                StatusCode::BAD_REQUEST
            }
            DashboardError::Auth(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
