//! Sign-in and sign-up against the hosted auth service (Supabase GoTrue).

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::errors::DashboardError;

/// The signed-in user as the auth service describes them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: String,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, DashboardError>;

    /// Fails with [`DashboardError::AlreadyRegistered`] when the email is taken.
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, DashboardError>;
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// A successful password sign-in.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedIn {
    pub user: AuthUser,
    /// Seconds until the provider's session lapses.
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Sign-up answers with a session when email confirmation is off and with
/// the bare user when it is on.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session { user: AuthUser },
    User(AuthUser),
}

#[derive(Debug, Clone)]
pub struct SupabaseAuth {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseAuth {
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn post(
        &self,
        path: &str,
        email: &str,
        password: &str,
    ) -> Result<reqwest::Response, DashboardError> {
        let url = format!("{}/auth/v1/{}", self.base_url, path);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&Credentials { email, password })
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let message = error_message(&response.text().await.unwrap_or_default());
        warn!("auth request to {} failed with {}: {}", path, status, message);
        match message.to_lowercase().contains("already registered") {
            true => Err(DashboardError::AlreadyRegistered),
            false => Err(DashboardError::Auth(message)),
        }
    }
}

/// Pulls the human-readable part out of a GoTrue error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["msg", "error_description", "message", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, DashboardError> {
        let response = self
            .post("token?grant_type=password", email, password)
            .await?;
        Ok(response.json::<SignedIn>().await?)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, DashboardError> {
        let response = self.post("signup", email, password).await?;
        Ok(match response.json::<SignUpResponse>().await? {
            SignUpResponse::Session { user } => user,
            SignUpResponse::User(user) => user,
        })
    }
}
