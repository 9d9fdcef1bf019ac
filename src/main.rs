mod routes;
mod structures;

use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use actix_web::{middleware::Logger, web, App, HttpServer};
use clap::{command, Parser};
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;

use crate::{
    routes::AppState,
    structures::{
        access::AccessPolicy,
        auth::{AuthProvider, SupabaseAuth},
        errors::DashboardError,
        memory::MemoryStore,
        model::SiteInput,
        notify::MailSettings,
        session::SessionStore,
        sites::builtin_sites,
        store::{PgStore, Store},
    },
};

#[cfg(all(target_env = "musl", target_pointer_width = "64"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    #[serde(default = "default_bind_address")]
    bind_address: String,
    #[serde(default = "default_port")]
    port: u16,
    /// Sites shown while the `sites` table is empty or unreadable.
    #[serde(default = "builtin_sites")]
    fallback_sites: Vec<SiteInput>,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_address: default_bind_address(),
            port: default_port(),
            fallback_sites: builtin_sites(),
        }
    }
}

impl Config {
    fn load(path: &str) -> Result<Self, DashboardError> {
        if !Path::new(path).exists() {
            info!("No config at {}, using defaults", path);
            return Ok(Config::default());
        }
        info!("Reading config from {}", path);
        Ok(serde_yaml::from_reader(BufReader::new(File::open(path)?))?)
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// path to config file
    #[arg(long, env, default_value = "./config.yaml")]
    config_path: String,

    /// postgres connection string; records are kept in memory without one
    #[arg(long, env, hide_env_values = true)]
    database_url: Option<String>,

    /// apply the bundled schema migration on startup
    #[arg(long, env)]
    migrate: bool,

    /// base URL of the Supabase project
    #[arg(long, env)]
    supabase_url: String,

    /// Supabase anon key
    #[arg(long, env, hide_env_values = true)]
    supabase_key: String,

    /// always treated as an admin, and where sign-up notices are sent
    #[arg(long, env)]
    admin_email: String,

    #[arg(long, env, default_value = "smtp.gmail.com")]
    smtp_server: String,

    #[arg(long, env, default_value_t = 587)]
    smtp_port: u16,

    /// SMTP password for the admin mailbox; sign-up notices are skipped without it
    #[arg(long, env, hide_env_values = true)]
    email_password: Option<String>,
}

async fn open_store(args: &Args) -> Result<Arc<dyn Store>, DashboardError> {
    let Some(url) = &args.database_url else {
        warn!("DATABASE_URL not set, records will only live in memory");
        return Ok(Arc::new(MemoryStore::new()));
    };
    let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
    if args.migrate {
        sqlx::migrate!().run(&pool).await?;
        info!("Database migrations applied");
    }
    Ok(Arc::new(PgStore::new(pool)))
}

#[actix_web::main]
async fn main() -> Result<(), DashboardError> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args = Args::parse();
    info!(
        "Started with config {}, admin {}, database {}",
        args.config_path,
        args.admin_email,
        match args.database_url {
            Some(_) => "postgres",
            None => "in-memory",
        }
    );
    let config = Config::load(&args.config_path)?;

    let store = web::Data::from(open_store(&args).await?);
    let auth: Arc<dyn AuthProvider> = Arc::new(SupabaseAuth::new(
        Client::new(),
        &args.supabase_url,
        &args.supabase_key,
    ));
    let auth = web::Data::from(auth);
    let state = web::Data::new(AppState {
        policy: AccessPolicy::new(&args.admin_email),
        mail: MailSettings {
            server: args.smtp_server,
            port: args.smtp_port,
            admin_email: args.admin_email,
            password: args.email_password,
        },
        fallback_sites: config.fallback_sites,
    });
    let sessions = web::Data::new(SessionStore::default());

    info!("Listening on {}:{}", config.bind_address, config.port);
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(store.clone())
            .app_data(auth.clone())
            .app_data(state.clone())
            .app_data(sessions.clone())
            .configure(routes::configure)
    })
    .bind((config.bind_address.as_str(), config.port))?
    .run()
    .await?)
}
