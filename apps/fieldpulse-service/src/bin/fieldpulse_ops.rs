#![allow(clippy::print_stdout, clippy::print_stderr, clippy::exit)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use fieldpulse_api_client::{FieldPulseClient, PageRequest};
use fieldpulse_app_state::{
    AuthContext, AuthState, FileSessionStore, KeyVerifier, RemoteKeyVerifier, SessionStore,
    UnverifiedKeyVerifier,
};
use fieldpulse_domain::{DashboardStats, Job};
use fieldpulse_domain::format::{
    capitalize_first, format_currency, format_date, format_date_time, initials,
};
use fieldpulse_service::SeedCounts;
use fieldpulse_service::config::{AuthVerifyMode, Config};
use fieldpulse_store::seed::seed_sample_data;
use fieldpulse_store::{DocumentStore, MemoryDocumentStore, Repository, StoreLease, queries};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fieldpulse-ops")]
#[command(about = "Operator commands for the FieldPulse document store, session and REST API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the sample dataset into the configured store. When a running
    /// service holds the store, the seed is sent to that service.
    Seed(StoreArgs),
    /// Dashboard statistics computed from the configured store.
    Stats(StoreArgs),
    /// Jobs in the configured store, newest first.
    Jobs(StoreArgs),
    /// Verify an API key and remember it.
    Login(LoginArgs),
    /// Sign in as the demo user.
    Demo,
    Logout,
    Whoami,
    /// Read from the FieldPulse REST API with the stored key.
    #[command(subcommand)]
    Remote(RemoteCommands),
}

#[derive(Args)]
struct StoreArgs {
    #[arg(long)]
    store: Option<PathBuf>,
}

#[derive(Args)]
struct LoginArgs {
    api_key: String,
}

#[derive(Subcommand)]
enum RemoteCommands {
    Customers(PageArgs),
    Jobs(PageArgs),
    Stats,
}

#[derive(Args)]
struct PageArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    limit: u32,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Seed(args) => run_seed(&config, args).await,
        Commands::Stats(args) => run_stats(&config, args).await,
        Commands::Jobs(args) => run_jobs(&config, args).await,
        Commands::Login(args) => run_login(&config, &args.api_key).await,
        Commands::Demo => {
            print_state(&auth_context(&config)?.enable_demo_mode());
            Ok(())
        }
        Commands::Logout => {
            auth_context(&config)?.logout();
            println!("Signed out.");
            Ok(())
        }
        Commands::Whoami => run_whoami(&config).await,
        Commands::Remote(command) => run_remote(&config, command).await,
    }
}

fn store_path(config: &Config, args: StoreArgs) -> Result<PathBuf> {
    args.store
        .or_else(|| config.store_path.clone())
        .context("no store path configured; pass --store or set FIELDPULSE_STORE_PATH")
}

fn open_store(config: &Config, args: StoreArgs) -> Result<Arc<dyn DocumentStore>> {
    Ok(Arc::new(MemoryDocumentStore::open(store_path(config, args)?)))
}

async fn run_seed(config: &Config, args: StoreArgs) -> Result<()> {
    let path = store_path(config, args)?;
    let counts = match StoreLease::holder(&path) {
        Some(holder) => {
            let endpoint = holder.endpoint.with_context(|| {
                format!(
                    "store {} is held by process {} which accepts no remote writes",
                    path.display(),
                    holder.pid
                )
            })?;
            seed_via_service(&path, &endpoint, holder.pid).await?
        }
        None => {
            let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::open(&path));
            let summary = seed_sample_data(&store, Utc::now())
                .await
                .context("failed to seed sample data")?;
            SeedCounts::from(&summary)
        }
    };

    println!("Seeded {} records on {}:", counts.total, format_date(Utc::now()));
    println!("  customers={}", counts.customers);
    println!("  jobs={}", counts.jobs);
    println!("  estimates={}", counts.estimates);
    println!("  invoices={}", counts.invoices);
    println!("  webhooks={}", counts.webhooks);
    println!("  api_keys={}", counts.api_keys);
    println!("  ai_automations={}", counts.ai_automations);
    Ok(())
}

#[derive(Deserialize)]
struct SeedResponse {
    data: SeedCounts,
}

async fn seed_via_service(store: &Path, endpoint: &str, pid: u32) -> Result<SeedCounts> {
    let url = format!("{}/api/v1/admin/seed", endpoint.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .send()
        .await
        .with_context(|| {
            format!(
                "store {} is held by process {pid}, but {endpoint} is unreachable; \
                 remove {} if no service is running",
                store.display(),
                StoreLease::lock_path(store).display()
            )
        })?
        .error_for_status()
        .with_context(|| format!("seed request to {url} failed"))?;
    let body: SeedResponse = response
        .json()
        .await
        .context("unexpected seed response")?;
    Ok(body.data)
}

fn stats_lines(stats: &DashboardStats) -> Vec<String> {
    vec![
        format!("Customers:          {}", stats.total_customers),
        format!("Active jobs:        {}", stats.active_jobs),
        format!("Pending estimates:  {}", stats.pending_estimates),
        format!("Overdue invoices:   {}", stats.overdue_invoices),
        format!("Monthly revenue:    {}", format_currency(stats.monthly_revenue)),
        format!("Completion rate:    {}%", stats.completion_rate),
    ]
}

fn job_line(job: &Job) -> String {
    format!(
        "{}  {:<12} {}",
        format_date_time(job.created_at),
        capitalize_first(&job.status.as_str().replace('_', " ")),
        job.title
    )
}

async fn run_stats(config: &Config, args: StoreArgs) -> Result<()> {
    let store = open_store(config, args)?;
    let stats = queries::dashboard_stats(&store, Utc::now()).await?;
    for line in stats_lines(&stats) {
        println!("{line}");
    }
    Ok(())
}

async fn run_jobs(config: &Config, args: StoreArgs) -> Result<()> {
    let store = open_store(config, args)?;
    let jobs = Repository::<Job>::new(store).list(None).await?;
    if jobs.is_empty() {
        println!("No jobs.");
    }
    for job in &jobs {
        println!("{}", job_line(job));
    }
    Ok(())
}

fn session_store(config: &Config) -> Arc<dyn SessionStore> {
    Arc::new(FileSessionStore::new(config.session_path.clone()))
}

fn auth_context(config: &Config) -> Result<AuthContext> {
    let verifier: Arc<dyn KeyVerifier> = match config.auth_verify {
        AuthVerifyMode::Remote => Arc::new(RemoteKeyVerifier::new(
            FieldPulseClient::new(config.api.clone()).context("invalid FieldPulse API config")?,
        )),
        AuthVerifyMode::None => Arc::new(UnverifiedKeyVerifier),
    };
    Ok(AuthContext::new(session_store(config), verifier))
}

fn print_state(state: &AuthState) {
    match state {
        AuthState::AuthenticatedDemo { user } => {
            println!("Demo mode: [{}] {} <{}>", initials(&user.name), user.name, user.email);
        }
        AuthState::AuthenticatedReal { user } => {
            println!(
                "Signed in: [{}] {} <{}> (id {})",
                initials(&user.name),
                user.name,
                user.email,
                user.id
            );
        }
        AuthState::Authenticating => println!("Signing in..."),
        AuthState::Unauthenticated { error: Some(error) } => println!("Not signed in: {error}"),
        AuthState::Unauthenticated { error: None } => println!("Not signed in."),
    }
}

async fn run_login(config: &Config, api_key: &str) -> Result<()> {
    let state = auth_context(config)?.login(api_key).await;
    print_state(&state);
    if let Some(error) = state.error() {
        bail!("{error}");
    }
    Ok(())
}

async fn run_whoami(config: &Config) -> Result<()> {
    print_state(&auth_context(config)?.restore().await);
    Ok(())
}

async fn run_remote(config: &Config, command: RemoteCommands) -> Result<()> {
    let stored_key = session_store(config)
        .load_session()?
        .and_then(|session| session.stored_key().map(str::to_string));
    let mut client =
        FieldPulseClient::new(config.api.clone()).context("invalid FieldPulse API config")?;
    if let Some(api_key) = stored_key.as_deref() {
        client = client.with_api_key(api_key);
    }
    if !client.has_api_key() {
        bail!("no API key; run `fieldpulse-ops login <key>` or set FIELDPULSE_API_KEY");
    }

    let output = match command {
        RemoteCommands::Customers(args) => serde_json::to_string_pretty(
            &client
                .list_customers(PageRequest {
                    page: args.page,
                    limit: args.limit,
                })
                .await?,
        )?,
        RemoteCommands::Jobs(args) => serde_json::to_string_pretty(
            &client
                .list_jobs(PageRequest {
                    page: args.page,
                    limit: args.limit,
                })
                .await?,
        )?,
        RemoteCommands::Stats => serde_json::to_string_pretty(&client.dashboard_stats().await?)?,
    };
    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use fieldpulse_domain::{JobStatus, Priority};

    use super::*;

    #[test]
    fn stats_output_formats_revenue_as_currency() {
        let lines = stats_lines(&DashboardStats {
            total_customers: 3,
            active_jobs: 2,
            pending_estimates: 1,
            overdue_invoices: 0,
            monthly_revenue: 12_345.5,
            completion_rate: 50.0,
        });
        assert_eq!(lines[0], "Customers:          3");
        assert_eq!(lines[4], "Monthly revenue:    $12,345.50");
        assert_eq!(lines[5], "Completion rate:    50%");
    }

    #[test]
    fn job_output_shows_date_and_readable_status() {
        let created_at = Utc
            .with_ymd_and_hms(2026, 3, 9, 14, 5, 0)
            .single()
            .expect("valid date");
        let job = Job {
            id: "j1".to_string(),
            customer_id: "c1".to_string(),
            title: "Install Panel".to_string(),
            description: None,
            status: JobStatus::InProgress,
            priority: Priority::default(),
            scheduled_date: None,
            completed_date: None,
            assigned_to: None,
            location: None,
            created_at,
            updated_at: created_at,
        };
        assert_eq!(job_line(&job), "Mar 9, 2026, 02:05 PM  In progress  Install Panel");
    }
}
