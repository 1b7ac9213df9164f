// src/cli.rs
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::app_log;
use crate::auth::{FirebaseProvider, Identity, SessionSynchronizer};
use crate::core::{ApiClient, ConfigManager};
use crate::environment::Deployment;
use crate::types::{JobStats, SkillStat};

const SIGN_IN_TIMEOUT: Duration = Duration::from_secs(30);
const TOP_SKILLS: usize = 10;

#[derive(Parser)]
#[command(name = "cvtailor")]
#[command(about = "Scrape job postings and tailor your CV to them")]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,

    #[arg(long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Backend deployment; defaults to CVTAILOR_ENV / ENVIRONMENT / ENV
    #[arg(long, global = true, value_enum)]
    pub env: Option<Deployment>,

    /// Also write JSON logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum CliCommand {
    /// Sign in with the identity provider
    Login,
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Check that the backend is up
    Health,
    /// Scrape a job posting
    Scrape { url: String },
    /// List scraped jobs
    Jobs {
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show one scraped job
    Job { id: i64 },
    /// Delete a scraped job
    DeleteJob { id: i64 },
    /// Generate a CV tailored to a job
    GenerateCv {
        job_id: i64,
        cv_file: PathBuf,
        /// Download the generated files into this directory
        #[arg(long)]
        download: Option<PathBuf>,
    },
    /// Show job market statistics
    Stats,
    /// Recompute job market statistics
    GenerateStats,
}

/// Session and API handles shared by the commands.
struct App {
    session: SessionSynchronizer,
    api: ApiClient,
}

impl App {
    async fn start(config: &ConfigManager) -> Result<Self> {
        let firebase = config.firebase_config()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.environment.timeout_seconds))
            .build()
            .context("Failed to create identity provider HTTP client")?;
        let provider = Arc::new(FirebaseProvider::restore_with_client(firebase, http).await);
        let backend = base_client(config)?;

        let session = SessionSynchronizer::new(provider).with_backend_sync(Arc::new(backend.clone()));
        let api = backend.with_credentials(session.store());

        let first = session.initialize()?;
        match first.await? {
            Some(identity) => app_log!(debug, "Restored identity {}", identity.uid()),
            None => app_log!(debug, "No stored identity"),
        }

        Ok(Self { session, api })
    }

    async fn require_authenticated(&self) -> Result<Identity> {
        Ok(self.session.require_authenticated().await?)
    }

    /// Wait for the provider to report a signed-in user after a login attempt.
    async fn wait_for_identity(&self) -> Result<Identity> {
        let mut rx = self.session.subscribe();
        let identity = tokio::time::timeout(SIGN_IN_TIMEOUT, async {
            rx.wait_for(|session| session.identity.is_some())
                .await
                .ok()
                .and_then(|session| session.identity.clone())
        })
        .await
        .context("Timed out waiting for sign-in to complete")?;
        identity.context("Session closed before sign-in completed")
    }
}

fn base_client(config: &ConfigManager) -> Result<ApiClient> {
    ApiClient::new(
        &config.environment.api_url,
        config.environment.timeout_seconds,
    )
    .context("Failed to create HTTP client")
}

pub async fn handle_command(cli: Cli) -> Result<()> {
    let config = ConfigManager::load(&cli.config, cli.env)?;
    config.ensure_directories().await?;
    app_log!(
        info,
        "Using {} backend at {}",
        config.deployment,
        config.environment.api_url
    );

    // The health check needs no session or identity provider settings.
    if cli.command == CliCommand::Health {
        print_health(&base_client(&config)?).await?;
        return Ok(());
    }

    let app = App::start(&config).await?;
    let result = run(&app, cli.command).await;

    // Let backend syncs started by sign-in finish before exiting.
    app.session.settled().await;
    result
}

async fn run(app: &App, command: CliCommand) -> Result<()> {
    match command {
        CliCommand::Login => {
            let session = app.session.snapshot();
            if session.is_authenticated() {
                if let Some(identity) = session.identity {
                    println!("Already signed in as {}", identity.user().label());
                }
                return Ok(());
            }
            app.session
                .login_with_provider()
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            let identity = app.wait_for_identity().await?;
            println!("Signed in as {}", identity.user().label());
        }

        CliCommand::Logout => {
            app.session
                .logout()
                .await
                .map_err(|e| anyhow!("Logout failed: {}", e))?;
            println!("Signed out");
        }

        CliCommand::Whoami => match app.session.snapshot().identity {
            Some(identity) => {
                let user = identity.user();
                println!("Signed in as {}", user.label());
                println!("   UID: {}", user.uid);
                if let Some(email) = &user.email {
                    println!("   Email: {} (verified: {})", email, user.email_verified);
                }
            }
            None => println!("Not signed in"),
        },

        CliCommand::Health => print_health(&app.api).await?,

        CliCommand::Scrape { url } => {
            let job = app.api.scrape_job(&url).await?;
            println!("Scraped: {} at {}", job.title, job.company);
            if let Some(id) = job.job_id {
                println!("   ID: {}", id);
            }
            if let Some(poster) = &job.poster {
                println!("   Posted by: {}", poster);
            }
            println!();
            println!("{}", job.description_text());
        }

        CliCommand::Jobs { limit, offset } => {
            let list = app.api.list_jobs(limit, offset).await?;
            if list.jobs.is_empty() {
                println!("No jobs scraped yet");
            }
            for job in &list.jobs {
                let date = job
                    .scraped_date()
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("#{:<5} {} | {} at {}", job.id, date, job.title, job.company);
            }
            if let Some(total) = list.total {
                println!("{} of {} jobs", list.jobs.len(), total);
            }
        }

        CliCommand::Job { id } => {
            let job = app.api.get_job(id).await?;
            println!("#{} {} at {}", job.id, job.title, job.company);
            if let Some(url) = &job.url {
                println!("   URL: {}", url);
            }
            if let Some(poster) = &job.poster {
                println!("   Posted by: {}", poster);
            }
            if let Some(text) = job.full_description.as_ref().or(job.description.as_ref()) {
                println!();
                println!("{}", text);
            }
        }

        CliCommand::DeleteJob { id } => {
            app.require_authenticated().await?;
            let response = app.api.delete_job(id).await?;
            println!("{}", response.message);
        }

        CliCommand::GenerateCv {
            job_id,
            cv_file,
            download,
        } => {
            let identity = app.require_authenticated().await?;
            app_log!(info, "Generating CV for job {} as {}", job_id, identity.uid());

            let generated = app.api.generate_cv(job_id, &cv_file).await?;
            if let Some(message) = &generated.message {
                println!("{}", message);
            }
            println!("   Markdown: {}", generated.cv_markdown);
            println!("   PDF: {}", generated.cv_pdf);

            if let Some(dir) = download {
                for location in [&generated.cv_markdown, &generated.cv_pdf] {
                    let saved = app.api.download(location, &dir).await?;
                    println!("   Saved {}", saved.display());
                }
            }
        }

        CliCommand::Stats => {
            let stats = app.api.stats().await?;
            print_stats(&stats);
        }

        CliCommand::GenerateStats => {
            let generated = app.api.generate_stats().await?;
            if let Some(message) = &generated.message {
                println!("{}", message);
            }
            print_stats(&generated.stats);
            for (name, path) in [
                ("technologies", &generated.charts.technologies),
                ("languages", &generated.charts.languages),
                ("soft skills", &generated.charts.soft_skills),
                ("hard skills", &generated.charts.hard_skills),
            ] {
                if let Some(path) = path {
                    println!("Chart ({}): {}", name, path);
                }
            }
        }
    }

    Ok(())
}

async fn print_health(api: &ApiClient) -> Result<()> {
    let health = api.health().await?;
    println!("Backend status: {}", health.status);
    if let Some(version) = health.version {
        println!("Version: {}", version);
    }
    if let Some(auth) = health.auth {
        println!("Auth: {}", auth);
    }
    Ok(())
}

fn print_stats(stats: &JobStats) {
    println!("Jobs analyzed: {}", stats.total_jobs);
    print_skills("Technologies", &stats.technologies);
    print_skills("Languages", &stats.languages);
    print_skills("Soft skills", &stats.soft_skills);
    print_skills("Hard skills", &stats.hard_skills);

    if let Some(summary) = &stats.market_summary {
        println!();
        println!("{}", summary);
    }
    if !stats.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for recommendation in &stats.recommendations {
            println!("   - {}", recommendation);
        }
    }
}

fn print_skills(title: &str, skills: &[SkillStat]) {
    if skills.is_empty() {
        return;
    }
    println!();
    println!("{}:", title);
    for skill in skills.iter().take(TOP_SKILLS) {
        println!("   {:<24} {:>5.1}%", skill.name, skill.percentage);
    }
}
