use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use event_photo_uploader::commands::{self, UploadRequest, DEFAULT_TOKEN_LIFETIME_SECS};
use event_photo_uploader::config::{self, Config};
use event_photo_uploader::store::SqliteStore;
use event_photo_uploader::uploader::UploadProgress;

#[derive(Parser)]
#[command(
    name = "event-photo-uploader",
    version,
    about = "Upload event photos and videos, one file at a time"
)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload photos and videos to an event
    Upload {
        /// Event (session) id
        #[arg(long)]
        event: String,
        /// Override the configured upload endpoint
        #[arg(long)]
        endpoint: Option<String>,
        /// Give failed files one more attempt after the batch
        #[arg(long)]
        retry_failed: bool,
        /// Files or directories to upload
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Manage events
    Events {
        #[command(subcommand)]
        sub: EventCommands,
    },
    /// Manage organizer accounts
    Users {
        #[command(subcommand)]
        sub: UserCommands,
    },
    /// Inspect or change the configuration
    Config {
        #[command(subcommand)]
        sub: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum EventCommands {
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        description: Option<String>,
    },
    List {
        #[arg(long)]
        owner: String,
    },
    Show {
        id: String,
    },
    Rename {
        id: String,
        name: String,
        #[arg(long)]
        owner: String,
    },
    Delete {
        id: String,
        #[arg(long)]
        owner: String,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
    Show {
        id: String,
    },
    /// Store cloud storage credentials for a user
    ConnectDrive {
        id: String,
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        refresh_token: Option<String>,
        /// Seconds until the access token expires
        #[arg(long, default_value_t = DEFAULT_TOKEN_LIFETIME_SECS)]
        expires_in: i64,
    },
    DisconnectDrive {
        id: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    Show,
    Reset,
    /// Point uploads at another endpoint
    SetEndpoint {
        url: String,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Progress lines on stderr; transfer ticks are thinned to every 10%.
fn progress_printer() -> impl FnMut(UploadProgress) {
    let mut last_step = None;
    move |progress: UploadProgress| {
        let transferring = progress.file_progress > 0 && progress.file_progress < 100;
        if transferring {
            let step = (progress.current_file, progress.file_progress / 10);
            if last_step == Some(step) {
                return;
            }
            last_step = Some(step);
        }
        eprintln!("[{:>3}%] {}", progress.overall_progress, progress.status);
    }
}

async fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    let db_path = config.database_path()?;
    SqliteStore::connect(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The logger comes up before the config so load warnings are not lost.
    // Without RUST_LOG it runs at info until the configured level is known.
    let rust_log = std::env::var("RUST_LOG").ok();
    let env_filtered = rust_log.as_deref().map_or(false, |v| !v.trim().is_empty());
    let mut logger = env_logger::Builder::new();
    if env_filtered {
        logger.parse_default_env();
    } else {
        logger.filter_level(log::LevelFilter::Trace);
    }
    logger.init();
    if !env_filtered {
        log::set_max_level(log::LevelFilter::Info);
    }

    let config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    }
    .context("Failed to load configuration")?;

    if let Some(level) = config.startup_log_level(rust_log.as_deref()) {
        log::set_max_level(level);
    }

    log::info!("Starting Event Photo Uploader");

    match cli.command {
        Commands::Upload {
            event,
            endpoint,
            retry_failed,
            paths,
        } => {
            let store = open_store(&config).await?;
            let uploader = commands::build_http_uploader(&config, endpoint.as_deref())?;
            let request = UploadRequest {
                event_id: event,
                paths,
                retry_failed,
            };

            let summary =
                match commands::run_upload(&uploader, &store, &config, request, progress_printer())
                    .await
                {
                    Ok(summary) => summary,
                    Err(e) => {
                        if e.is_retryable() && !retry_failed {
                            eprintln!("Hint: run again with --retry-failed to resend failed files");
                        }
                        return Err(anyhow::Error::new(e).context("Upload failed"));
                    }
                };

            println!("{}", commands::summary_message(&summary.outcome));
            if let Some(event) = &summary.event {
                println!("Event '{}' now has {} uploads", event.name, event.uploads);
            }
        }
        Commands::Events { sub } => {
            let store = open_store(&config).await?;
            match sub {
                EventCommands::Create {
                    owner,
                    name,
                    date,
                    description,
                } => {
                    let event =
                        commands::create_event(&store, &owner, &name, &date, description).await?;
                    print_json(&event)?;
                }
                EventCommands::List { owner } => {
                    let events = commands::list_events(&store, &owner).await?;
                    if events.is_empty() {
                        println!("No events for {}", owner);
                    }
                    for event in events {
                        println!(
                            "{}  {:<10} {:>5} uploads  {} ({})",
                            event.id,
                            event.status.as_str(),
                            event.uploads,
                            event.name,
                            event.date
                        );
                    }
                }
                EventCommands::Show { id } => {
                    print_json(&commands::show_event(&store, &id).await?)?;
                }
                EventCommands::Rename { id, name, owner } => {
                    let event = commands::rename_event(&store, &id, &owner, &name).await?;
                    println!("Renamed event {} to '{}'", event.id, event.name);
                }
                EventCommands::Delete { id, owner } => {
                    commands::delete_event(&store, &id, &owner).await?;
                    println!("Deleted event {}", id);
                }
            }
        }
        Commands::Users { sub } => {
            let store = open_store(&config).await?;
            match sub {
                UserCommands::Add { email, name } => {
                    print_json(&commands::add_user(&store, &email, &name).await?)?;
                }
                UserCommands::Show { id } => {
                    print_json(&commands::show_user(&store, &id).await?)?;
                }
                UserCommands::ConnectDrive {
                    id,
                    access_token,
                    refresh_token,
                    expires_in,
                } => {
                    let user = commands::connect_drive(
                        &store,
                        &id,
                        &access_token,
                        refresh_token,
                        expires_in,
                        Utc::now(),
                    )
                    .await?;
                    println!("Cloud storage connected for {}", user.email);
                }
                UserCommands::DisconnectDrive { id } => {
                    let user = commands::disconnect_drive(&store, &id).await?;
                    println!("Cloud storage disconnected for {}", user.email);
                }
            }
        }
        Commands::Config { sub } => match sub {
            ConfigCommands::Show => print_json(&config)?,
            ConfigCommands::Reset => {
                let config = match &cli.config {
                    Some(path) => config::reset_config_at(path),
                    None => config::reset_config(),
                }
                .context("Failed to reset configuration")?;
                print_json(&config)?;
            }
            ConfigCommands::SetEndpoint { url } => {
                let mut config = config;
                config.upload_endpoint = url.trim().to_string();
                match &cli.config {
                    Some(path) => config::save_config_to(path, &config),
                    None => config::save_config(&config),
                }
                .context("Failed to save configuration")?;
                println!("Upload endpoint set to {}", config.upload_endpoint);
            }
        },
    }

    Ok(())
}
