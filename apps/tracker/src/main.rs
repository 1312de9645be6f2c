mod cli;

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tracker::api::ApiClient;
use tracker::config::Config;
use tracker::models::application::ApplicationStatus;
use tracker::models::generation::{GenerationRequest, JobStatus, TrackedEntity};
use tracker::store::applications::{StatusFilter, ViewMode};
use tracker::store::{ApplicationsStore, GenerationStore, StoreEvent};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "tracker v{} talking to {}",
        env!("CARGO_PKG_VERSION"),
        config.api_base_url
    );

    let client = config.api_client()?;

    match cli.command {
        Commands::Generate {
            title,
            job_description,
            job_description_file,
        } => {
            let job_description = match (job_description, job_description_file) {
                (Some(text), _) => text,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => bail!("Pass --job-description or --job-description-file"),
            };
            follow_generation(
                &config,
                client,
                GenerationRequest::Resume {
                    title,
                    job_description,
                },
            )
            .await
        }
        Commands::Critique {
            candidate_id,
            job_id,
        } => {
            follow_generation(
                &config,
                client,
                GenerationRequest::Critique {
                    candidate_id,
                    job_id,
                },
            )
            .await
        }
        Commands::Resumes => {
            for resume in client.list_resumes().await? {
                let score = resume
                    .match_score
                    .map(|s| format!("{s:.0}%"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {:<10}  {:>5}  {}",
                    resume.id, resume.status, score, resume.title
                );
            }
            Ok(())
        }
        Commands::Jobs => {
            for job in client.list_jobs().await? {
                let active = if job.is_active { "" } else { " (inactive)" };
                println!("{}  {} @ {}{}", job.id, job.title, job.company, active);
            }
            Ok(())
        }
        Commands::Candidates { job_id } => {
            for candidate in client.list_candidates(job_id).await? {
                let critique = candidate
                    .critique_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "NOT CRITIQUED".to_string());
                let score = candidate
                    .overall_score
                    .map(|s| format!("{s:.0}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {:<13}  {:>3}  {} <{}>",
                    candidate.id, critique, score, candidate.name, candidate.email
                );
            }
            Ok(())
        }
        Commands::Applications { status, board } => {
            let filter: StatusFilter = status.parse().map_err(|e: String| anyhow!(e))?;
            let store = ApplicationsStore::new(Arc::new(client));
            store.set_status_filter(filter);
            store.set_view_mode(if board { ViewMode::Kanban } else { ViewMode::List });
            store
                .fetch_all()
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            print_applications(&store);
            Ok(())
        }
        Commands::Move { id, status, notes } => {
            let status: ApplicationStatus = status.parse().map_err(|e: String| anyhow!(e))?;
            let store = ApplicationsStore::new(Arc::new(client));
            let updated = store
                .update_status(id, status, notes.as_deref())
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            println!("{} @ {} is now {}", updated.job_title, updated.company, updated.status.label());
            Ok(())
        }
        Commands::Favorite { id } => {
            let store = ApplicationsStore::new(Arc::new(client));
            let is_favorite = store
                .toggle_favorite(id)
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            println!(
                "{id} {}",
                if is_favorite { "added to favorites" } else { "removed from favorites" }
            );
            Ok(())
        }
    }
}

/// Starts the job, prints each status change, and returns once it finishes,
/// times out, or the user presses Ctrl-C.
async fn follow_generation(
    config: &Config,
    client: ApiClient,
    request: GenerationRequest,
) -> Result<()> {
    let kind = request.kind();
    let store = GenerationStore::new(kind, Arc::new(client), config.poll_config(kind));
    let mut events = store.subscribe();

    let started = store
        .start_generation(request)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    let target = started.target_entity_id.clone();
    println!("Started {kind} generation for {target} (job {})", started.job_id);

    let mut last_status: Option<JobStatus> = None;
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                store.stop_tracking(&target);
                println!("Stopped tracking {target}. The job keeps running on the server.");
                break Ok(());
            }
            event = events.recv() => match event {
                Ok(StoreEvent::Updated { target: t, status }) if t == target => {
                    if last_status != Some(status) {
                        println!("  {status}");
                        last_status = Some(status);
                    }
                }
                Ok(StoreEvent::Finished { target: t, status }) if t == target => {
                    // Scores are only part of the full record, which the store
                    // loads on its own once the job finishes.
                    if status == JobStatus::Completed {
                        let wait = timeout(
                            config.request_timeout,
                            wait_for_refresh(&mut events),
                        );
                        if wait.await.is_err() {
                            warn!("Finished record did not load in time; showing the last status");
                        }
                    }
                    let entity = store.entity(&target);
                    break report(status, entity.as_ref());
                }
                Ok(StoreEvent::TimedOut { target: t }) if t == target => {
                    break Err(anyhow!(
                        "Gave up waiting for {target}; the job may still finish on the server"
                    ));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed status events");
                }
                Err(RecvError::Closed) => break Err(anyhow!("Tracking ended unexpectedly")),
            }
        }
    };

    store.shutdown();
    result
}

/// Returns once the store has reloaded its list, or the event bus closes.
async fn wait_for_refresh(events: &mut broadcast::Receiver<StoreEvent>) {
    loop {
        match events.recv().await {
            Ok(StoreEvent::Refreshed { .. }) | Err(RecvError::Closed) => return,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed status events"),
        }
    }
}

fn report(status: JobStatus, entity: Option<&TrackedEntity>) -> Result<()> {
    if status == JobStatus::Failed {
        let message = entity
            .and_then(|e| e.error_message.clone())
            .unwrap_or_else(|| "Generation failed".to_string());
        bail!(message);
    }

    println!("  {status}");
    let score = entity.and_then(|e| {
        e.f64_field("match_score")
            .or_else(|| e.f64_field("overall_score"))
    });
    if let Some(score) = score {
        println!("Score: {score:.0}");
    }
    Ok(())
}

fn print_applications(store: &ApplicationsStore) {
    match store.view_mode() {
        ViewMode::List => {
            for app in store.filtered() {
                let star = if app.is_favorite { "*" } else { " " };
                println!(
                    "{star} {}  {:<13}  {} @ {}",
                    app.id,
                    app.status.label(),
                    app.job_title,
                    app.company
                );
            }
        }
        ViewMode::Kanban => {
            for (status, column) in store.board() {
                if !store.status_filter().matches(status) {
                    continue;
                }
                println!("{} ({})", status.label(), column.len());
                for app in column {
                    println!("    {} @ {}", app.job_title, app.company);
                }
            }
        }
    }
}
