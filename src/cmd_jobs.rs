//! Jobs subcommand handlers for Tidewatch.

use tidewatch_api::{FileJobStore, Job, JobStore};
use tidewatch_config::Config;

use crate::cli::JobsAction;

/// Handle jobs subcommands.
pub(crate) async fn handle_jobs_command(
    action: JobsAction,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        JobsAction::List { store, format } => jobs_list(config, store.as_deref(), &format).await,
    }
}

/// List persisted jobs straight from the job stores.
async fn jobs_list(
    config: &Config,
    store: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let job_store = FileJobStore::new(config.jobs_path()).await?;
    let mut jobs = match store {
        Some(name) => job_store.load_store(name).await?,
        None => job_store.load_all().await?,
    };
    jobs.sort_by_key(Job::key);

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&jobs)?;
            println!("{}", json);
        }
        _ => {
            // Table format
            println!(
                "{:<28} {:<22} {:<26} {:<26} {}",
                "JOB", "TARGET", "TRIGGER", "NEXT RUN", "LAST ERROR"
            );
            println!("{}", "-".repeat(120));
            for job in jobs {
                let next_run = job
                    .next_run
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<28} {:<22} {:<26} {:<26} {}",
                    job.key().to_string(),
                    job.definition.target.to_string(),
                    job.definition.trigger.to_string(),
                    next_run,
                    job.last_error.as_deref().unwrap_or("-"),
                );
            }
        }
    }

    Ok(())
}
