//! Subcommand implementations.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use tokio::sync::broadcast;
use validator::Validate;
use vr180_client::{ApiClient, Dashboard, GatewayError, TransferProgress};
use vr180_core::forms::{describe_errors, LoginForm, RegisterForm};
use vr180_core::media::format_filesize;
use vr180_core::{Job, JobId, LibraryStats, StoreEvent};

use crate::render;

pub async fn login(api: &ApiClient, email: String, password: String) -> Result<()> {
    let form = LoginForm { email, password };
    if let Err(errors) = form.validate() {
        bail!(describe_errors(&errors).join("\n"));
    }

    let user = api.login(&form).await.map_err(|e| anyhow!(e.user_message()))?;
    match user {
        Some(user) => println!("Signed in as {}", user.display_name()),
        None => println!("Signed in"),
    }
    Ok(())
}

pub async fn register(
    api: &ApiClient,
    nick_name: String,
    email: String,
    password: String,
    confirm_password: String,
) -> Result<()> {
    let form = RegisterForm {
        nick_name,
        email,
        password,
        confirm_password,
    };
    if let Err(errors) = form.validate() {
        bail!(describe_errors(&errors).join("\n"));
    }

    let detail = api
        .register(&form)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    println!("{detail}");
    Ok(())
}

pub async fn logout(api: &ApiClient) -> Result<()> {
    if let Err(e) = api.logout().await {
        tracing::warn!(error = %e, "Backend logout failed; local session cleared anyway");
    }
    println!("Signed out");
    Ok(())
}

pub async fn whoami(api: &ApiClient) -> Result<()> {
    let Some(user) = api.session().user()? else {
        bail!("Please sign in first.");
    };
    println!("{} <{}>", user.display_name(), user.email);

    let stats = LibraryStats::tally(&load_jobs(api).await?);
    println!("{} ready, {} processing", stats.ready, stats.in_progress);
    Ok(())
}

pub async fn jobs(api: &ApiClient, json: bool) -> Result<()> {
    let jobs = load_jobs(api).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
    } else {
        let rows: Vec<&Job> = jobs.iter().collect();
        print!("{}", render::jobs_table(&rows, &|output| api.media_url(output)));
    }
    Ok(())
}

pub async fn stats(api: &ApiClient) -> Result<()> {
    let jobs = load_jobs(api).await?;
    print!("{}", render::stats_summary(&LibraryStats::tally(&jobs)));
    Ok(())
}

pub async fn open(api: &ApiClient, job_id: &str) -> Result<()> {
    let jobs = load_jobs(api).await?;
    let output = playable_output(&jobs, job_id)?;
    println!("{}", api.media_url(output));
    Ok(())
}

pub async fn download(api: &ApiClient, job_id: &str, out: Option<PathBuf>) -> Result<()> {
    let jobs = load_jobs(api).await?;
    let output = playable_output(&jobs, job_id)?;

    let dest = out.unwrap_or_else(|| default_download_path(job_id, output));
    if dest.exists() {
        bail!("{} already exists; choose another path with --out", dest.display());
    }

    let bytes = api
        .download_output(output, &dest, print_download_progress)
        .await
        .map_err(|e| {
            eprintln!();
            user_facing(e)
        })?;
    eprintln!();
    println!("Saved {} ({})", dest.display(), format_filesize(bytes));
    Ok(())
}

pub async fn upload(api: ApiClient, file: &Path, follow: bool) -> Result<()> {
    let mut dashboard = Dashboard::new(api);
    let events = dashboard.subscribe();

    // Show the existing library's state so a refresh can settle its jobs
    // too; failure here is not fatal for the upload.
    if let Err(e) = dashboard.refresh().await {
        tracing::warn!(error = %e, "Could not load existing jobs");
    }

    let job_id = dashboard
        .upload(file, print_upload_progress)
        .await
        .map_err(|e| {
            eprintln!();
            let mut message = e.user_message();
            if e.gateway_error().is_some_and(GatewayError::is_retryable) {
                message.push_str(" Run the same command to try again.");
            }
            anyhow!(message)
        })?;
    eprintln!();
    println!("Upload successful! Conversion job {job_id} started.");

    if follow {
        follow_until_settled(&mut dashboard, events).await;
    }
    dashboard.shutdown();
    Ok(())
}

pub async fn watch(api: ApiClient) -> Result<()> {
    let mut dashboard = Dashboard::new(api);
    let events = dashboard.subscribe();
    dashboard.refresh().await.map_err(user_facing)?;

    if dashboard.is_settled() {
        println!("No conversions in progress.");
        return Ok(());
    }
    follow_until_settled(&mut dashboard, events).await;
    dashboard.shutdown();
    Ok(())
}

// ---- private helpers ----

/// One listing, without opening any live subscription.
async fn load_jobs(api: &ApiClient) -> Result<Vec<Job>> {
    let snapshot = api.list_jobs().await.map_err(user_facing)?;
    Ok(snapshot.jobs)
}

fn playable_output<'a>(jobs: &'a [Job], job_id: &str) -> Result<&'a str> {
    let id = JobId::from(job_id);
    let Some(job) = jobs.iter().find(|job| job.id == id) else {
        bail!("No job with id {job_id}");
    };
    match job.playable_output() {
        Some(output) => Ok(output),
        None => bail!("Job {job_id} is {} and has no video to play yet", job.status),
    }
}

/// The output's own file name, or `job-<id>.mp4` when it has none.
fn default_download_path(job_id: &str, output: &str) -> PathBuf {
    let path = output.split(['?', '#']).next().unwrap_or(output);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => PathBuf::from(name),
        _ => PathBuf::from(format!("job-{job_id}.mp4")),
    }
}

/// Apply live updates and print them until nothing is running or the
/// user interrupts.
async fn follow_until_settled(dashboard: &mut Dashboard, mut events: broadcast::Receiver<StoreEvent>) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        print_events(dashboard, &mut events);
        if dashboard.is_settled() {
            break;
        }

        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted; stopping live updates");
                break;
            }
            more = dashboard.next_event() => {
                if !more {
                    break;
                }
            }
        }
    }
}

fn print_events(dashboard: &Dashboard, events: &mut broadcast::Receiver<StoreEvent>) {
    let api = dashboard.api();
    loop {
        match events.try_recv() {
            Ok(event) => {
                if let Some(line) = render::event_line(&event, &|output| api.media_url(output)) {
                    println!("{line}");
                }
            }
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Missed store events");
            }
            Err(_) => break,
        }
    }
}

fn print_upload_progress(progress: TransferProgress) {
    eprint!("\rUploading... {:>3}%", progress.percent());
    let _ = std::io::stderr().flush();
}

fn print_download_progress(progress: TransferProgress) {
    if progress.total == 0 {
        eprint!("\rDownloading... {}", format_filesize(progress.sent));
    } else {
        eprint!("\rDownloading... {:>3}%", progress.percent());
    }
    let _ = std::io::stderr().flush();
}

fn user_facing(err: GatewayError) -> anyhow::Error {
    tracing::debug!(error = %err, retryable = err.is_retryable(), "Request failed");
    if err.is_auth() {
        return anyhow!("{}\nRun `vr180 login` to sign in.", err.user_message());
    }
    anyhow!(err.user_message())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use vr180_core::JobStatus;

    use super::*;

    #[test]
    fn download_name_comes_from_output() {
        assert_eq!(
            default_download_path("4", "/media/outputs/a_vr180.mp4"),
            PathBuf::from("a_vr180.mp4")
        );
        assert_eq!(
            default_download_path("4", "https://cdn.example.com/x/b.mp4?sig=abc"),
            PathBuf::from("b.mp4")
        );
        assert_eq!(default_download_path("4", "/media/outputs/"), PathBuf::from("job-4.mp4"));
    }

    #[test]
    fn only_completed_jobs_are_playable() {
        let jobs = vec![
            Job::new("1", "v1", Utc::now())
                .with_status(JobStatus::Completed)
                .with_output("/out.mp4"),
            Job::new("2", "v2", Utc::now()).with_status(JobStatus::Processing),
        ];

        assert_eq!(playable_output(&jobs, "1").unwrap(), "/out.mp4");
        let err = playable_output(&jobs, "2").unwrap_err();
        assert_eq!(err.to_string(), "Job 2 is PROCESSING and has no video to play yet");
        let err = playable_output(&jobs, "3").unwrap_err();
        assert_eq!(err.to_string(), "No job with id 3");
    }
}
