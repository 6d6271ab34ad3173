//! Plain-text rendering of jobs and store events.

use std::fmt::Write;

use vr180_core::media::{format_duration, format_filesize};
use vr180_core::{Job, JobStatus, LibraryStats, StoreEvent};

/// Shown when a job finishes.
pub const READY_MESSAGE: &str = "Your video is ready to watch!";

/// One line per job, aligned columns, newest first as given.
pub fn jobs_table(jobs: &[&Job], resolve: &dyn Fn(&str) -> String) -> String {
    if jobs.is_empty() {
        return "No videos yet. Upload one to get started.\n".to_string();
    }

    let rows: Vec<[String; 6]> = jobs
        .iter()
        .map(|job| {
            let video = job.video.as_ref();
            [
                job.id.to_string(),
                job.status.to_string(),
                progress_cell(job),
                video
                    .and_then(|v| v.filesize)
                    .map(format_filesize)
                    .unwrap_or_else(|| "-".into()),
                video
                    .and_then(|v| v.duration)
                    .map(format_duration)
                    .unwrap_or_else(|| "-".into()),
                match &job.output_location {
                    Some(output) => format!("{}  {}", job.title(), resolve(output)),
                    None => job.title().to_string(),
                },
            ]
        })
        .collect();

    let header = ["ID", "STATUS", "PROGRESS", "SIZE", "DURATION", "VIDEO"];
    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    write_row(&mut out, &header.map(String::from), &widths);
    for row in &rows {
        write_row(&mut out, row, &widths);
    }
    out
}

fn write_row(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let last = cells.len() - 1;
    for (i, (cell, width)) in cells.iter().zip(widths.iter().copied()).enumerate() {
        if i == last {
            let _ = writeln!(out, "{cell}");
        } else {
            let _ = write!(out, "{cell:<width$}  ");
        }
    }
}

fn progress_cell(job: &Job) -> String {
    match job.status {
        JobStatus::Processing => format!("{}%", job.progress),
        JobStatus::Completed => "100%".into(),
        _ => "-".into(),
    }
}

/// Human-readable line for a store event, if it is worth showing.
pub fn event_line(event: &StoreEvent, resolve: &dyn Fn(&str) -> String) -> Option<String> {
    match event {
        StoreEvent::Inserted { job_id } => Some(format!("Job {job_id} created")),
        StoreEvent::Updated {
            job_id,
            status: JobStatus::Processing,
            progress,
        } => Some(format!("Job {job_id}: PROCESSING {progress}%")),
        // Followed by a `Completed` event carrying the output.
        StoreEvent::Updated {
            status: JobStatus::Completed,
            ..
        } => None,
        StoreEvent::Updated { job_id, status, .. } => Some(format!("Job {job_id}: {status}")),
        StoreEvent::Completed {
            job_id,
            output_location,
        } => Some(match output_location {
            Some(output) => format!("Job {job_id}: {READY_MESSAGE} {}", resolve(output)),
            None => format!("Job {job_id}: {READY_MESSAGE}"),
        }),
        StoreEvent::Replaced { .. } | StoreEvent::Discarded { .. } => None,
    }
}

pub fn stats_summary(stats: &LibraryStats) -> String {
    format!(
        "Videos: {}\nReady: {}\nProcessing: {}\nFailed or cancelled: {}\n",
        stats.total, stats.ready, stats.in_progress, stats.unsuccessful
    )
}
