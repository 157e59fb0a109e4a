use std::{fmt::Display, future::Future};

use metrics::{counter, histogram};
use tokio::time::Instant;
use tracing::{error, info};

/// Instrument one job attempt.
///
/// Logs a start line, then exactly one terminal line (completed or failed) with
/// the elapsed milliseconds. The work's output is handed back untouched.
pub async fn track<T, E, F>(label: &str, job_id: &str, work: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    let started_at = Instant::now();
    let queue = label.to_string();

    info!(
        target = "application::jobs::tracker",
        queue = label,
        job_id,
        "job started"
    );
    counter!("pressroom_jobs_started_total", "queue" => queue.clone()).increment(1);

    let result = work.await;
    let elapsed_ms = started_at.elapsed().as_millis() as u64;
    histogram!("pressroom_job_duration_ms", "queue" => queue.clone()).record(elapsed_ms as f64);

    match &result {
        Ok(_) => {
            info!(
                target = "application::jobs::tracker",
                queue = label,
                job_id,
                elapsed_ms,
                "job completed"
            );
            counter!("pressroom_jobs_completed_total", "queue" => queue).increment(1);
        }
        Err(err) => {
            error!(
                target = "application::jobs::tracker",
                queue = label,
                job_id,
                elapsed_ms,
                error = %err,
                "job failed"
            );
            counter!("pressroom_jobs_failed_total", "queue" => queue).increment(1);
        }
    }

    result
}
