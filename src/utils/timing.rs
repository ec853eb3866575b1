use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::models::Identifier;

pub const TIMING_TARGET: &str = "story.timing";

/// Tracks one HTTP request from receipt to response for the timing log.
#[derive(Debug)]
pub struct RequestTimer {
    operation: String,
    user_id: Option<String>,
    image_count: usize,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl RequestTimer {
    pub fn new(operation: &str, user_id: Option<&Identifier>, image_count: usize) -> Self {
        RequestTimer {
            operation: operation.to_string(),
            user_id: user_id.map(|id| id.to_string()),
            image_count,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            "event=request_received operation={} user_id={:?} images={} received_at={}",
            self.operation,
            self.user_id,
            self.image_count,
            self.started_at.to_rfc3339()
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=request_completed operation={} user_id={:?} images={} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.operation,
            self.user_id,
            self.image_count,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }

    #[cfg(test)]
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Drop for RequestTimer {
    // A dropped request future (client disconnect) still gets a completion line.
    fn drop(&mut self) {
        if !self.completed {
            self.mark_status("cancelled", None);
            self.log_completed();
        }
    }
}

pub fn start_request_timer(
    operation: &str,
    user_id: Option<&Identifier>,
    image_count: usize,
) -> RequestTimer {
    let timer = RequestTimer::new(operation, user_id, image_count);
    timer.log_received();
    timer
}

pub fn complete_request_timer(timer: &mut RequestTimer, status: &str, detail: Option<String>) {
    if timer.completed {
        return;
    }
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_capability_timing<T, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    call: F,
) -> Result<T, anyhow::Error>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    info!(
        target: TIMING_TARGET,
        "event=llm_request provider={} model={} operation={} started_at={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339()
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: TIMING_TARGET,
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status
    );

    result
}
