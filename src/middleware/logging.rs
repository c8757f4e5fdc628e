//! Request logging stage.
//!
//! Logs every call with method, path, query, status code and latency, both
//! as a `tracing` event and as one line in the optional access-log file.

use crate::middleware::{Next, Stage};
use async_trait::async_trait;
use axum::{extract::Request, response::Response};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Append-only text log, opened lazily and reopened after a failed write.
///
/// `append` does blocking file I/O; the logging stage calls it from
/// `spawn_blocking`.
pub struct AccessLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl AccessLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, line: &str) -> io::Result<()> {
        let mut guard = self.file.lock();
        if guard.is_none() {
            *guard = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }

        let result = match guard.as_mut() {
            Some(file) => file.write_all(line.as_bytes()),
            None => Ok(()),
        };
        if result.is_err() {
            *guard = None;
        }
        result
    }
}

/// Outermost stage: times the whole chain, runs exactly once per call.
#[derive(Default)]
pub struct RequestLogging {
    sink: Option<Arc<AccessLog>>,
}

impl RequestLogging {
    pub fn new(sink: Option<Arc<AccessLog>>) -> Self {
        Self { sink }
    }
}

fn access_line(
    at: DateTime<Utc>,
    method: &str,
    path: &str,
    query: &str,
    status: u16,
    elapsed: Duration,
) -> String {
    format!(
        "{} | Method: {} | Path: {} | Query: {} | Status: {} | Duration: {:?}\n",
        at.format("%Y-%m-%d %H:%M:%S"),
        method,
        path,
        query,
        status,
        elapsed
    )
}

#[async_trait]
impl Stage for RequestLogging {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(&self, req: Request, next: Next<'_>) -> Response {
        let at = Utc::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or_default().to_string();
        let start = Instant::now();

        let response = next.run(req).await;

        let latency = start.elapsed();
        let status = response.status().as_u16();

        if status >= 500 {
            warn!(
                method = %method,
                path = %path,
                query = %query,
                status = status,
                latency_ms = latency.as_millis(),
                "Request failed (5xx)"
            );
        } else {
            info!(
                method = %method,
                path = %path,
                query = %query,
                status = status,
                latency_ms = latency.as_millis(),
                "Request completed"
            );
        }

        if let Some(sink) = &self.sink {
            let line = access_line(at, method.as_str(), &path, &query, status, latency);
            let writer = sink.clone();
            match tokio::task::spawn_blocking(move || writer.append(&line)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!("⚠️  Failed to write access log {}: {}", sink.path().display(), err)
                }
                Err(err) => warn!("⚠️  Access log writer task failed: {}", err),
            }
        }

        response
    }
}
