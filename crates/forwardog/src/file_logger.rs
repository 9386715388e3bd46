// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Appends log lines to a file tailed by the Datadog agent.
//!
//! Whether the parent directory can be created is checked once, at construction. When it can't
//! (typically outside a container with a shared volume) every write reports a failed outcome
//! without touching the filesystem.

use crate::outcome::{request_id, unexpected_hint, Outcome};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error as ThisError;
use tracing::{debug, error, warn};

/// Status levels accepted by the Datadog logs pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    #[default]
    Info,
    Debug,
}

impl LogStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::Alert => "alert",
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

#[derive(ThisError, Debug)]
pub enum FileLoggerError {
    #[error("Log directory not available: {0}")]
    DirectoryUnavailable(String),
    #[error("Permission denied writing to {0}")]
    PermissionDenied(String),
    #[error("Error: {0}")]
    Io(#[from] io::Error),
    #[error("Error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl FileLoggerError {
    fn hint(&self) -> String {
        match self {
            Self::DirectoryUnavailable(_) => {
                "Log directory is not writable. This feature requires Docker with shared volumes."
                    .to_string()
            }
            Self::PermissionDenied(_) => {
                "Check file permissions and volume mount configuration.".to_string()
            }
            Self::Io(err) => unexpected_hint(&format!("{:?}", err.kind())),
            Self::Encode(_) => unexpected_hint("EncodeError"),
        }
    }
}

/// Optional fields stamped on every JSON-formatted line
#[derive(Debug, Clone, Default)]
pub struct JsonLineFields<'a> {
    pub service: Option<&'a str>,
    pub source: Option<&'a str>,
    pub tags: &'a [String],
    pub status: Option<LogStatus>,
}

#[derive(Debug)]
pub struct FileLogger {
    log_path: PathBuf,
    directory_available: bool,
}

impl FileLogger {
    #[must_use]
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        let log_path = log_path.into();
        let directory_available = ensure_log_directory(&log_path);
        Self {
            log_path,
            directory_available,
        }
    }

    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.directory_available
    }

    /// Appends each message as one line, adding the trailing newline where missing.
    pub fn write_raw(&self, messages: &[String]) -> Outcome {
        let started = Instant::now();
        let request_id = request_id("agent-file");

        let mut buffer = String::new();
        for message in messages {
            buffer.push_str(message);
            if !message.ends_with('\n') {
                buffer.push('\n');
            }
        }
        let result = self.append(buffer.as_bytes());

        match result {
            Ok(()) => Outcome::succeeded(
                &request_id,
                format!(
                    "Written {} log lines to {}",
                    messages.len(),
                    self.log_path.display()
                ),
                started,
            )
            .with_body(json!({
                "path": self.log_path.display().to_string(),
                "lines_written": messages.len(),
            })),
            Err(err) => self.failure(&request_id, started, &err),
        }
    }

    /// Appends each message as a JSON object with a UTC timestamp and the given fields.
    pub fn write_json(&self, messages: &[String], fields: &JsonLineFields<'_>) -> Outcome {
        let started = Instant::now();
        let request_id = request_id("agent-file-json");

        let result = json_lines(messages, fields)
            .map_err(FileLoggerError::from)
            .and_then(|buffer| self.append(buffer.as_bytes()));

        match result {
            Ok(()) => Outcome::succeeded(
                &request_id,
                format!(
                    "Written {} JSON log entries to {}",
                    messages.len(),
                    self.log_path.display()
                ),
                started,
            )
            .with_body(json!({
                "path": self.log_path.display().to_string(),
                "lines_written": messages.len(),
                "format": "json",
            })),
            Err(err) => self.failure(&request_id, started, &err),
        }
    }

    /// Last `n` lines of the file, or every line when `n` is 0.
    ///
    /// Empty when the file is missing or unreadable. Invalid UTF-8 is replaced, not dropped.
    #[must_use]
    pub fn recent_lines(&self, n: usize) -> Vec<String> {
        if !self.directory_available {
            return Vec::new();
        }
        let content = match fs::read(&self.log_path) {
            Ok(content) => content,
            Err(e) => {
                debug!("Unable to read {}: {e}", self.log_path.display());
                return Vec::new();
            }
        };
        let text = String::from_utf8_lossy(&content);
        let lines: Vec<&str> = text.lines().collect();
        let skip = if n == 0 {
            0
        } else {
            lines.len().saturating_sub(n)
        };
        lines.into_iter().skip(skip).map(ToString::to_string).collect()
    }

    /// Truncates the file.
    pub fn clear(&self) -> Outcome {
        let started = Instant::now();
        let request_id = request_id("agent-file-clear");

        let result = if self.directory_available {
            File::create(&self.log_path)
                .map(|_| ())
                .map_err(|e| self.classify(e))
        } else {
            Err(self.unavailable())
        };

        match result {
            Ok(()) => Outcome::succeeded(
                &request_id,
                format!("Log file cleared: {}", self.log_path.display()),
                started,
            ),
            Err(err) => self.failure(&request_id, started, &err),
        }
    }

    /// Appends the whole batch with a single write so concurrent writers never split a line.
    fn append(&self, buffer: &[u8]) -> Result<(), FileLoggerError> {
        if !self.directory_available {
            return Err(self.unavailable());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| self.classify(e))?;
        file.write_all(buffer).map_err(|e| self.classify(e))?;
        file.flush().map_err(|e| self.classify(e))
    }

    fn unavailable(&self) -> FileLoggerError {
        let parent = self
            .log_path
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        FileLoggerError::DirectoryUnavailable(parent)
    }

    fn classify(&self, err: io::Error) -> FileLoggerError {
        if err.kind() == ErrorKind::PermissionDenied {
            FileLoggerError::PermissionDenied(self.log_path.display().to_string())
        } else {
            FileLoggerError::Io(err)
        }
    }

    fn failure(&self, request_id: &str, started: Instant, err: &FileLoggerError) -> Outcome {
        error!("{request_id}: Failed to write agent log file: {err}");
        Outcome::failed(request_id, err.to_string(), started, Some(err.hint()))
    }
}

fn ensure_log_directory(log_path: &Path) -> bool {
    let Some(parent) = log_path.parent() else {
        return true;
    };
    if parent.as_os_str().is_empty() {
        return true;
    }
    match fs::create_dir_all(parent) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                "Agent log directory {} is not available: {e}",
                parent.display()
            );
            false
        }
    }
}

fn json_lines(messages: &[String], fields: &JsonLineFields<'_>) -> serde_json::Result<String> {
    let mut buffer = String::new();
    for message in messages {
        buffer.push_str(&serde_json::to_string(&json_line(message, fields))?);
        buffer.push('\n');
    }
    Ok(buffer)
}

fn json_line(message: &str, fields: &JsonLineFields<'_>) -> Value {
    let mut entry = Map::new();
    entry.insert("message".to_string(), Value::from(message));
    entry.insert(
        "timestamp".to_string(),
        Value::from(
            chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.6fZ")
                .to_string(),
        ),
    );
    if let Some(service) = fields.service.filter(|s| !s.is_empty()) {
        entry.insert("service".to_string(), Value::from(service));
    }
    if let Some(source) = fields.source.filter(|s| !s.is_empty()) {
        entry.insert("source".to_string(), Value::from(source));
    }
    if let Some(status) = fields.status {
        entry.insert("status".to_string(), Value::from(status.as_str()));
    }
    if !fields.tags.is_empty() {
        entry.insert("ddtags".to_string(), Value::from(fields.tags.join(",")));
    }
    Value::Object(entry)
}
