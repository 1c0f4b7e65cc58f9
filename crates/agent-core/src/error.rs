// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for the print agent.

use thiserror::Error;

/// Top-level error type for all agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("queue is full")]
    QueueFull,

    #[error("invalid print job payload: {0}")]
    InvalidPayload(String),

    #[error("server job {0} is already in flight")]
    DuplicateServerJob(String),

    #[error("failed to materialize document: {0}")]
    MaterializeError(String),

    #[error("print command failed: {0}")]
    PrintError(String),

    #[error("job was cancelled while printing")]
    CancelledDuringPrint,

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("remote transport error: {0}")]
    RemoteTransportError(String),

    #[error("config I/O error: {0}")]
    ConfigIOError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AgentError>;
