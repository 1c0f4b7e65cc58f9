// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core types, errors, and the config store shared across all agent crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AgentConfig, ConfigStore};
pub use error::AgentError;
pub use types::*;
