// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The remote client: polls the command-center server for pending jobs,
// heartbeats, and reports terminal job status back.

pub mod auth;
pub mod client;
pub mod tasks;

pub use tasks::RemoteClient;
