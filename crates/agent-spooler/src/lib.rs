// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF materialization and the in-memory job spooler.

pub mod materialize;
pub mod spooler;

pub use materialize::{materialize, MaterializedFile};
pub use spooler::{Spooler, SpoolerEvent, SpoolerSnapshot};
