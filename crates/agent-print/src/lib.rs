// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer enumeration and print execution via OS shell commands.

pub mod enumerate;
pub mod executor;

pub use enumerate::enumerate_printers;
pub use executor::print_file;
