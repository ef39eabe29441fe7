// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mailarchiv — Core types, policy, report, and error definitions shared
// across all crates.

pub mod config;
pub mod error;
pub mod report;
pub mod types;

pub use config::{ArchivalPolicy, BodyPreference, ConsumptionScope, NoBodyPolicy, PipelineConfig};
pub use error::{ArchiveError, ConvertError};
pub use report::PipelineReport;
pub use types::*;
