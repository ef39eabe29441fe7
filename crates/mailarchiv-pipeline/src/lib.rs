// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mailarchiv-pipeline — One message in, one archival PDF and a report out.
//
// Stages, in order: decode (mailarchiv-mime), select the body, classify the
// attachments, render banner and body, convert attachments on the bounded
// pool, merge in tree order, and optionally normalise to PDF/A.

pub mod assemble;
pub mod banner;
pub mod classify;
pub mod finalize;
pub mod orchestrator;
pub mod pool;

pub use orchestrator::{ArchiveOutput, Archiver, Collaborators};
pub use pool::ConversionPool;
