// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mailarchiv-mime — Turns raw RFC 5322 bytes into the typed message tree and
// picks the body representation that goes into the archive.

pub mod decode;
pub mod html;
pub mod select;

pub use decode::MessageDecoder;
pub use select::select_body;
