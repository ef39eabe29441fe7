// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document integrity — SHA-256 fingerprints of the raw message and the
// archived PDF, recorded in the run report.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
///
/// The report carries one for the input message (so the host can detect a
/// re-ingested message) and one for the returned document.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PdfWriter;

    #[test]
    fn message_digest_is_stable() {
        let raw = b"Subject: hi\r\n\r\nbody\r\n";
        assert_eq!(
            hash_bytes(raw),
            "c41a1d1716991e03fb5a3e9fa96cbd431efb945f1fd51d6d67a7a25c8d61c496"
        );
    }

    #[test]
    fn one_byte_changes_the_digest() {
        let a = hash_bytes(b"Subject: hi\r\n\r\nbody\r\n");
        let b = hash_bytes(b"Subject: hi\r\n\r\nbody.\r\n");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn digest_of_a_written_pdf_matches_its_bytes() {
        let pdf = PdfWriter::a4().create_from_text("archived").unwrap();
        assert_eq!(hash_bytes(&pdf), hash_bytes(&pdf.clone()));
        assert!(hash_bytes(&pdf).chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
