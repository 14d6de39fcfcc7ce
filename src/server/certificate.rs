#[cfg(test)]
mod certificate_test;

use std::time::{Duration, SystemTime};

use dtls::crypto::Certificate;
use log::info;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const CERTIFICATE_VALIDITY: Duration = Duration::from_secs(365 * 24 * 3600);

/// The self-signed DTLS certificate shared read-only by all worker shards,
/// with its SHA-256 fingerprint in both raw and SDP form.
pub struct RtcCertificate {
    pub dtls_cert: Certificate,
    pub fingerprint: Vec<u8>,
    /// Upper-case colon-separated hex, as used in `a=fingerprint:sha-256`.
    pub fingerprint_hex: String,
    generated_at: SystemTime,
}

impl RtcCertificate {
    /// Generates a fresh in-memory certificate. Nothing is persisted; on
    /// expiry a new one is generated and newly-created peers pick it up.
    pub fn generate() -> Result<Self> {
        let dtls_cert = Certificate::generate_self_signed(vec!["rtcgate".to_owned()])
            .map_err(|e| Error::Other(e.to_string()))?;
        let der = dtls_cert
            .certificate
            .first()
            .map(|c| c.0.clone())
            .unwrap_or_default();
        let fingerprint: Vec<u8> = Sha256::digest(&der).to_vec();
        let fingerprint_hex = fingerprint
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":");
        info!("generated DTLS certificate, fingerprint: {fingerprint_hex}");
        Ok(RtcCertificate {
            dtls_cert,
            fingerprint,
            fingerprint_hex,
            generated_at: SystemTime::now(),
        })
    }

    pub fn has_expired(&self) -> bool {
        match self.generated_at.elapsed() {
            Ok(elapsed) => elapsed >= CERTIFICATE_VALIDITY,
            // Clock went backwards; keep the certificate.
            Err(_) => false,
        }
    }
}
