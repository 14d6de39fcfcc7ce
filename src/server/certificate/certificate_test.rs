use super::*;

#[test]
fn test_generate_produces_sha256_fingerprint() {
    let cert = RtcCertificate::generate().unwrap();
    assert_eq!(cert.fingerprint.len(), 32);
    // 32 hex pairs joined by colons.
    assert_eq!(cert.fingerprint_hex.len(), 32 * 3 - 1);
    assert!(cert
        .fingerprint_hex
        .chars()
        .all(|c| c.is_ascii_hexdigit() || c == ':'));
    assert!(!cert.has_expired());
}

#[test]
fn test_fingerprint_matches_der_digest() {
    let cert = RtcCertificate::generate().unwrap();
    let der = cert.dtls_cert.certificate.first().unwrap().0.clone();
    assert_eq!(Sha256::digest(&der).to_vec(), cert.fingerprint);
}

#[test]
fn test_distinct_certificates_have_distinct_fingerprints() {
    let a = RtcCertificate::generate().unwrap();
    let b = RtcCertificate::generate().unwrap();
    assert_ne!(a.fingerprint, b.fingerprint);
}
