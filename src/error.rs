use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // STUN
    #[error("buffer too small to hold a STUN message")]
    ErrStunUnexpectedEof,
    #[error("not a STUN message")]
    ErrNotStunMessage,
    #[error("STUN attribute not found")]
    ErrAttributeNotFound,
    #[error("STUN attribute has invalid size")]
    ErrAttributeSizeInvalid,
    #[error("STUN fingerprint mismatch")]
    ErrFingerprintMismatch,
    #[error("STUN message integrity mismatch")]
    ErrIntegrityMismatch,
    #[error("unsupported STUN address family")]
    ErrUnsupportedAddressFamily,
    #[error("malformed STUN username")]
    ErrBadUsernameFormat,
    #[error("malformed STUN error-code attribute")]
    ErrBadErrorCode,

    // ICE
    #[error("no free port in range {min}..={max}")]
    ErrNoFreePortInRange { min: u16, max: u16 },
    #[error("local ICE parameters are not set")]
    ErrIceParamsUnset,

    // DTLS
    #[error("DTLS transport is not active")]
    ErrDtlsNotActive,
    #[error("cannot change certificate in this state")]
    ErrCertificateChange,
    #[error("unsupported fingerprint algorithm: {0}")]
    ErrUnsupportedFingerprintAlgorithm(String),
    #[error("DTLS handshake failed: {0}")]
    ErrDtlsHandshake(String),

    // SRTP
    #[error("SRTP session not started")]
    ErrSessionNotStarted,
    #[error("SRTP master key must be {expect} bytes, got {got}")]
    ErrBadMasterKeyLength { expect: usize, got: usize },
    #[error("SRTP master salt must be {expect} bytes, got {got}")]
    ErrBadMasterSaltLength { expect: usize, got: usize },
    #[error("packet too short to be a valid SRTP packet")]
    ErrSrtpTooSmall,
    #[error("packet too short to be a valid SRTCP packet")]
    ErrSrtcpTooSmall,
    #[error("failed to verify SRTP auth tag")]
    ErrFailedToVerifyAuthTag,
    #[error("failed to verify SRTCP auth tag")]
    ErrFailedToVerifyRtcpAuthTag,
    #[error("SRTP replay check failed, index {0}")]
    ErrSrtpReplayed(u64),

    // RTP/RTCP
    #[error("packet too short to be a valid RTP packet")]
    ErrRtpTooSmall,
    #[error("packet too short to be a valid RTCP packet")]
    ErrRtcpTooSmall,
    #[error("bad RTP version")]
    ErrBadVersion,
    #[error("RTCP packet type {0} cannot be parsed here")]
    ErrWrongRtcpType(u8),
    #[error("RTCP header length field disagrees with buffer size")]
    ErrBadRtcpLength,

    // peer / server
    #[error("stream not found: {0}")]
    ErrStreamNotFound(String),
    #[error("uid mismatch for stream {0}")]
    ErrUidMismatch(String),
    #[error("worker is gone")]
    ErrWorkerGone,
    #[error("server is closed")]
    ErrServerClosed,

    // config
    #[error("invalid ICE port range {min}..{max}")]
    ErrInvalidPortRange { min: u16, max: u16 },
    #[error("invalid worker_num: {0}")]
    ErrInvalidWorkerNum(usize),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{0}")]
    Other(String),
}
