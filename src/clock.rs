
use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;

lazy_static! {
    static ref ANCHOR: Instant = Instant::now();
}

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01).
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

/// Monotonic milliseconds since process start.
pub fn now_ms() -> i64 {
    ANCHOR.elapsed().as_millis() as i64
}

/// Monotonic microseconds since process start. Used as the receive timestamp
/// for inbound datagrams when no kernel timestamp is available.
pub fn now_micros() -> i64 {
    ANCHOR.elapsed().as_micros() as i64
}

/// 64-bit NTP timestamp: upper 32 bits seconds, lower 32 bits fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpTime(pub u64);

impl NtpTime {
    pub fn new(seconds: u32, fractions: u32) -> Self {
        NtpTime(((seconds as u64) << 32) | fractions as u64)
    }

    pub fn seconds(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn fractions(&self) -> u32 {
        self.0 as u32
    }

    pub fn valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for NtpTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.seconds(), self.fractions())
    }
}

/// The middle 32 bits of an NTP timestamp, as carried in the LSR and DLSR
/// fields of an RTCP report block (RFC 3550 section 6.4.1).
pub fn compact_ntp(t: NtpTime) -> u32 {
    ((t.seconds() & 0xFFFF) << 16) | ((t.fractions() >> 16) & 0xFFFF)
}

pub fn now_ntp() -> NtpTime {
    let since_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let seconds = since_unix.as_secs() + NTP_UNIX_OFFSET_SECS;
    let fractions = ((since_unix.subsec_nanos() as u64) << 32) / 1_000_000_000;
    NtpTime::new(seconds as u32, fractions as u32)
}

/// Time source for the RTP/RTCP pipeline. Production code uses
/// [`SystemClock`]; tests drive a manual clock to make report timing
/// deterministic.
pub trait Clock {
    fn now_ms(&self) -> i64;
    fn now_ntp(&self) -> NtpTime;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        now_ms()
    }

    fn now_ntp(&self) -> NtpTime {
        now_ntp()
    }
}
