//! RFC 5389 STUN binding messages with the ICE usage of RFC 5245.
//!
//! Only the binding method is implemented; the codec is shared by the ICE
//! ports (inbound requests, outbound responses) and connections (outbound
//! pings, inbound responses). The FINGERPRINT attribute doubles as the
//! demultiplexer between STUN and DTLS/RTP sharing the same 5-tuple.

pub mod attributes;
pub mod message;

pub use attributes::*;
pub use message::*;

pub const MAGIC_COOKIE: u32 = 0x2112A442;
pub const MESSAGE_HEADER_SIZE: usize = 20;
pub const ATTRIBUTE_HEADER_SIZE: usize = 4;
pub const TRANSACTION_ID_SIZE: usize = 12;
pub const MESSAGE_INTEGRITY_SIZE: usize = 20;
pub const FINGERPRINT_SIZE: usize = 4;
pub const FINGERPRINT_XOR_VALUE: u32 = 0x5354554E;

pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_RESPONSE: u16 = 0x0101;
pub const BINDING_ERROR_RESPONSE: u16 = 0x0111;

pub const ERROR_BAD_REQUEST: u16 = 400;
pub const ERROR_UNAUTHORIZED: u16 = 401;
pub const ERROR_UNKNOWN_ATTRIBUTE: u16 = 420;
pub const ERROR_SERVER_ERROR: u16 = 500;

pub const REASON_BAD_REQUEST: &str = "Bad Request";
pub const REASON_UNAUTHORIZED: &str = "Unauthorized";
pub const REASON_SERVER_ERROR: &str = "Server Error";

pub fn method_to_string(typ: u16) -> &'static str {
    match typ {
        BINDING_REQUEST => "BINDING-REQUEST",
        BINDING_RESPONSE => "BINDING-RESPONSE",
        BINDING_ERROR_RESPONSE => "BINDING-ERROR-RESPONSE",
        _ => "UNKNOWN",
    }
}
