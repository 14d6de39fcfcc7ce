//! RTCP codecs (header, report blocks, RR, SR), the compound receiver that
//! absorbs sender reports, and the sender that builds periodic receiver
//! reports with LSR/DLSR fields.

pub mod header;
pub mod reception_report;
pub mod receiver_report;
pub mod rtcp_receiver;
pub mod rtcp_sender;
pub mod rtp_rtcp;
pub mod sender_report;

pub use header::*;
pub use reception_report::*;
pub use receiver_report::*;
pub use rtcp_receiver::*;
pub use rtcp_sender::*;
pub use rtp_rtcp::*;
pub use sender_report::*;
