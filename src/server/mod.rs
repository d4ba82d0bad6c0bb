//! Line protocol front end: parsing, the worker pool and the result writer

pub mod handoff;
pub mod pool;
pub mod protocol;

pub use handoff::{rendezvous, HandoffClosed, HandoffReceiver, HandoffSender};
pub use pool::{QueryServer, ServerStats, StatsSnapshot};
pub use protocol::{parse_line, parse_raw_line, ParsedLine, ProtocolMode, Response, ResultRecord, NO_REMOTE_IP};
