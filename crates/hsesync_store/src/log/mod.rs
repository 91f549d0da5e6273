//! The append-only transaction log.
//!
//! ## Record format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! The CRC covers everything before it. Integers are little endian.
//!
//! ## Recovery
//!
//! - a truncated header or payload at the tail is a torn write and is cut off
//! - bad magic, an unknown version or type, or a CRC mismatch refuses the open
//! - only transactions whose `Commit` made it to the log are replayed

mod reader;
mod record;
mod writer;

pub use reader::LogReader;
pub use record::{
    compute_crc32, LogRecord, LogRecordType, CRC_SIZE, HEADER_SIZE, LOG_MAGIC, LOG_VERSION,
};
pub use writer::LogWriter;
