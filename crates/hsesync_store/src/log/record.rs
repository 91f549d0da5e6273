//! Log record types and their byte encoding.

use crate::error::{StoreError, StoreResult};

/// Magic bytes opening every log record.
pub const LOG_MAGIC: [u8; 4] = *b"HSEL";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub const HEADER_SIZE: usize = 11;

/// Trailing CRC32.
pub const CRC_SIZE: usize = 4;

/// Type byte of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// Opens a transaction.
    Begin = 1,
    /// Upserts one record in a partition.
    Put = 2,
    /// Removes one record from a partition.
    Delete = 3,
    /// Removes every record in a partition.
    Clear = 4,
    /// Closes a transaction; only committed transactions are replayed.
    Commit = 5,
}

impl LogRecordType {
    /// Parses a type byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Put),
            3 => Some(Self::Delete),
            4 => Some(Self::Clear),
            5 => Some(Self::Commit),
            _ => None,
        }
    }

    /// The type byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One entry in the transaction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Opens transaction `txid`.
    Begin {
        /// Transaction id.
        txid: u64,
    },
    /// Upserts `key` in `partition` with a CBOR-encoded value.
    Put {
        /// Transaction id.
        txid: u64,
        /// Target partition.
        partition: String,
        /// Record key.
        key: String,
        /// CBOR bytes of the record.
        value: Vec<u8>,
    },
    /// Removes `key` from `partition`.
    Delete {
        /// Transaction id.
        txid: u64,
        /// Target partition.
        partition: String,
        /// Record key.
        key: String,
    },
    /// Empties `partition`.
    Clear {
        /// Transaction id.
        txid: u64,
        /// Target partition.
        partition: String,
    },
    /// Commits transaction `txid`.
    Commit {
        /// Transaction id.
        txid: u64,
    },
}

impl LogRecord {
    /// The record's type byte.
    #[must_use]
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::Begin { .. } => LogRecordType::Begin,
            Self::Put { .. } => LogRecordType::Put,
            Self::Delete { .. } => LogRecordType::Delete,
            Self::Clear { .. } => LogRecordType::Clear,
            Self::Commit { .. } => LogRecordType::Commit,
        }
    }

    /// The transaction this record belongs to.
    #[must_use]
    pub fn txid(&self) -> u64 {
        match self {
            Self::Begin { txid }
            | Self::Put { txid, .. }
            | Self::Delete { txid, .. }
            | Self::Clear { txid, .. }
            | Self::Commit { txid } => *txid,
        }
    }

    /// Encodes the payload (no envelope).
    ///
    /// # Errors
    ///
    /// Fails if a partition name exceeds 64 KiB or a key/value exceeds 4 GiB.
    pub fn encode_payload(&self) -> StoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.txid().to_le_bytes());

        match self {
            Self::Begin { .. } | Self::Commit { .. } => {}
            Self::Put {
                partition,
                key,
                value,
                ..
            } => {
                put_short_str(&mut buf, partition)?;
                put_long_bytes(&mut buf, key.as_bytes())?;
                put_long_bytes(&mut buf, value)?;
            }
            Self::Delete { partition, key, .. } => {
                put_short_str(&mut buf, partition)?;
                put_long_bytes(&mut buf, key.as_bytes())?;
            }
            Self::Clear { partition, .. } => {
                put_short_str(&mut buf, partition)?;
            }
        }

        Ok(buf)
    }

    /// Encodes the full framed record:
    /// `magic | version | type | len | payload | crc32`.
    ///
    /// # Errors
    ///
    /// See [`LogRecord::encode_payload`].
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| StoreError::invalid_record("log record payload exceeds 4 GiB"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&LOG_MAGIC);
        frame.extend_from_slice(&LOG_VERSION.to_le_bytes());
        frame.push(self.record_type().as_byte());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    /// Decodes a payload of the given type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupted`] on short or over-long payloads and
    /// non-UTF-8 names.
    pub fn decode_payload(record_type: LogRecordType, payload: &[u8]) -> StoreResult<Self> {
        let mut cur = Cursor::new(payload);
        let txid = cur.u64()?;

        let record = match record_type {
            LogRecordType::Begin => Self::Begin { txid },
            LogRecordType::Commit => Self::Commit { txid },
            LogRecordType::Put => Self::Put {
                txid,
                partition: cur.short_str()?,
                key: cur.long_str()?,
                value: cur.long_bytes()?.to_vec(),
            },
            LogRecordType::Delete => Self::Delete {
                txid,
                partition: cur.short_str()?,
                key: cur.long_str()?,
            },
            LogRecordType::Clear => Self::Clear {
                txid,
                partition: cur.short_str()?,
            },
        };

        if !cur.is_empty() {
            return Err(StoreError::corrupted(format!(
                "{} trailing bytes in {record_type:?} record",
                cur.remaining()
            )));
        }
        Ok(record)
    }
}

fn put_short_str(buf: &mut Vec<u8>, s: &str) -> StoreResult<()> {
    let len = u16::try_from(s.len()).map_err(|_| {
        StoreError::invalid_record(format!("partition name too long: {} bytes", s.len()))
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_long_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> StoreResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| StoreError::invalid_record(format!("field too long: {} bytes", bytes.len())))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> StoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| StoreError::corrupted("unexpected end of log payload"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u64(&mut self) -> StoreResult<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn u32(&mut self) -> StoreResult<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u16(&mut self) -> StoreResult<u16> {
        let mut raw = [0u8; 2];
        raw.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(raw))
    }

    fn short_str(&mut self) -> StoreResult<String> {
        let len = self.u16()? as usize;
        utf8(self.take(len)?)
    }

    fn long_bytes(&mut self) -> StoreResult<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn long_str(&mut self) -> StoreResult<String> {
        let bytes = self.long_bytes()?;
        utf8(bytes)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

fn utf8(bytes: &[u8]) -> StoreResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| StoreError::corrupted("non UTF-8 name in log"))
}

/// CRC32 (IEEE polynomial) over `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(record: &LogRecord) -> LogRecord {
        let payload = record.encode_payload().unwrap();
        LogRecord::decode_payload(record.record_type(), &payload).unwrap()
    }

    #[test]
    fn put_keeps_names_and_value() {
        let record = LogRecord::Put {
            txid: 9,
            partition: "incidents".into(),
            key: "abc".into(),
            value: vec![0xA1, 0x62, 0x69, 0x64],
        };
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn markers_and_clear_roundtrip() {
        for record in [
            LogRecord::Begin { txid: 1 },
            LogRecord::Commit { txid: 1 },
            LogRecord::Clear {
                txid: 2,
                partition: "safety_trainings".into(),
            },
            LogRecord::Delete {
                txid: 3,
                partition: "pending_operations".into(),
                key: "018f".into(),
            },
        ] {
            assert_eq!(roundtrip(&record), record);
        }
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let mut payload = LogRecord::Begin { txid: 4 }.encode_payload().unwrap();
        payload.push(0);
        assert!(matches!(
            LogRecord::decode_payload(LogRecordType::Begin, &payload),
            Err(StoreError::Corrupted { .. })
        ));
    }

    #[test]
    fn short_payload_is_corruption() {
        let payload = LogRecord::Clear {
            txid: 5,
            partition: "incidents".into(),
        }
        .encode_payload()
        .unwrap();
        assert!(LogRecord::decode_payload(LogRecordType::Clear, &payload[..12]).is_err());
    }

    #[test]
    fn frame_layout() {
        let frame = LogRecord::Commit { txid: 7 }.encode().unwrap();
        assert_eq!(&frame[..4], &LOG_MAGIC);
        assert_eq!(frame[6], LogRecordType::Commit.as_byte());
        assert_eq!(frame.len(), HEADER_SIZE + 8 + CRC_SIZE);

        let body = &frame[..frame.len() - CRC_SIZE];
        let stored = u32::from_le_bytes(frame[frame.len() - CRC_SIZE..].try_into().unwrap());
        assert_eq!(compute_crc32(body), stored);
    }

    #[test]
    fn crc32_check_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
