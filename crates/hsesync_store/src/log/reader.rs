//! Sequential log reader.

use super::record::{
    compute_crc32, LogRecord, LogRecordType, CRC_SIZE, HEADER_SIZE, LOG_MAGIC, LOG_VERSION,
};
use crate::error::{StoreError, StoreResult};
use hsesync_storage::StorageBackend;

/// Walks the records of a log from the start.
///
/// An incomplete header or payload at the tail ends iteration cleanly; that
/// is what a crash in the middle of an append leaves behind. Bad magic, an
/// unknown version or type, and checksum mismatches are errors.
pub struct LogReader<'a> {
    backend: &'a dyn StorageBackend,
    size: u64,
    offset: u64,
    finished: bool,
}

impl<'a> LogReader<'a> {
    /// Starts reading at offset 0.
    ///
    /// # Errors
    ///
    /// Fails if the backend size cannot be read.
    pub fn new(backend: &'a dyn StorageBackend) -> StoreResult<Self> {
        let size = backend.size()?;
        Ok(Self {
            backend,
            size,
            offset: 0,
            finished: false,
        })
    }

    /// Offset just past the last whole record read so far.
    ///
    /// After iteration ends cleanly, anything beyond this offset is a torn
    /// tail.
    #[must_use]
    pub fn valid_end(&self) -> u64 {
        self.offset
    }

    /// Total bytes in the backend.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    fn read_next(&mut self) -> StoreResult<Option<(u64, LogRecord)>> {
        let start = self.offset;
        let remaining = self.size - start;
        if remaining < HEADER_SIZE as u64 {
            return Ok(None);
        }

        let header = self.backend.read_at(start, HEADER_SIZE)?;
        if header[0..4] != LOG_MAGIC {
            return Err(StoreError::corrupted(format!("invalid magic at offset {start}")));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version == 0 || version > LOG_VERSION {
            return Err(StoreError::corrupted(format!(
                "unsupported version {version} at offset {start}"
            )));
        }
        let type_byte = header[6];
        let record_type = LogRecordType::from_byte(type_byte).ok_or_else(|| {
            StoreError::corrupted(format!("unknown record type {type_byte} at offset {start}"))
        })?;
        let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as u64;

        let total = HEADER_SIZE as u64 + payload_len + CRC_SIZE as u64;
        if remaining < total {
            return Ok(None);
        }

        let body_len = usize::try_from(total)
            .map_err(|_| StoreError::corrupted(format!("record too large at offset {start}")))?;
        let frame = self.backend.read_at(start, body_len)?;
        let (body, crc_bytes) = frame.split_at(body_len - CRC_SIZE);

        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let actual = compute_crc32(body);
        if expected != actual {
            return Err(StoreError::ChecksumMismatch {
                offset: start,
                expected,
                actual,
            });
        }

        let record = LogRecord::decode_payload(record_type, &body[HEADER_SIZE..])?;
        self.offset = start + total;
        Ok(Some((start, record)))
    }
}

impl Iterator for LogReader<'_> {
    type Item = StoreResult<(u64, LogRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsesync_storage::InMemoryBackend;

    fn log_of(records: &[LogRecord]) -> Vec<u8> {
        records
            .iter()
            .flat_map(|r| r.encode().unwrap())
            .collect()
    }

    fn sample() -> Vec<LogRecord> {
        vec![
            LogRecord::Begin { txid: 1 },
            LogRecord::Put {
                txid: 1,
                partition: "incidents".into(),
                key: "i-1".into(),
                value: vec![1, 2, 3],
            },
            LogRecord::Commit { txid: 1 },
        ]
    }

    #[test]
    fn reads_every_record_in_order() {
        let backend = InMemoryBackend::with_data(log_of(&sample()));
        let mut reader = LogReader::new(&backend).unwrap();
        let records: Vec<_> = reader.by_ref().map(|r| r.unwrap().1).collect();

        assert_eq!(records, sample());
        assert_eq!(reader.valid_end(), reader.size());
    }

    #[test]
    fn torn_tail_ends_cleanly() {
        let mut bytes = log_of(&sample());
        let whole = bytes.len() as u64;
        let mut tail = LogRecord::Begin { txid: 2 }.encode().unwrap();
        tail.truncate(tail.len() - 3);
        bytes.extend_from_slice(&tail);

        let backend = InMemoryBackend::with_data(bytes);
        let mut reader = LogReader::new(&backend).unwrap();
        assert_eq!(reader.by_ref().filter(Result::is_ok).count(), 3);
        assert_eq!(reader.valid_end(), whole);
        assert!(reader.size() > whole);
    }

    #[test]
    fn partial_header_ends_cleanly() {
        let mut bytes = log_of(&sample());
        bytes.extend_from_slice(&LOG_MAGIC[..3]);
        let backend = InMemoryBackend::with_data(bytes);
        assert!(LogReader::new(&backend).unwrap().all(|r| r.is_ok()));
    }

    #[test]
    fn flipped_bit_is_a_checksum_error() {
        let mut bytes = log_of(&sample());
        let first_len = LogRecord::Begin { txid: 1 }.encode().unwrap().len();
        bytes[first_len + HEADER_SIZE + 2] ^= 0x40;

        let backend = InMemoryBackend::with_data(bytes);
        let results: Vec<_> = LogReader::new(&backend).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[1],
            Err(StoreError::ChecksumMismatch { offset, .. }) if offset == first_len as u64
        ));
    }

    #[test]
    fn garbage_is_corruption() {
        let backend = InMemoryBackend::with_data(vec![0xAB; 64]);
        let first = LogReader::new(&backend).unwrap().next().unwrap();
        assert!(matches!(first, Err(StoreError::Corrupted { .. })));
    }

    #[test]
    fn unknown_type_is_corruption() {
        let mut bytes = LogRecord::Begin { txid: 1 }.encode().unwrap();
        bytes[6] = 42;
        let backend = InMemoryBackend::with_data(bytes);
        let first = LogReader::new(&backend).unwrap().next().unwrap();
        assert!(matches!(first, Err(StoreError::Corrupted { .. })));
    }
}
