//! Bridge to the external metadata store.
//!
//! The manager persists one fixed-size record per live version. The
//! store guarantees neither ordering nor deduplication across entries,
//! so the version processor tolerates arbitrary input order.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use thiserror::Error;

mod memory;

pub use self::memory::{MemoryMetadataSource, MemoryMetadataStore};

/// Failures of the metadata store.
#[derive(Debug, Error)]
pub enum Error {
    #[error("metadata i/o failure")]
    Io(#[from] std::io::Error),
    #[error("metadata store out of space")]
    OutOfSpace,
}

/// Serialized size of one record in bytes.
pub const RECORD_BYTES: usize = 20;

/// On-disk layout of one version record: little-endian
/// `{u32 id, u32 parent, u64 size, u32 group}`. The root stores
/// parent 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOnDisk {
    pub id: u32,
    pub parent: u32,
    pub size: u64,
    pub group: u32,
}

impl RecordOnDisk {
    /// Packs the record into the given `writer`.
    pub fn pack<W: Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        writer.write_u32::<LittleEndian>(self.id)?;
        writer.write_u32::<LittleEndian>(self.parent)?;
        writer.write_u64::<LittleEndian>(self.size)?;
        writer.write_u32::<LittleEndian>(self.group)
    }

    /// Unpacks a record from the given `reader`.
    pub fn unpack<R: Read>(mut reader: R) -> Result<Self, std::io::Error> {
        Ok(RecordOnDisk {
            id: reader.read_u32::<LittleEndian>()?,
            parent: reader.read_u32::<LittleEndian>()?,
            size: reader.read_u64::<LittleEndian>()?,
            group: reader.read_u32::<LittleEndian>()?,
        })
    }
}

/// Writeback target. `append` may block on I/O; the manager drops its
/// lock around each call.
pub trait MetadataSink {
    fn append(&mut self, record: &RecordOnDisk) -> Result<(), Error>;
    /// Completes the stream. No appends may follow.
    fn close(&mut self) -> Result<(), Error>;
}

/// Bootstrap source; yields records in unspecified order until drained.
pub trait MetadataSource {
    fn next_record(&mut self) -> Result<Option<RecordOnDisk>, Error>;
    fn close(&mut self) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_record_is_twenty_bytes() {
        let record = RecordOnDisk {
            id: 3,
            parent: 1,
            size: 1 << 32,
            group: 7,
        };
        let mut buf = Vec::new();
        record.pack(&mut buf).unwrap();
        assert_eq!(buf.len(), RECORD_BYTES);
        assert_eq!(RecordOnDisk::unpack(&buf[..]).unwrap(), record);
    }

    #[test]
    fn truncated_record_is_an_io_error() {
        let record = RecordOnDisk {
            id: 1,
            parent: 0,
            size: 0,
            group: 0,
        };
        let mut buf = Vec::new();
        record.pack(&mut buf).unwrap();
        buf.truncate(RECORD_BYTES - 3);
        assert!(RecordOnDisk::unpack(&buf[..]).is_err());
    }
}
