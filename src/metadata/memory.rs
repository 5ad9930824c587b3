//! In-memory metadata store, the reference implementation used by tests
//! and by deployments without a real metadata device.

use super::{Error, MetadataSink, MetadataSource, RecordOnDisk, RECORD_BYTES};

/// Byte-buffer backed metadata store. Appends run through the on-disk
/// codec, so a round trip exercises the real record layout.
#[derive(Debug, Default, Clone)]
pub struct MemoryMetadataStore {
    buf: Vec<u8>,
    capacity: Option<usize>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounded variant; appends past `records` entries fail with
    /// [Error::OutOfSpace].
    pub fn with_capacity(records: usize) -> Self {
        MemoryMetadataStore {
            buf: Vec::new(),
            capacity: Some(records * RECORD_BYTES),
        }
    }

    /// Pre-populated store, mostly useful in tests.
    pub fn from_records(records: &[RecordOnDisk]) -> Self {
        let mut store = Self::new();
        for record in records {
            store
                .append(record)
                .expect("append into an unbounded buffer");
        }
        store
    }

    pub fn record_count(&self) -> usize {
        self.buf.len() / RECORD_BYTES
    }

    /// Read cursor over the packed records.
    pub fn source(&self) -> MemoryMetadataSource<'_> {
        MemoryMetadataSource {
            buf: &self.buf,
            pos: 0,
        }
    }
}

impl MetadataSink for MemoryMetadataStore {
    fn append(&mut self, record: &RecordOnDisk) -> Result<(), Error> {
        if let Some(capacity) = self.capacity {
            if self.buf.len() + RECORD_BYTES > capacity {
                return Err(Error::OutOfSpace);
            }
        }
        record.pack(&mut self.buf)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Read cursor of a [MemoryMetadataStore].
#[derive(Debug)]
pub struct MemoryMetadataSource<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl MetadataSource for MemoryMetadataSource<'_> {
    fn next_record(&mut self) -> Result<Option<RecordOnDisk>, Error> {
        if self.pos == self.buf.len() {
            return Ok(None);
        }
        let record = RecordOnDisk::unpack(&self.buf[self.pos..])?;
        self.pos += RECORD_BYTES;
        Ok(Some(record))
    }

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, parent: u32) -> RecordOnDisk {
        RecordOnDisk {
            id,
            parent,
            size: 0,
            group: 0,
        }
    }

    #[test]
    fn round_trips_records_in_order() {
        let store = MemoryMetadataStore::from_records(&[record(0, 0), record(1, 0), record(2, 1)]);
        assert_eq!(store.record_count(), 3);
        let mut source = store.source();
        let mut seen = Vec::new();
        while let Some(entry) = source.next_record().unwrap() {
            seen.push(entry.id);
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn bounded_store_runs_out_of_space() {
        let mut store = MemoryMetadataStore::with_capacity(1);
        store.append(&record(0, 0)).unwrap();
        assert!(matches!(
            store.append(&record(1, 0)),
            Err(Error::OutOfSpace)
        ));
    }
}
