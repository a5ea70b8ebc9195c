//! Named job records over the keyed store.
//!
//! The backing dictionary compares keys over the full declared width, so
//! every name is copied into a `max_name_size` zero-padded key before it
//! touches the store. Names must fit with at least one padding byte to
//! spare; empty names are rejected outright.

use tracing::warn;

use crate::error::{Error, Result};
use crate::job::JobRecord;
use crate::store::{self, Cursor, Dict, KeyType, Predicate};

/// Use type tag under which the job dictionary is catalogued.
pub const JOB_DICT_USE_TYPE: i32 = 1;

pub struct JobRegistry {
    dict: Dict<JobRecord>,
    key_size: usize,
}

impl JobRegistry {
    /// Reopen the job dictionary catalogued under `use_type`, creating it on
    /// first use. On reopen the stored key size wins over `max_name_size`.
    pub fn open_or_create(use_type: i32, max_name_size: usize) -> Result<Self> {
        let dict = match store::find_by_use(use_type) {
            Some(config) => {
                store::open_dictionary::<JobRecord>(&config).map_err(|_| Error::DictInit)?
            }
            None => store::create_dictionary::<JobRecord>(
                use_type,
                KeyType::ByteArray,
                max_name_size,
                std::mem::size_of::<JobRecord>(),
                -1,
            )
            .map_err(|_| Error::DictInit)?,
        };
        Ok(Self { key_size: dict.config().key_size, dict })
    }

    /// Copy a name into a zero-padded fixed-width key. Empty names and names
    /// that would not leave a padding byte are refused.
    fn padded_key(&self, name: &str) -> Option<Box<[u8]>> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() >= self.key_size {
            return None;
        }
        let mut key = vec![0u8; self.key_size];
        key[..bytes.len()].copy_from_slice(bytes);
        Some(key.into_boxed_slice())
    }

    pub fn add(&self, name: &str, record: JobRecord) -> Result<()> {
        let key = self.padded_key(name).ok_or(Error::AddJob)?;
        self.dict.insert(&key, record).map_err(|error| {
            warn!(name, %error, "job insert rejected");
            Error::AddJob
        })
    }

    pub fn get(&self, name: &str) -> Result<JobRecord> {
        let key = self.padded_key(name).ok_or(Error::DictGet)?;
        self.dict.get(&key).map_err(|_| Error::DictGet)
    }

    pub fn update(&self, name: &str, record: &JobRecord) -> Result<()> {
        let key = self.padded_key(name).ok_or(Error::DictUpdate)?;
        self.update_padded(&key, record)
    }

    /// Update through an already padded key, as carried by queue nodes.
    pub fn update_padded(&self, key: &[u8], record: &JobRecord) -> Result<()> {
        self.dict.update(key, record.clone()).map_err(|_| Error::DictUpdate)
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let key = self.padded_key(name).ok_or(Error::DictUpdate)?;
        self.dict.remove(&key).map_err(|_| Error::DictUpdate)
    }

    /// Cursor over every job record, in padded-key order.
    pub fn scan_all(&self) -> Cursor<JobRecord> {
        self.dict.find(&Predicate::AllRecords)
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Drop the dictionary and its master-table entry.
    pub fn destroy(self) {
        store::destroy_dictionary(self.dict.config().id);
    }
}
