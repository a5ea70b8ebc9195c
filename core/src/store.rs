//! Ordered keyed-record store with a process-wide master table.
//!
//! Dictionaries hold fixed-width byte keys compared per [`KeyType`] and
//! typed values. The master table catalogues every created dictionary by a
//! small integer "use type" so that a later open (same process, new owner)
//! finds the existing data instead of creating a fresh dictionary.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{self, AtomicU32};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use thiserror::Error;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 16;

/// Identifier assigned to a dictionary at creation.
pub type DictId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("duplicate key")]
    DuplicateKey,
    #[error("key not found")]
    NotFound,
    #[error("key is {got} bytes, dictionary expects {expected}")]
    KeySize { got: usize, expected: usize },
    #[error("dictionary key size must be nonzero")]
    ZeroKeySize,
    #[error("no dictionary {0} in the master table")]
    UnknownDictionary(DictId),
    #[error("dictionary {0} holds a different value type")]
    ValueType(DictId),
}

/// How keys are ordered. All comparisons run over the full declared key
/// width, so callers must pad short keys themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Native-endian unsigned integers, compared most-significant byte first.
    NumericUnsigned,
    /// Like `NumericUnsigned`, but the most significant byte is signed.
    NumericSigned,
    /// memcmp over exactly `key_size` bytes.
    ByteArray,
    /// Lexicographic up to the first NUL or `key_size`.
    NullTerminatedString,
}

impl KeyType {
    /// Three-way comparison of two keys of equal declared width.
    pub fn compare(self, first: &[u8], second: &[u8]) -> Ordering {
        match self {
            KeyType::NumericUnsigned => compare_unsigned(first, second),
            KeyType::NumericSigned => compare_signed(first, second),
            KeyType::ByteArray => first.cmp(second),
            KeyType::NullTerminatedString => compare_null_terminated(first, second),
        }
    }
}

#[cfg(target_endian = "little")]
fn compare_unsigned(first: &[u8], second: &[u8]) -> Ordering {
    for idx in (0..first.len()).rev() {
        match first[idx].cmp(&second[idx]) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(target_endian = "big")]
fn compare_unsigned(first: &[u8], second: &[u8]) -> Ordering {
    first.cmp(second)
}

#[cfg(target_endian = "little")]
fn compare_signed(first: &[u8], second: &[u8]) -> Ordering {
    let msb = first.len() - 1;
    match (first[msb] as i8).cmp(&(second[msb] as i8)) {
        Ordering::Equal => {}
        other => return other,
    }
    for idx in (0..msb).rev() {
        match first[idx].cmp(&second[idx]) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(target_endian = "big")]
fn compare_signed(first: &[u8], second: &[u8]) -> Ordering {
    match (first[0] as i8).cmp(&(second[0] as i8)) {
        Ordering::Equal => {}
        other => return other,
    }
    first[1..].cmp(&second[1..])
}

fn compare_null_terminated(first: &[u8], second: &[u8]) -> Ordering {
    for (a, b) in first.iter().zip(second.iter()) {
        match a.cmp(b) {
            Ordering::Equal => {
                if *a == 0 {
                    return Ordering::Equal;
                }
            }
            other => return other,
        }
    }
    Ordering::Equal
}

/// Stored configuration of a created dictionary; what `open_dictionary`
/// consumes to reattach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictConfig {
    pub id: DictId,
    pub use_type: i32,
    pub key_type: KeyType,
    pub key_size: usize,
    pub value_size: usize,
}

/// One stored record, as yielded by a cursor.
#[derive(Debug, Clone)]
pub struct Record<V> {
    pub key: Box<[u8]>,
    pub value: V,
}

/// Query selector consumed by [`Dict::find`]. Owns its key bytes.
#[derive(Debug, Clone)]
pub enum Predicate {
    AllRecords,
    Equality(Box<[u8]>),
    Range(Box<[u8]>, Box<[u8]>),
}

impl Predicate {
    fn matches(&self, key_type: KeyType, key: &[u8]) -> bool {
        match self {
            Predicate::AllRecords => true,
            Predicate::Equality(target) => key_type.compare(key, target) == Ordering::Equal,
            Predicate::Range(lower, upper) => {
                key_type.compare(key, lower) != Ordering::Less
                    && key_type.compare(key, upper) != Ordering::Greater
            }
        }
    }
}

/// Forward cursor over the records a predicate matched.
///
/// Iterates a snapshot taken at open, so the scan order stays stable even
/// when the dictionary is mutated mid-scan; release happens on drop.
pub struct Cursor<V> {
    records: std::vec::IntoIter<Record<V>>,
}

impl<V> Iterator for Cursor<V> {
    type Item = Record<V>;

    fn next(&mut self) -> Option<Record<V>> {
        self.records.next()
    }
}

struct DictInner<V> {
    config: DictConfig,
    /// Kept sorted by `config.key_type.compare` over the full key width.
    entries: Vec<(Box<[u8]>, V)>,
}

/// Shared handle to an ordered dictionary. Cloning is cheap; every clone
/// sees the same records.
pub struct Dict<V> {
    inner: Arc<Mutex<DictInner<V>>>,
}

impl<V> Clone for Dict<V> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<V: Clone> Dict<V> {
    fn lock(&self) -> MutexGuard<'_, DictInner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> DictConfig {
        self.lock().config
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_key(config: &DictConfig, key: &[u8]) -> Result<(), StoreError> {
        if key.len() != config.key_size {
            return Err(StoreError::KeySize { got: key.len(), expected: config.key_size });
        }
        Ok(())
    }

    fn position(entries: &[(Box<[u8]>, V)], key_type: KeyType, key: &[u8]) -> Result<usize, usize> {
        entries.binary_search_by(|(stored, _)| key_type.compare(stored, key))
    }

    /// Insert a new record; an existing key is rejected.
    pub fn insert(&self, key: &[u8], value: V) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_key(&inner.config, key)?;
        let key_type = inner.config.key_type;
        match Self::position(&inner.entries, key_type, key) {
            Ok(_) => Err(StoreError::DuplicateKey),
            Err(idx) => {
                inner.entries.insert(idx, (key.into(), value));
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &[u8]) -> Result<V, StoreError> {
        let inner = self.lock();
        Self::check_key(&inner.config, key)?;
        match Self::position(&inner.entries, inner.config.key_type, key) {
            Ok(idx) => Ok(inner.entries[idx].1.clone()),
            Err(_) => Err(StoreError::NotFound),
        }
    }

    /// Replace the value stored under an existing key.
    pub fn update(&self, key: &[u8], value: V) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_key(&inner.config, key)?;
        let key_type = inner.config.key_type;
        match Self::position(&inner.entries, key_type, key) {
            Ok(idx) => {
                inner.entries[idx].1 = value;
                Ok(())
            }
            Err(_) => Err(StoreError::NotFound),
        }
    }

    pub fn remove(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_key(&inner.config, key)?;
        let key_type = inner.config.key_type;
        match Self::position(&inner.entries, key_type, key) {
            Ok(idx) => {
                inner.entries.remove(idx);
                Ok(())
            }
            Err(_) => Err(StoreError::NotFound),
        }
    }

    /// Open a cursor over every record the predicate matches, in key order.
    pub fn find(&self, predicate: &Predicate) -> Cursor<V> {
        let inner = self.lock();
        let key_type = inner.config.key_type;
        let records: Vec<Record<V>> = inner
            .entries
            .iter()
            .filter(|(key, _)| predicate.matches(key_type, key))
            .map(|(key, value)| Record { key: key.clone(), value: value.clone() })
            .collect();
        Cursor { records: records.into_iter() }
    }
}

struct MasterEntry {
    config: DictConfig,
    handle: Box<dyn Any + Send>,
}

fn master_table() -> &'static Mutex<HashMap<DictId, MasterEntry>> {
    static MASTER: OnceLock<Mutex<HashMap<DictId, MasterEntry>>> = OnceLock::new();
    MASTER.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock_master() -> MutexGuard<'static, HashMap<DictId, MasterEntry>> {
    master_table().lock().unwrap_or_else(PoisonError::into_inner)
}

static NEXT_DICT_ID: AtomicU32 = AtomicU32::new(1);

/// Config of the first dictionary catalogued under `use_type`, if any.
pub fn find_by_use(use_type: i32) -> Option<DictConfig> {
    lock_master()
        .values()
        .map(|entry| entry.config)
        .filter(|config| config.use_type == use_type)
        .min_by_key(|config| config.id)
}

/// Create a dictionary and catalogue it under `use_type`.
///
/// `hint` is a sizing hint in records; `-1` picks a default.
pub fn create_dictionary<V: Clone + Send + 'static>(
    use_type: i32,
    key_type: KeyType,
    key_size: usize,
    value_size: usize,
    hint: i32,
) -> Result<Dict<V>, StoreError> {
    if key_size == 0 {
        return Err(StoreError::ZeroKeySize);
    }
    let id = NEXT_DICT_ID.fetch_add(1, atomic::Ordering::Relaxed);
    let config = DictConfig { id, use_type, key_type, key_size, value_size };
    let capacity = if hint < 0 { DEFAULT_CAPACITY } else { hint as usize };
    let dict = Dict {
        inner: Arc::new(Mutex::new(DictInner { config, entries: Vec::with_capacity(capacity) })),
    };
    lock_master().insert(id, MasterEntry { config, handle: Box::new(dict.clone()) });
    debug!(id, use_type, key_size, "dictionary created");
    Ok(dict)
}

/// Reattach to a previously created dictionary from its stored config.
pub fn open_dictionary<V: Clone + Send + 'static>(config: &DictConfig) -> Result<Dict<V>, StoreError> {
    let master = lock_master();
    let entry = master.get(&config.id).ok_or(StoreError::UnknownDictionary(config.id))?;
    entry
        .handle
        .downcast_ref::<Dict<V>>()
        .cloned()
        .ok_or(StoreError::ValueType(config.id))
}

/// Drop a dictionary's catalogue entry and its records. Outstanding handles
/// keep whatever they already reference; no new open can find it.
pub fn destroy_dictionary(id: DictId) {
    if lock_master().remove(&id).is_some() {
        debug!(id, "dictionary destroyed");
    }
}
