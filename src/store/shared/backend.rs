//! Key-value backend abstraction for the shared store
//!
//! A backend only has to offer plain reads and one compound write: a
//! [`Transaction`] whose guards are checked and whose writes are applied
//! all-or-nothing. Every multi-key operation of the shared store is expressed
//! as such a transaction, never as a sequence of independent writes.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use crate::store::error::StoreResult;

/// Expected state of a key when a transaction commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub key: String,
    /// `None` means the key must be absent
    pub expected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub key: String,
    pub value: String,
}

/// Guarded, all-or-nothing batch of writes
///
/// Deletes are applied before puts, so a key both deleted and put ends up
/// holding the put value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    guards: Vec<Guard>,
    deletes: Vec<String>,
    puts: Vec<Put>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to hold `expected` (or be absent for `None`)
    pub fn guard(&mut self, key: impl Into<String>, expected: Option<String>) -> &mut Self {
        self.guards.push(Guard {
            key: key.into(),
            expected,
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.deletes.push(key.into());
        self
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.puts.push(Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn deletes(&self) -> &[String] {
        &self.deletes
    }

    pub fn puts(&self) -> &[Put] {
        &self.puts
    }
}

/// Minimal key-value service used by [`super::SharedRegistrationStore`]
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Values for `keys`, in order, `None` for missing keys
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>>;

    /// All keys starting with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Apply `transaction` atomically; `false` if a guard did not hold
    async fn commit(&self, transaction: Transaction) -> StoreResult<bool>;
}

#[async_trait]
impl<B: KvBackend + ?Sized> KvBackend for Arc<B> {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key).await
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        (**self).get_many(keys).await
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        (**self).scan_prefix(prefix).await
    }

    async fn commit(&self, transaction: Transaction) -> StoreResult<bool> {
        (**self).commit(transaction).await
    }
}

/// In-process backend
///
/// Shared between several stores via `Arc`, it behaves like one external
/// service used by several server nodes.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        let entries = self.entries.lock();
        Ok(keys.iter().map(|k| entries.get(k).cloned()).collect())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let entries = self.entries.lock();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn commit(&self, transaction: Transaction) -> StoreResult<bool> {
        let mut entries = self.entries.lock();

        let guards_hold = transaction
            .guards
            .iter()
            .all(|g| entries.get(&g.key) == g.expected.as_ref());
        if !guards_hold {
            return Ok(false);
        }

        for key in &transaction.deletes {
            entries.remove(key);
        }
        for put in transaction.puts {
            entries.insert(put.key, put.value);
        }
        Ok(true)
    }
}
