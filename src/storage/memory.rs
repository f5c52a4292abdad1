//! In-memory provider for tests, with switches to inject write failures.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{AppError, Result};
use crate::storage::StorageProvider;

#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, Bytes>>,
    /// `put` returns an error and stores nothing
    pub fail_puts: AtomicBool,
    /// `put` reports success but stores nothing
    pub swallow_puts: AtomicBool,
    pub put_count: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, data: impl Into<Bytes>) {
        self.files.lock().unwrap().insert(path.to_string(), data.into());
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn puts(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        self.put_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(AppError::Storage("injected write failure".to_string()));
        }
        if self.swallow_puts.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.insert(path, data);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("File not found: {}", path)))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    fn storage_type(&self) -> &'static str {
        "memory"
    }
}
