use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use crate::store::{TabId, TabState};

pub fn tab_key(tab_id: TabId) -> String {
    format!("tab_{}", tab_id)
}

/// Durable per-tab key-value storage. Writes are last-write-wins.
pub trait TabStorage: Send + Sync + 'static {
    fn load(&self, tab_id: TabId) -> impl Future<Output = Result<Option<TabState>>> + Send;
    fn save(&self, tab_id: TabId, state: &TabState) -> impl Future<Output = Result<()>> + Send;
    fn remove(&self, tab_id: TabId) -> impl Future<Output = Result<()>> + Send;
}

/// Process-local storage holding serialized records, for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStorage {
    records: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        self.records
            .lock()
            .map(|r| r.contains_key(&tab_key(tab_id)))
            .unwrap_or(false)
    }

    fn records(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.records
            .lock()
            .map_err(|e| anyhow::anyhow!("storage lock poisoned: {}", e))
    }
}

impl TabStorage for MemoryStorage {
    async fn load(&self, tab_id: TabId) -> Result<Option<TabState>> {
        let records = self.records()?;
        match records.get(&tab_key(tab_id)) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, tab_id: TabId, state: &TabState) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("write rejected for {}", tab_key(tab_id));
        }
        let raw = serde_json::to_string(state)?;
        self.records()?.insert(tab_key(tab_id), raw);
        Ok(())
    }

    async fn remove(&self, tab_id: TabId) -> Result<()> {
        self.records()?.remove(&tab_key(tab_id));
        Ok(())
    }
}
