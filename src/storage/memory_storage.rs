use crate::{
    error::Result,
    storage::{Snapshot, Storage},
};
use async_trait::async_trait;

/// Volatile backend: state lives only in the engine's working set
#[derive(Debug, Default)]
pub struct MemoryStorage {
    seed: Snapshot,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing snapshot instead of an empty one
    pub fn with_snapshot(seed: Snapshot) -> Self {
        Self { seed }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot> {
        Ok(self.seed.clone())
    }

    async fn persist(&self, _snapshot: &Snapshot) -> Result<()> {
        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        true
    }
}
