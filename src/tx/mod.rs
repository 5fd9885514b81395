//! Transaction management.
//!
//! [`GraphTransaction`] is the coordinator's handle over a backend
//! transaction. It starts `Active` and ends in exactly one of `Committed`
//! or `RolledBack`; both are terminal. A handle dropped while still active
//! is rolled back.
//!
//! Every engine operation takes `Option<&mut GraphTransaction>`. With
//! `None` the engine opens a transaction for that one call, commits on
//! success and rolls back before returning any error.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::StorageBackend;
use crate::{Error, Result};

/// Transaction mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    ReadOnly,
    #[default]
    ReadWrite,
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Transaction trait that all backends must implement.
pub trait Transaction: Send + Sync {
    fn mode(&self) -> TxMode;
    fn id(&self) -> TxId;
}

/// Lifecycle state of a [`GraphTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
}

/// Caller-visible transaction handle.
pub struct GraphTransaction<'g, B: StorageBackend> {
    backend: &'g B,
    inner: Option<B::Tx>,
    state: TxState,
    mode: TxMode,
    id: TxId,
}

impl<'g, B: StorageBackend> GraphTransaction<'g, B> {
    pub(crate) async fn begin(backend: &'g B, mode: TxMode) -> Result<Self> {
        let tx = backend
            .begin_tx(mode)
            .await
            .map_err(|e| Error::Transaction(format!("begin failed: {e}")))?;
        let id = tx.id();
        debug!(tx = %id, ?mode, "transaction started");
        Ok(Self { backend, inner: Some(tx), state: TxState::Active, mode, id })
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TxState::Active
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub async fn commit(&mut self) -> Result<()> {
        let tx = self.take_active("commit")?;
        match self.backend.commit_tx(tx).await {
            Ok(()) => {
                self.state = TxState::Committed;
                debug!(tx = %self.id, "transaction committed");
                Ok(())
            }
            Err(e) => {
                self.state = TxState::RolledBack;
                Err(Error::Transaction(format!("commit of {} failed: {e}", self.id)))
            }
        }
    }

    pub async fn rollback(&mut self) -> Result<()> {
        let tx = self.take_active("roll back")?;
        self.state = TxState::RolledBack;
        self.backend
            .rollback_tx(tx)
            .await
            .map_err(|e| Error::Transaction(format!("rollback of {} failed: {e}", self.id)))?;
        debug!(tx = %self.id, "transaction rolled back");
        Ok(())
    }

    /// Backend transaction, for calling the store directly.
    pub fn backend_tx(&self) -> Result<&B::Tx> {
        self.active()
    }

    /// Backend transaction for direct writes; read-only handles refuse.
    pub fn backend_tx_mut(&mut self) -> Result<&mut B::Tx> {
        self.writable()
    }

    /// Backend transaction for reads.
    pub(crate) fn active(&self) -> Result<&B::Tx> {
        match (&self.inner, self.state) {
            (Some(tx), TxState::Active) => Ok(tx),
            _ => Err(self.misuse("use")),
        }
    }

    /// Backend transaction for writes; read-only handles refuse.
    pub(crate) fn writable(&mut self) -> Result<&mut B::Tx> {
        if self.mode == TxMode::ReadOnly {
            return Err(Error::Transaction(format!("{} is read-only", self.id)));
        }
        if self.state != TxState::Active {
            return Err(self.misuse("write through"));
        }
        self.inner.as_mut().ok_or_else(|| Error::Transaction("transaction already finished".into()))
    }

    /// End an implicitly opened transaction: commit `result` if it is `Ok`,
    /// otherwise roll back and return the original error.
    pub(crate) async fn complete<T>(mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback().await {
                    warn!(tx = %self.id, error = %rollback, "rollback after failure did not complete");
                }
                Err(e)
            }
        }
    }

    fn take_active(&mut self, op: &str) -> Result<B::Tx> {
        if self.state != TxState::Active {
            return Err(self.misuse(op));
        }
        self.inner.take().ok_or_else(|| self.misuse(op))
    }

    fn misuse(&self, op: &str) -> Error {
        Error::Transaction(format!("cannot {op} {}: transaction is {:?}", self.id, self.state))
    }
}

impl<B: StorageBackend> Drop for GraphTransaction<'_, B> {
    fn drop(&mut self) {
        if let Some(tx) = self.inner.take() {
            warn!(tx = %self.id, "transaction dropped while active, rolling back");
            self.backend.discard_tx(tx);
        }
    }
}

impl<B: StorageBackend> std::fmt::Debug for GraphTransaction<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphTransaction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertyMap;
    use crate::storage::MemoryBackend;

    #[tokio::test]
    async fn test_commit_is_terminal() {
        let backend = MemoryBackend::new();
        let mut tx = GraphTransaction::begin(&backend, TxMode::ReadWrite).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(tx.state(), TxState::Committed);
        assert!(matches!(tx.commit().await, Err(Error::Transaction(_))));
        assert!(matches!(tx.rollback().await, Err(Error::Transaction(_))));
        assert!(tx.active().is_err());
    }

    #[tokio::test]
    async fn test_drop_while_active_discards_writes() {
        let backend = MemoryBackend::new();
        {
            let mut tx = GraphTransaction::begin(&backend, TxMode::ReadWrite).await.unwrap();
            let inner = tx.writable().unwrap();
            backend.create_node(inner, &["Temp"], PropertyMap::new()).await.unwrap();
        }
        let tx = GraphTransaction::begin(&backend, TxMode::ReadOnly).await.unwrap();
        assert_eq!(backend.node_count(tx.active().unwrap()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_only_refuses_writes() {
        let backend = MemoryBackend::new();
        let mut tx = GraphTransaction::begin(&backend, TxMode::ReadOnly).await.unwrap();
        assert!(matches!(tx.writable(), Err(Error::Transaction(_))));
    }
}
