//! Store trait definitions

use crate::{AuditEvent, ConnectionRecord, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Connection history

    /// Append a connection record, returning its row ID
    fn append_connection(&self, record: &ConnectionRecord) -> StoreResult<i64>;

    /// Get the most recent connection records, newest first
    fn recent_connections(&self, limit: usize) -> StoreResult<Vec<ConnectionRecord>>;

    // Audit log

    /// Append an audit event, returning its row ID
    fn append_audit(&self, event: &AuditEvent) -> StoreResult<i64>;

    /// Get recent audit events, newest first
    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
