//! The `SyncState` entity (§3): crash-safe resume checkpoint, one row per
//! pool manager address.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub pool_manager_address: String,
    pub last_synced_block: i64,
    pub current_block: i64,
    pub is_initial_sync_complete: bool,
    pub last_synced_at: DateTime<Utc>,
}

impl SyncState {
    pub fn initial(pool_manager_address: String, starting_block: u64) -> Self {
        Self {
            pool_manager_address,
            last_synced_block: starting_block.saturating_sub(1) as i64,
            current_block: starting_block as i64,
            is_initial_sync_complete: false,
            last_synced_at: Utc::now(),
        }
    }
}
