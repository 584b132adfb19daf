//! Channel subscriptions as seen by the dashboard.
//!
//! The live messaging client is external to this crate; it implements
//! [`ChannelControl`] to actually join and leave chats. [`ChannelDirectory`]
//! is the store-backed implementation used until the client is attached: it
//! keeps the `channels` table consistent so the dashboard works either way.

use async_trait::async_trait;

use crate::persistence::models::Channel;
use crate::persistence::repository::Repository;
use crate::persistence::StoreError;

#[async_trait]
pub trait ChannelControl: Send + Sync {
    async fn subscribe(&self, identifier: &str) -> Result<Channel, StoreError>;
    async fn unsubscribe(&self, channel_id: i64) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<Channel>, StoreError>;
}

pub struct ChannelDirectory {
    repo: Repository,
}

impl ChannelDirectory {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl ChannelControl for ChannelDirectory {
    async fn subscribe(&self, identifier: &str) -> Result<Channel, StoreError> {
        let (channel_id, username) = match identifier.parse::<i64>() {
            Ok(id) => (id, None),
            // placeholder id until the messaging client reports the real
            // chat id and re-upserts the row
            Err(_) => (synthetic_channel_id(identifier), Some(identifier)),
        };
        self.repo.upsert_channel(channel_id, username, identifier).await
    }

    async fn unsubscribe(&self, channel_id: i64) -> Result<(), StoreError> {
        self.repo.deactivate_channel(channel_id).await
    }

    async fn list(&self) -> Result<Vec<Channel>, StoreError> {
        self.repo.list_channels().await
    }
}

/// Deterministic negative id for username identifiers, outside the id space
/// the messaging network assigns.
fn synthetic_channel_id(identifier: &str) -> i64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in identifier.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    -((hash >> 1) as i64)
}
