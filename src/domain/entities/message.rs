//! Inbound chat messages as delivered by the messaging-network wrapper.
//!
//! The wrapper itself is external to this crate; it owns the sending half of
//! the intake channel and pushes one of these per channel message.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: i64,
    pub channel_id: i64,
    pub channel_name: String,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    pub text: String,
    pub media_type: Option<String>,
    pub is_forwarded: bool,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// Minimal constructor for plain text messages.
    pub fn text(message_id: i64, channel_id: i64, text: impl Into<String>) -> Self {
        Self {
            message_id,
            channel_id,
            channel_name: String::new(),
            sender_id: 0,
            sender_name: None,
            text: text.into(),
            media_type: None,
            is_forwarded: false,
            timestamp: Utc::now(),
        }
    }
}
