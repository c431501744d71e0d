use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Process-wide counters, read for health reporting only.
///
/// Counters only ever increment; they reset on process restart.
#[derive(Debug)]
pub struct BotStats {
    started_at: DateTime<Utc>,
    total_messages: AtomicU64,
    images_analyzed: AtomicU64,
    images_generated: AtomicU64,
    conversations: AtomicU64,
    groups: AtomicU64,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatsSnapshot {
    pub total_messages: u64,
    pub total_images_analyzed: u64,
    pub total_images_generated: u64,
    pub total_conversations: u64,
    pub total_groups: u64,
    pub uptime_hours: f64,
    pub started_at: String,
}

impl BotStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            total_messages: AtomicU64::new(0),
            images_analyzed: AtomicU64::new(0),
            images_generated: AtomicU64::new(0),
            conversations: AtomicU64::new(0),
            groups: AtomicU64::new(0),
        }
    }

    pub fn record_message(&self) {
        self.total_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_image_analyzed(&self) {
        self.images_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_image_generated(&self) {
        self.images_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conversation(&self) {
        self.conversations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_group(&self) {
        self.groups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let uptime = Utc::now().signed_duration_since(self.started_at);
        StatsSnapshot {
            total_messages: self.total_messages.load(Ordering::Relaxed),
            total_images_analyzed: self.images_analyzed.load(Ordering::Relaxed),
            total_images_generated: self.images_generated.load(Ordering::Relaxed),
            total_conversations: self.conversations.load(Ordering::Relaxed),
            total_groups: self.groups.load(Ordering::Relaxed),
            uptime_hours: uptime.num_seconds() as f64 / 3600.0,
            started_at: self.started_at.to_rfc3339(),
        }
    }
}

impl Default for BotStats {
    fn default() -> Self {
        Self::new()
    }
}
