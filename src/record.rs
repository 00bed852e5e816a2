//! The scraped profile record.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::extract::ChannelMetadata;

/// One channel profile as it leaves the scraper. Partial results are
/// normal; a record with only a URL and timestamp is still a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub channel_url: String,
    pub channel_handle: String,
    pub channel_name: String,
    pub subscribers: String,
    pub video_count: String,
    pub total_views: String,
    pub joined_date: String,
    pub country: String,
    pub description: String,
    pub social_links: BTreeMap<String, String>,
    pub email: Option<String>,
    pub scraped_at: String,
}

impl ProfileRecord {
    /// Start a record for a channel URL, stamped with the current time.
    pub fn started(channel_url: &str, channel_handle: &str) -> Self {
        Self {
            channel_url: channel_url.to_string(),
            channel_handle: channel_handle.to_string(),
            scraped_at: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            ..Self::default()
        }
    }

    /// Fold extracted metadata into the record.
    pub fn apply_metadata(&mut self, metadata: ChannelMetadata) {
        self.channel_name = metadata.channel_name;
        self.subscribers = metadata.subscribers;
        self.video_count = metadata.video_count;
        self.total_views = metadata.total_views;
        self.joined_date = metadata.joined_date;
        self.country = metadata.country;
        self.description = metadata.description;
        self.social_links = metadata.social_links;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_record_carries_url_and_timestamp() {
        let record = ProfileRecord::started("https://www.youtube.com/@chan", "chan");
        assert_eq!(record.channel_url, "https://www.youtube.com/@chan");
        assert_eq!(record.channel_handle, "chan");
        assert_eq!(record.scraped_at.len(), "2026-01-01 00:00:00".len());
        assert_eq!(record.email, None);
    }

    #[test]
    fn metadata_fold_replaces_profile_fields() {
        let mut record = ProfileRecord::started("https://www.youtube.com/@chan", "chan");
        let metadata = ChannelMetadata {
            channel_name: "Chan".to_string(),
            subscribers: "1M subscribers".to_string(),
            ..ChannelMetadata::default()
        };
        record.apply_metadata(metadata);
        assert_eq!(record.channel_name, "Chan");
        assert_eq!(record.subscribers, "1M subscribers");
        assert_eq!(record.channel_url, "https://www.youtube.com/@chan");
    }
}
