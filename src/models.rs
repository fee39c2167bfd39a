use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engagement counters, zeroed when the upstream omits them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementCounts {
    pub likes: i64,
    pub retweets: i64,
    pub replies: i64,
    pub quotes: i64,
    pub bookmarks: i64,
    pub views: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Direct media URL; for videos the highest-bitrate mp4 variant
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub screen_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Option<String>,
    pub screen_name: Option<String>,
    pub name: Option<String>,
}

/// A normalized tweet. Recursive through `retweet_of` and `quoted`,
/// bounded by how deep the upstream itself nests (two levels in
/// practice). Tombstoned entries keep `tombstone` set and everything
/// else empty; they are marked, never dropped
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tweet {
    pub id: Option<String>,
    pub text: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub author: Option<UserRef>,
    pub metrics: EngagementCounts,
    pub urls: Vec<String>,
    pub hashtags: Vec<String>,
    pub mentions: Vec<Mention>,
    pub media: Vec<Media>,
    pub is_retweet: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retweet_of: Option<Box<Tweet>>,
    pub is_reply: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted: Option<Box<Tweet>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Human-readable reason the upstream put a placeholder here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tombstone: Option<String>,
}

impl Tweet {
    pub fn is_tombstone(&self) -> bool {
        self.tombstone.is_some()
    }
}

/// A flat profile record with bio entities already expanded and image
/// URLs upgraded to their full-resolution variants
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub screen_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biography: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub joined: Option<DateTime<Utc>>,
    pub followers_count: i64,
    pub following_count: i64,
    pub tweets_count: i64,
    pub likes_count: i64,
    pub listed_count: i64,
    pub media_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
    pub verified: bool,
    pub is_private: bool,
    pub pinned_tweet_ids: Vec<String>,
    pub bio_hashtags: Vec<String>,
    pub bio_mentions: Vec<String>,
}
