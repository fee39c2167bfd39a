//! Raw serde shapes for the GraphQL result envelope. Everything is
//! optional because the upstream omits fields freely; regions whose
//! layout varies per operation stay as loose [`serde_json::Value`]s

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct TweetResult {
    #[serde(rename = "__typename")]
    pub typename: Option<String>,
    pub rest_id: Option<String>,
    pub core: Option<TweetCore>,
    pub legacy: Option<TweetLegacy>,
    pub views: Option<Views>,
    /// Present on quote tweets; itself a wrapped tweet result
    pub quoted_status_result: Option<Value>,
    /// Present on the visibility-results wrapper shape
    pub tweet: Option<Value>,
    /// Present on the deletion tombstone shape
    pub tombstone: Option<Tombstone>,
}

#[derive(Debug, Deserialize)]
pub struct TweetCore {
    pub user_results: Option<UserResults>,
}

#[derive(Debug, Deserialize)]
pub struct UserResults {
    pub result: Option<UserResult>,
}

#[derive(Debug, Deserialize)]
pub struct UserResult {
    #[serde(rename = "__typename")]
    pub typename: Option<String>,
    pub rest_id: Option<String>,
    pub legacy: Option<UserLegacy>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserLegacy {
    pub screen_name: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub created_at: Option<String>,
    pub followers_count: Option<i64>,
    pub friends_count: Option<i64>,
    pub statuses_count: Option<i64>,
    pub favourites_count: Option<i64>,
    pub listed_count: Option<i64>,
    pub media_count: Option<i64>,
    pub profile_image_url_https: Option<String>,
    pub profile_banner_url: Option<String>,
    pub verified: Option<bool>,
    pub protected: Option<bool>,
    pub pinned_tweet_ids_str: Option<Vec<String>>,
    pub entities: Option<UserEntities>,
}

#[derive(Debug, Deserialize)]
pub struct UserEntities {
    pub description: Option<EntityUrls>,
    pub url: Option<EntityUrls>,
}

#[derive(Debug, Deserialize)]
pub struct EntityUrls {
    pub urls: Option<Vec<UrlEntity>>,
}

#[derive(Debug, Deserialize)]
pub struct TweetLegacy {
    pub full_text: Option<String>,
    pub created_at: Option<String>,
    pub user_id_str: Option<String>,
    pub conversation_id_str: Option<String>,
    pub in_reply_to_status_id_str: Option<String>,
    pub favorite_count: Option<i64>,
    pub retweet_count: Option<i64>,
    pub reply_count: Option<i64>,
    pub quote_count: Option<i64>,
    pub bookmark_count: Option<i64>,
    pub is_quote_status: Option<bool>,
    pub entities: Option<TweetEntities>,
    pub extended_entities: Option<ExtendedEntities>,
    /// Present on retweets; itself a wrapped tweet result
    pub retweeted_status_result: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TweetEntities {
    pub urls: Option<Vec<UrlEntity>>,
    pub hashtags: Option<Vec<HashtagEntity>>,
    pub user_mentions: Option<Vec<MentionEntity>>,
}

#[derive(Debug, Deserialize)]
pub struct UrlEntity {
    pub url: String,
    pub expanded_url: Option<String>,
    pub display_url: Option<String>,
    pub indices: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct HashtagEntity {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct MentionEntity {
    pub screen_name: String,
    pub name: Option<String>,
    pub id_str: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtendedEntities {
    pub media: Option<Vec<MediaEntity>>,
}

#[derive(Debug, Deserialize)]
pub struct MediaEntity {
    pub id_str: Option<String>,
    pub media_url_https: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub url: Option<String>,
    pub ext_alt_text: Option<String>,
    pub video_info: Option<VideoInfo>,
}

#[derive(Debug, Deserialize)]
pub struct VideoInfo {
    pub duration_millis: Option<i64>,
    pub variants: Option<Vec<VideoVariant>>,
}

#[derive(Debug, Deserialize)]
pub struct VideoVariant {
    pub bitrate: Option<i64>,
    pub content_type: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct Views {
    pub count: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Tombstone {
    pub text: Option<TombstoneText>,
}

#[derive(Debug, Deserialize)]
pub struct TombstoneText {
    pub text: Option<String>,
}
