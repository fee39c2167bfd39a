//! High-level verbs layered over the request engine. Everything here is
//! a thin composition of one or more GraphQL/REST calls with the
//! timeline parsers

use serde_json::json;

use crate::client::{Client, Paginator};
use crate::endpoints::Operation;
use crate::error::{ClientError, Result};
use crate::models::{Profile, Tweet};
use crate::timeline::{parse_profile_response, parse_timeline_tweets};

pub use actions::{ActionOutcome, BulkOptions, BulkReport};
pub use relations::{diff_relations, RelationSummary};
pub use upload::{UploadedMedia, UPLOAD_CHUNK_SIZE};

pub mod actions;
pub mod relations;
pub mod threads;
pub mod upload;

impl Client {
    /// Fetch a profile by screen name
    pub async fn profile(&self, screen_name: &str) -> Result<Profile> {
        let response = self
            .graphql(
                Operation::UserByScreenName,
                json!({ "screen_name": screen_name, "withSafetyModeUserFields": true }),
                None,
            )
            .await?;
        parse_profile_response(&response.data)
    }

    /// Resolve a screen name to its numeric user id
    pub async fn user_id(&self, screen_name: &str) -> Result<String> {
        Ok(self.profile(screen_name).await?.id)
    }

    /// Lazy walk over a user's tweet timeline
    pub fn tweets_of(&self, user_id: &str) -> Paginator<'_, Tweet> {
        self.paginate(
            Operation::UserTweets,
            json!({
                "userId": user_id,
                "count": 20,
                "includePromotedContent": false,
                "withQuickPromoteEligibilityTweetFields": false,
                "withVoice": true,
                "withV2Timeline": true,
            }),
            Box::new(|data| parse_timeline_tweets(data)),
        )
    }

    /// Up to `limit` tweets from a user's timeline
    pub async fn tweets(&self, user_id: &str, limit: usize) -> Result<Vec<Tweet>> {
        self.tweets_of(user_id).with_limit(limit).collect().await
    }

    /// Lazy walk over a search timeline; a different instruction shape
    /// than user timelines, same cursor contract
    pub fn search(&self, query: &str) -> Paginator<'_, Tweet> {
        self.paginate(
            Operation::SearchTimeline,
            json!({
                "rawQuery": query,
                "count": 20,
                "querySource": "typed_query",
                "product": "Latest",
            }),
            Box::new(|data| parse_timeline_tweets(data)),
        )
    }

    /// Fetch a single tweet by id
    pub async fn tweet(&self, tweet_id: &str) -> Result<Tweet> {
        let tweets = self.conversation(tweet_id).await?;
        tweets
            .into_iter()
            .find(|tweet| tweet.id.as_deref() == Some(tweet_id))
            .ok_or_else(|| ClientError::NotFound(format!("tweet {} is not visible", tweet_id)))
    }
}
