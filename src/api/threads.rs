use log::debug;
use serde_json::json;

use crate::client::Client;
use crate::endpoints::Operation;
use crate::error::{ClientError, Result};
use crate::models::Tweet;
use crate::timeline::{parse_timeline_tweets, reconstruct, Thread};

/// How far up a reply chain the thread fetch walks by default
pub const DEFAULT_THREAD_DEPTH: usize = 10;

impl Client {
    /// Every tweet visible in a conversation page, tombstones included
    pub async fn conversation(&self, tweet_id: &str) -> Result<Vec<Tweet>> {
        let response = self
            .graphql(
                Operation::TweetDetail,
                json!({
                    "focalTweetId": tweet_id,
                    "with_rux_injections": false,
                    "includePromotedContent": false,
                    "withCommunity": true,
                    "withQuickPromoteEligibilityTweetFields": false,
                    "withBirdwatchNotes": false,
                    "withVoice": true,
                    "withV2Timeline": true,
                }),
                None,
            )
            .await?;
        Ok(parse_timeline_tweets(&response.data))
    }

    /// Reconstruct the thread a tweet belongs to. Walks *upward* first:
    /// while the focal tweet is a reply, its parent's context is fetched
    /// and the focal id re-targeted to the parent, up to `max_depth`
    /// hops, then the thread is rebuilt from the discovered root's
    /// conversation
    pub async fn thread(&self, tweet_id: &str, max_depth: usize) -> Result<Thread> {
        let mut focal = tweet_id.to_owned();
        let mut tweets = self.conversation(&focal).await?;
        for _ in 0..max_depth {
            let parent = tweets
                .iter()
                .find(|tweet| tweet.id.as_deref() == Some(focal.as_str()))
                .and_then(|tweet| tweet.in_reply_to.clone());
            let parent = match parent {
                Some(parent) => parent,
                // no parent: the focal tweet is the root
                None => break,
            };
            match self.conversation(&parent).await {
                Ok(upper) if !upper.is_empty() => {
                    debug!("walking thread upward from {} to {}", focal, parent);
                    focal = parent;
                    tweets = upper;
                }
                // the parent was deleted; the chain ends here
                Ok(_) | Err(ClientError::NotFound(_)) => break,
                Err(error) => return Err(error),
            }
        }
        reconstruct(tweets)
            .ok_or_else(|| ClientError::NotFound(format!("no conversation around {}", tweet_id)))
    }
}
