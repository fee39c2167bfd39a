use std::time::Duration;

use log::{info, warn};
use serde_json::{json, Value};

use crate::client::Client;
use crate::endpoints::{
    Operation, BLOCKS_CREATE_PATH, FRIENDSHIPS_CREATE_PATH, FRIENDSHIPS_DESTROY_PATH,
};
use crate::error::{ClientError, Result};

/// Upstream error codes meaning "the desired end state already holds"
const ALREADY_FAVORITED: i64 = 139;
const NOT_FAVORITED: i64 = 144;
const ALREADY_RETWEETED: i64 = 327;
const ALREADY_REQUESTED: i64 = 160;

#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub success: bool,
}

/// Pull upstream error codes out of a failed response. The body is
/// embedded in the error message, so junk yields an empty list rather
/// than another failure
fn upstream_error_codes(error: &ClientError) -> Vec<i64> {
    let body = match error {
        ClientError::Api(context) => context.body.clone(),
        // auth errors embed the body after a fixed prefix
        ClientError::Auth(message) => match message.find('{') {
            Some(start) => message[start..].to_owned(),
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|parsed| {
            parsed["errors"].as_array().map(|errors| {
                errors
                    .iter()
                    .filter_map(|error| error["code"].as_i64())
                    .collect()
            })
        })
        .unwrap_or_default()
}

/// Mutations whose failure says the state was already reached are
/// successes: the caller wanted the end state, not the transition
fn absorb_already_done(result: Result<Value>, benign: &[i64]) -> Result<ActionOutcome> {
    match result {
        Ok(_) => Ok(ActionOutcome { success: true }),
        Err(error) => {
            let codes = upstream_error_codes(&error);
            if codes.iter().any(|code| benign.contains(code)) {
                info!("mutation was already applied upstream ({:?})", codes);
                Ok(ActionOutcome { success: true })
            } else {
                Err(error)
            }
        }
    }
}

enum BulkAction {
    Unfollow,
    Like,
    Block,
}

/// Pacing for sequential bulk mutations
#[derive(Debug, Clone)]
pub struct BulkOptions {
    /// Delay between successive mutating calls
    pub delay: Duration,
    /// Report the expected shape without touching the network
    pub dry_run: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            dry_run: false,
        }
    }
}

#[derive(Debug)]
pub struct BulkReport {
    pub attempted: usize,
    pub succeeded: Vec<String>,
    /// Target and the error it failed with
    pub failed: Vec<(String, String)>,
    pub dry_run: bool,
}

impl Client {
    /// Like a tweet. Liking an already-liked tweet is a success
    pub async fn like(&self, tweet_id: &str) -> Result<ActionOutcome> {
        let result = self
            .graphql(
                Operation::FavoriteTweet,
                json!({ "tweet_id": tweet_id }),
                Some(true),
            )
            .await
            .map(|response| response.data);
        absorb_already_done(result, &[ALREADY_FAVORITED])
    }

    /// Remove a like; already-removed counts as done
    pub async fn unlike(&self, tweet_id: &str) -> Result<ActionOutcome> {
        let result = self
            .graphql(
                Operation::UnfavoriteTweet,
                json!({ "tweet_id": tweet_id }),
                Some(true),
            )
            .await
            .map(|response| response.data);
        absorb_already_done(result, &[NOT_FAVORITED])
    }

    /// Retweet. Retweeting twice is a success, not an error
    pub async fn retweet(&self, tweet_id: &str) -> Result<ActionOutcome> {
        let result = self
            .graphql(
                Operation::CreateRetweet,
                json!({ "tweet_id": tweet_id, "dark_request": false }),
                Some(true),
            )
            .await
            .map(|response| response.data);
        absorb_already_done(result, &[ALREADY_RETWEETED])
    }

    /// Post a tweet, optionally as a reply
    pub async fn create_tweet(&self, text: &str, reply_to: Option<&str>) -> Result<Value> {
        let mut variables = json!({
            "tweet_text": text,
            "dark_request": false,
            "media": { "media_entities": [], "possibly_sensitive": false },
            "semantic_annotation_ids": [],
        });
        if let Some(reply_to) = reply_to {
            variables["reply"] = json!({
                "in_reply_to_tweet_id": reply_to,
                "exclude_reply_user_ids": [],
            });
        }
        let response = self
            .graphql(Operation::CreateTweet, variables, Some(true))
            .await?;
        Ok(response.data)
    }

    pub async fn follow(&self, screen_name: &str) -> Result<ActionOutcome> {
        let result = self
            .rest(
                FRIENDSHIPS_CREATE_PATH,
                Some(vec![
                    ("screen_name".to_owned(), screen_name.to_owned()),
                    ("follow".to_owned(), "true".to_owned()),
                ]),
                Some(true),
            )
            .await;
        absorb_already_done(result, &[ALREADY_REQUESTED])
    }

    pub async fn unfollow(&self, screen_name: &str) -> Result<ActionOutcome> {
        let result = self
            .rest(
                FRIENDSHIPS_DESTROY_PATH,
                Some(vec![("screen_name".to_owned(), screen_name.to_owned())]),
                Some(true),
            )
            .await;
        absorb_already_done(result, &[])
    }

    pub async fn block(&self, screen_name: &str) -> Result<ActionOutcome> {
        let result = self
            .rest(
                BLOCKS_CREATE_PATH,
                Some(vec![("screen_name".to_owned(), screen_name.to_owned())]),
                Some(true),
            )
            .await;
        absorb_already_done(result, &[])
    }

    pub async fn bulk_unfollow(
        &self,
        screen_names: &[String],
        options: &BulkOptions,
    ) -> BulkReport {
        self.bulk(BulkAction::Unfollow, screen_names, options).await
    }

    pub async fn bulk_like(&self, tweet_ids: &[String], options: &BulkOptions) -> BulkReport {
        self.bulk(BulkAction::Like, tweet_ids, options).await
    }

    pub async fn bulk_block(&self, screen_names: &[String], options: &BulkOptions) -> BulkReport {
        self.bulk(BulkAction::Block, screen_names, options).await
    }

    /// Strictly sequential: one mutation, one delay, the next mutation.
    /// Dry runs report the expected shape with zero network calls
    async fn bulk(
        &self,
        action: BulkAction,
        targets: &[String],
        options: &BulkOptions,
    ) -> BulkReport {
        let mut report = BulkReport {
            attempted: targets.len(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            dry_run: options.dry_run,
        };
        for (index, target) in targets.iter().enumerate() {
            if options.dry_run {
                report.succeeded.push(target.clone());
                continue;
            }
            if index > 0 {
                tokio::time::sleep(options.delay).await;
            }
            let outcome = match action {
                BulkAction::Unfollow => self.unfollow(target).await,
                BulkAction::Like => self.like(target).await,
                BulkAction::Block => self.block(target).await,
            };
            match outcome {
                Ok(_) => report.succeeded.push(target.clone()),
                Err(error) => {
                    warn!("bulk action failed for {}: {}", target, error);
                    report.failed.push((target.clone(), error.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use crate::client::testing::{scripted_client, ScriptedTransport};
    use crate::rate_limit::ErrorStrategy;

    use super::*;

    fn client_with(transport: &ScriptedTransport) -> Client {
        let client = scripted_client(transport.clone(), Box::new(ErrorStrategy), 0);
        client.session().set_cookies("auth_token=tok; ct0=csrf");
        client
    }

    #[tokio::test]
    async fn liking_succeeds_on_a_fresh_tweet() {
        let transport = ScriptedTransport::new();
        transport.push_status(StatusCode::OK, r#"{"data":{"favorite_tweet":"Done"}}"#);
        let client = client_with(&transport);
        let outcome = client.like("1").await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn liking_an_already_liked_tweet_is_a_success() {
        let transport = ScriptedTransport::new();
        transport.push_status(
            StatusCode::FORBIDDEN,
            r#"{"errors":[{"code":139,"message":"You have already favorited this status."}]}"#,
        );
        let client = client_with(&transport);
        let outcome = client.like("1").await.unwrap();
        assert_eq!(outcome, ActionOutcome { success: true });
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn retweeting_twice_is_a_success() {
        let transport = ScriptedTransport::new();
        transport.push_status(
            StatusCode::FORBIDDEN,
            r#"{"errors":[{"code":327,"message":"You have already retweeted this Tweet."}]}"#,
        );
        let client = client_with(&transport);
        assert!(client.retweet("1").await.unwrap().success);
    }

    #[tokio::test]
    async fn unrelated_errors_still_propagate() {
        let transport = ScriptedTransport::new();
        transport.push_status(
            StatusCode::FORBIDDEN,
            r#"{"errors":[{"code":64,"message":"Your account is suspended."}]}"#,
        );
        let client = client_with(&transport);
        assert!(matches!(
            client.like("1").await,
            Err(ClientError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn dry_run_bulk_makes_zero_network_calls() {
        let transport = ScriptedTransport::new();
        let client = client_with(&transport);
        let targets = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        let options = BulkOptions {
            dry_run: true,
            ..BulkOptions::default()
        };
        let report = client.bulk_unfollow(&targets, &options).await;
        assert_eq!(transport.calls(), 0);
        assert!(report.dry_run);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, targets);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn live_bulk_runs_sequentially_and_keeps_failures() {
        let transport = ScriptedTransport::new();
        transport.push_status(StatusCode::OK, r#"{"id":1}"#);
        transport.push_status(
            StatusCode::FORBIDDEN,
            r#"{"errors":[{"code":64,"message":"suspended"}]}"#,
        );
        let client = client_with(&transport);
        let targets = vec!["good".to_owned(), "bad".to_owned()];
        let options = BulkOptions {
            delay: Duration::from_millis(1),
            dry_run: false,
        };
        let report = client.bulk_unfollow(&targets, &options).await;
        assert_eq!(transport.calls(), 2);
        assert_eq!(report.succeeded, vec!["good".to_owned()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad");
    }
}
