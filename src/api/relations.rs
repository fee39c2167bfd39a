use std::collections::HashSet;

use futures::try_join;
use serde_json::json;

use crate::client::{Client, Paginator};
use crate::endpoints::Operation;
use crate::error::Result;
use crate::models::Profile;
use crate::timeline::parse_user_list;

/// The follower/following diff for one account
#[derive(Debug)]
pub struct RelationSummary {
    /// Accounts followed that do not follow back
    pub non_followers: Vec<Profile>,
    /// Accounts followed that follow back
    pub mutuals: Vec<Profile>,
}

/// Set difference over user ids: who doesn't follow back, who does
pub fn diff_relations(following: &[Profile], followers: &[Profile]) -> RelationSummary {
    let follower_ids: HashSet<&str> = followers.iter().map(|profile| profile.id.as_str()).collect();
    let mut non_followers = Vec::new();
    let mut mutuals = Vec::new();
    for profile in following {
        if follower_ids.contains(profile.id.as_str()) {
            mutuals.push(profile.clone());
        } else {
            non_followers.push(profile.clone());
        }
    }
    RelationSummary {
        non_followers,
        mutuals,
    }
}

fn user_list_variables(user_id: &str) -> serde_json::Value {
    json!({
        "userId": user_id,
        "count": 20,
        "includePromotedContent": false,
    })
}

impl Client {
    /// Lazy walk over an account's followers
    pub fn followers_of(&self, user_id: &str) -> Paginator<'_, Profile> {
        self.paginate(
            Operation::Followers,
            user_list_variables(user_id),
            Box::new(|data| parse_user_list(data)),
        )
    }

    /// Lazy walk over the accounts an account follows
    pub fn following_of(&self, user_id: &str) -> Paginator<'_, Profile> {
        self.paginate(
            Operation::Following,
            user_list_variables(user_id),
            Box::new(|data| parse_user_list(data)),
        )
    }

    pub async fn followers(&self, user_id: &str, limit: usize) -> Result<Vec<Profile>> {
        self.followers_of(user_id).with_limit(limit).collect().await
    }

    pub async fn following(&self, user_id: &str, limit: usize) -> Result<Vec<Profile>> {
        self.following_of(user_id).with_limit(limit).collect().await
    }

    /// Fetch both sides and diff them. The two paginations run
    /// concurrently; each carries its own cursor state
    pub async fn relation_summary(&self, user_id: &str, limit: usize) -> Result<RelationSummary> {
        let (following, followers) = try_join!(
            self.following(user_id, limit),
            self.followers(user_id, limit),
        )?;
        Ok(diff_relations(&following, &followers))
    }
}
