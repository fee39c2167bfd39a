use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use crate::models::Tweet;

/// A reconstructed self-thread/conversation. Relations are id-indexed
/// lookups, never live references between tweets
#[derive(Debug)]
pub struct Thread {
    /// The tweet with no resolvable parent in the set
    pub root: Tweet,
    /// Replies authored by the same identity as the root, chronological
    pub author_replies: Vec<Tweet>,
    /// Every reply regardless of author, chronological
    pub conversation: Vec<Tweet>,
    /// Parent id → direct children, chronological within each bucket
    pub children: HashMap<String, Vec<Tweet>>,
}

fn author_key(tweet: &Tweet) -> Option<String> {
    let author = tweet.author.as_ref()?;
    author.id.clone().or_else(|| author.screen_name.clone())
}

/// Snowflake ids order by time, which breaks ties between tweets posted
/// in the same second
fn numeric_id(tweet: &Tweet) -> u64 {
    tweet
        .id
        .as_deref()
        .and_then(|id| id.parse::<u64>().ok())
        .unwrap_or(0)
}

/// Derive a thread from a flat set of normalized tweets linked by
/// `in_reply_to`. The root is the earliest tweet whose parent is not in
/// the set; replies whose parents were deleted become orphan roots for
/// tree purposes but still count as conversation
pub fn reconstruct(tweets: Vec<Tweet>) -> Option<Thread> {
    // tombstones carry no id and cannot be linked to anything
    let linkable: Vec<Tweet> = tweets.into_iter().filter(|t| t.id.is_some()).collect();
    let ids: HashSet<String> = linkable.iter().filter_map(|t| t.id.clone()).collect();
    let ordered: Vec<Tweet> = linkable
        .into_iter()
        .sorted_by_key(|tweet| (tweet.created_at, numeric_id(tweet)))
        .collect();

    let root = ordered
        .iter()
        .find(|tweet| match &tweet.in_reply_to {
            None => true,
            Some(parent) => !ids.contains(parent),
        })?
        .clone();
    let root_author = author_key(&root);

    let conversation: Vec<Tweet> = ordered
        .iter()
        .filter(|tweet| tweet.id != root.id)
        .cloned()
        .collect();
    let author_replies: Vec<Tweet> = conversation
        .iter()
        .filter(|tweet| root_author.is_some() && author_key(tweet) == root_author)
        .cloned()
        .collect();
    let children: HashMap<String, Vec<Tweet>> = conversation
        .iter()
        .filter_map(|tweet| {
            tweet
                .in_reply_to
                .clone()
                .filter(|parent| ids.contains(parent))
                .map(|parent| (parent, tweet.clone()))
        })
        .into_group_map();

    Some(Thread {
        root,
        author_replies,
        conversation,
        children,
    })
}
