use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::models::Profile;
use crate::timeline::cursor::collect_instruction_arrays;
use crate::timeline::tweet::parse_twitter_date;
use crate::timeline::wire;

/// Normalize a `user_results.result` object into a flat profile.
/// Absent or suspended users are NotFound; missing optional fields fall
/// back to defaults
pub fn parse_user_result(value: &Value) -> Result<Profile> {
    if value.is_null() {
        return Err(ClientError::NotFound("user does not exist".to_owned()));
    }
    let result: wire::UserResult = serde_json::from_value(value.clone())
        .map_err(|_| ClientError::protocol("user result was not shaped like a user"))?;
    if result.typename.as_deref() == Some("UserUnavailable") {
        return Err(ClientError::NotFound("user is unavailable".to_owned()));
    }
    let id = result
        .rest_id
        .ok_or_else(|| ClientError::NotFound("user has no identifier".to_owned()))?;
    // suspended accounts come back as a bare id with no legacy blob
    let legacy = result
        .legacy
        .ok_or_else(|| ClientError::NotFound("user has no profile data".to_owned()))?;

    let bio_urls = legacy
        .entities
        .as_ref()
        .and_then(|entities| entities.description.as_ref())
        .and_then(|description| description.urls.as_ref());
    let biography = legacy
        .description
        .as_ref()
        .map(|bio| expand_bio_links(bio, bio_urls));
    let website = legacy
        .entities
        .as_ref()
        .and_then(|entities| entities.url.as_ref())
        .and_then(|url| url.urls.as_ref())
        .and_then(|urls| urls.first())
        .and_then(|entity| entity.expanded_url.clone())
        .or(legacy.url.clone());

    let (bio_hashtags, bio_mentions) = match &biography {
        Some(bio) => extract_bio_entities(bio),
        None => (Vec::new(), Vec::new()),
    };

    Ok(Profile {
        id,
        screen_name: legacy.screen_name.clone().unwrap_or_default(),
        name: legacy.name.clone(),
        biography,
        location: legacy.location.clone().filter(|location| !location.is_empty()),
        website,
        joined: legacy.created_at.as_deref().and_then(parse_twitter_date),
        followers_count: legacy.followers_count.unwrap_or(0),
        following_count: legacy.friends_count.unwrap_or(0),
        tweets_count: legacy.statuses_count.unwrap_or(0),
        likes_count: legacy.favourites_count.unwrap_or(0),
        listed_count: legacy.listed_count.unwrap_or(0),
        media_count: legacy.media_count.unwrap_or(0),
        avatar_url: legacy
            .profile_image_url_https
            .as_deref()
            .map(upgrade_avatar_resolution),
        banner_url: legacy
            .profile_banner_url
            .as_deref()
            .map(upgrade_banner_resolution),
        verified: legacy.verified.unwrap_or(false),
        is_private: legacy.protected.unwrap_or(false),
        pinned_tweet_ids: legacy.pinned_tweet_ids_str.unwrap_or_default(),
        bio_hashtags,
        bio_mentions,
    })
}

/// The `user.result` envelope of a profile lookup
pub fn parse_profile_response(data: &Value) -> Result<Profile> {
    parse_user_result(&data["user"]["result"])
}

/// Every user in a follower/following timeline payload
pub fn parse_user_list(data: &Value) -> Vec<Profile> {
    let mut profiles = Vec::new();
    let mut instruction_arrays = Vec::new();
    collect_instruction_arrays(data, &mut instruction_arrays);
    for instructions in instruction_arrays {
        for instruction in instructions.iter() {
            for entry in instruction["entries"].as_array().into_iter().flatten() {
                let result = &entry["content"]["itemContent"]["user_results"]["result"];
                if result.is_null() {
                    continue;
                }
                match parse_user_result(result) {
                    Ok(profile) => profiles.push(profile),
                    Err(error) => debug!("skipping an unparseable user entry: {}", error),
                }
            }
        }
    }
    profiles
}

/// The upstream hands out `_normal` (48x48) avatars; rewrite to the
/// 400x400 variant
fn upgrade_avatar_resolution(url: &str) -> String {
    url.replace("_normal.", "_400x400.")
}

fn upgrade_banner_resolution(url: &str) -> String {
    if url.ends_with("/1500x500") {
        url.to_owned()
    } else {
        format!("{}/1500x500", url)
    }
}

fn expand_bio_links(bio: &str, urls: Option<&Vec<wire::UrlEntity>>) -> String {
    let mut expanded = bio.to_owned();
    for entity in urls.into_iter().flatten() {
        if let Some(expansion) = &entity.expanded_url {
            expanded = expanded.replace(&entity.url, expansion);
        }
    }
    expanded
}

fn extract_bio_entities(bio: &str) -> (Vec<String>, Vec<String>) {
    lazy_static! {
        static ref HASHTAG_PATTERN: Regex = Regex::new(r"#(\w+)").unwrap();
        static ref MENTION_PATTERN: Regex = Regex::new(r"@(\w+)").unwrap();
    }
    let hashtags = HASHTAG_PATTERN
        .captures_iter(bio)
        .map(|captures| captures[1].to_owned())
        .collect();
    let mentions = MENTION_PATTERN
        .captures_iter(bio)
        .map(|captures| captures[1].to_owned())
        .collect();
    (hashtags, mentions)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn user_result(screen_name: &str) -> Value {
        json!({
            "__typename": "User",
            "rest_id": "42",
            "legacy": {
                "screen_name": screen_name,
                "name": "A Bird",
                "description": "collector of shiny things https://t.co/xyz #rust @corvid",
                "location": "a tall tree",
                "url": "https://t.co/site",
                "created_at": "Mon Nov 29 21:18:24 +0000 2010",
                "followers_count": 150,
                "friends_count": 80,
                "statuses_count": 2000,
                "favourites_count": 991,
                "listed_count": 3,
                "media_count": 77,
                "profile_image_url_https": "https://pbs.example/profile_images/42/me_normal.jpg",
                "profile_banner_url": "https://pbs.example/profile_banners/42/1600000000",
                "verified": false,
                "protected": false,
                "pinned_tweet_ids_str": ["9000"],
                "entities": {
                    "description": { "urls": [{
                        "url": "https://t.co/xyz",
                        "expanded_url": "https://shiny.example",
                        "display_url": "shiny.example",
                        "indices": [26, 42],
                    }]},
                    "url": { "urls": [{
                        "url": "https://t.co/site",
                        "expanded_url": "https://nest.example",
                        "display_url": "nest.example",
                        "indices": [0, 17],
                    }]},
                },
            },
        })
    }

    #[test]
    fn normalizes_a_full_profile() {
        let profile = parse_user_result(&user_result("corvid_fan")).unwrap();
        assert_eq!(profile.id, "42");
        assert_eq!(profile.screen_name, "corvid_fan");
        assert_eq!(profile.followers_count, 150);
        assert_eq!(profile.following_count, 80);
        assert_eq!(profile.website.as_deref(), Some("https://nest.example"));
        assert_eq!(profile.pinned_tweet_ids, vec!["9000".to_owned()]);
        assert_eq!(profile.joined.unwrap().timestamp(), 1291065504);
    }

    #[test]
    fn bio_links_expand_and_entities_split_out() {
        let profile = parse_user_result(&user_result("corvid_fan")).unwrap();
        assert_eq!(
            profile.biography.as_deref(),
            Some("collector of shiny things https://shiny.example #rust @corvid")
        );
        assert_eq!(profile.bio_hashtags, vec!["rust".to_owned()]);
        assert_eq!(profile.bio_mentions, vec!["corvid".to_owned()]);
    }

    #[test]
    fn image_urls_upgrade_to_high_resolution() {
        let profile = parse_user_result(&user_result("corvid_fan")).unwrap();
        assert_eq!(
            profile.avatar_url.as_deref(),
            Some("https://pbs.example/profile_images/42/me_400x400.jpg")
        );
        assert_eq!(
            profile.banner_url.as_deref(),
            Some("https://pbs.example/profile_banners/42/1600000000/1500x500")
        );
    }

    #[test]
    fn missing_counts_default_to_zero() {
        let raw = json!({
            "rest_id": "7",
            "legacy": { "screen_name": "minimal" },
        });
        let profile = parse_user_result(&raw).unwrap();
        assert_eq!(profile.followers_count, 0);
        assert_eq!(profile.tweets_count, 0);
        assert!(profile.biography.is_none());
        assert!(profile.avatar_url.is_none());
    }

    #[test]
    fn absent_and_suspended_users_are_not_found() {
        assert!(matches!(
            parse_user_result(&Value::Null),
            Err(ClientError::NotFound(_))
        ));
        let suspended = json!({ "__typename": "UserUnavailable", "reason": "Suspended" });
        assert!(matches!(
            parse_user_result(&suspended),
            Err(ClientError::NotFound(_))
        ));
        let bare = json!({ "rest_id": "9" });
        assert!(matches!(
            parse_user_result(&bare),
            Err(ClientError::NotFound(_))
        ));
    }

    #[test]
    fn user_lists_parse_each_entry() {
        let data = json!({
            "user": { "result": { "timeline": { "timeline": { "instructions": [
                { "type": "TimelineAddEntries", "entries": [
                    { "entryId": "user-1", "content": { "itemContent": {
                        "user_results": { "result": user_result("alice") } } } },
                    { "entryId": "user-2", "content": { "itemContent": {
                        "user_results": { "result": user_result("bob") } } } },
                    { "entryId": "cursor-bottom-0", "content": {
                        "entryType": "TimelineTimelineCursor",
                        "cursorType": "Bottom", "value": "next" } },
                ]}
            ]}}}}
        });
        let users = parse_user_list(&data);
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].screen_name, "alice");
        assert_eq!(users[1].screen_name, "bob");
    }
}
