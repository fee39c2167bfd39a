use chrono::{DateTime, Utc};
use log::debug;
use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::models::{EngagementCounts, Media, MediaKind, Mention, Tweet, UserRef};
use crate::timeline::cursor::collect_instruction_arrays;
use crate::timeline::wire;

/// The upstream nests quotes inside retweets inside visibility wrappers;
/// anything deeper than this is garbage, not data
const MAX_NESTING: u8 = 4;

pub(crate) fn parse_twitter_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(date_str, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Normalize one `tweet_results.result` object, recursing through
/// quoted and retweeted wrappers. Tombstones come back marked, never
/// discarded; truly absent results are NotFound
pub fn parse_tweet_result(value: &Value) -> Result<Tweet> {
    parse_result_at(value, 0)
}

fn parse_result_at(value: &Value, depth: u8) -> Result<Tweet> {
    if depth >= MAX_NESTING {
        return Err(ClientError::protocol("tweet nesting exceeded sane bounds"));
    }
    if value.is_null() {
        return Err(ClientError::NotFound("tweet is unavailable".to_owned()));
    }
    let result: wire::TweetResult = serde_json::from_value(value.clone())
        .map_err(|_| ClientError::protocol("tweet result was not shaped like a tweet"))?;

    match result.typename.as_deref() {
        Some("TweetUnavailable") => {
            return Err(ClientError::NotFound("tweet is unavailable".to_owned()))
        }
        // the visibility wrapper carries no author or text of its own,
        // unwrap to the inner tweet
        Some("TweetWithVisibilityResults") => {
            let inner = result
                .tweet
                .ok_or_else(|| ClientError::protocol("visibility wrapper had no inner tweet"))?;
            return parse_result_at(&inner, depth + 1);
        }
        Some("TweetTombstone") => return Ok(tombstone_tweet(result.tombstone)),
        _ => {}
    }
    if result.tombstone.is_some() {
        return Ok(tombstone_tweet(result.tombstone));
    }

    let legacy = match result.legacy {
        Some(legacy) => legacy,
        // a bare wrapper without legacy data sometimes still nests the
        // real tweet under `tweet`
        None => match result.tweet {
            Some(inner) => return parse_result_at(&inner, depth + 1),
            None => return Err(ClientError::NotFound("tweet has no content".to_owned())),
        },
    };

    let author = result
        .core
        .and_then(|core| core.user_results)
        .and_then(|results| results.result)
        .map(|user| {
            let user_legacy = user.legacy.unwrap_or_default();
            UserRef {
                id: user.rest_id,
                screen_name: user_legacy.screen_name,
                name: user_legacy.name,
            }
        });

    let entities = legacy.entities.unwrap_or_default();
    let url_entities = entities.urls.unwrap_or_default();
    let text = legacy
        .full_text
        .map(|text| expand_shortened_links(&text, &url_entities));
    let urls = url_entities
        .iter()
        .filter_map(|entity| entity.expanded_url.clone())
        .collect::<Vec<_>>();
    let hashtags = entities
        .hashtags
        .unwrap_or_default()
        .into_iter()
        .map(|hashtag| hashtag.text)
        .collect::<Vec<_>>();
    let mentions = entities
        .user_mentions
        .unwrap_or_default()
        .into_iter()
        .map(|mention| Mention {
            screen_name: mention.screen_name,
            id: mention.id_str,
            name: mention.name,
        })
        .collect::<Vec<_>>();

    let media = legacy
        .extended_entities
        .and_then(|extended| extended.media)
        .unwrap_or_default()
        .iter()
        .filter_map(parse_media)
        .collect::<Vec<_>>();

    let views = result
        .views
        .and_then(|views| views.count)
        .and_then(|count| count.parse::<i64>().ok())
        .unwrap_or(0);
    let metrics = EngagementCounts {
        likes: legacy.favorite_count.unwrap_or(0),
        retweets: legacy.retweet_count.unwrap_or(0),
        replies: legacy.reply_count.unwrap_or(0),
        quotes: legacy.quote_count.unwrap_or(0),
        bookmarks: legacy.bookmark_count.unwrap_or(0),
        views,
    };

    let retweet_of = match legacy.retweeted_status_result {
        Some(wrapped) => Some(Box::new(parse_result_at(&wrapped["result"], depth + 1)?)),
        None => None,
    };
    let quoted = match result.quoted_status_result {
        Some(wrapped) if !wrapped["result"].is_null() => {
            Some(Box::new(parse_result_at(&wrapped["result"], depth + 1)?))
        }
        _ => None,
    };

    let id = result.rest_id;
    let url = match (&author, &id) {
        (Some(author), Some(id)) => author
            .screen_name
            .as_ref()
            .map(|screen_name| format!("https://twitter.com/{}/status/{}", screen_name, id)),
        _ => None,
    };

    Ok(Tweet {
        id,
        text,
        created_at: legacy.created_at.as_deref().and_then(parse_twitter_date),
        author,
        metrics,
        urls,
        hashtags,
        mentions,
        media,
        is_retweet: retweet_of.is_some(),
        retweet_of,
        is_reply: legacy.in_reply_to_status_id_str.is_some(),
        in_reply_to: legacy.in_reply_to_status_id_str,
        quoted,
        conversation_id: legacy.conversation_id_str,
        url,
        tombstone: None,
    })
}

fn tombstone_tweet(tombstone: Option<wire::Tombstone>) -> Tweet {
    let reason = tombstone
        .and_then(|tombstone| tombstone.text)
        .and_then(|text| text.text)
        .unwrap_or_else(|| "Tweet is unavailable".to_owned());
    Tweet {
        tombstone: Some(reason),
        ..Tweet::default()
    }
}

/// Swap each shortened-link token in the text for its expanded URL. The
/// entity offsets order the replacements; when they're nonsense the
/// token itself is still a reliable anchor
fn expand_shortened_links(text: &str, urls: &[wire::UrlEntity]) -> String {
    let mut expanded = text.to_owned();
    let mut ordered: Vec<&wire::UrlEntity> = urls.iter().collect();
    ordered.sort_by_key(|entity| {
        entity
            .indices
            .as_ref()
            .and_then(|indices| indices.first().copied())
            .unwrap_or(i64::MAX)
    });
    for entity in ordered.iter().rev() {
        if let Some(expansion) = &entity.expanded_url {
            expanded = expanded.replace(&entity.url, expansion);
        }
    }
    expanded
}

/// Photos keep their direct URL; videos and animated gifs pick the
/// highest-bitrate mp4 variant
fn parse_media(entity: &wire::MediaEntity) -> Option<Media> {
    let media_type = entity.media_type.as_deref()?;
    match media_type {
        "photo" => Some(Media {
            kind: MediaKind::Photo,
            url: entity.media_url_https.clone()?,
            preview_url: None,
            alt_text: entity.ext_alt_text.clone(),
        }),
        "video" | "animated_gif" => {
            let variants = entity.video_info.as_ref()?.variants.as_ref()?;
            let best = variants
                .iter()
                .filter(|variant| variant.content_type == "video/mp4")
                .max_by_key(|variant| variant.bitrate.unwrap_or(0))?;
            Some(Media {
                kind: if media_type == "video" {
                    MediaKind::Video
                } else {
                    MediaKind::AnimatedGif
                },
                url: best.url.clone(),
                preview_url: entity.media_url_https.clone(),
                alt_text: entity.ext_alt_text.clone(),
            })
        }
        other => {
            debug!("unrecognized media type {}", other);
            None
        }
    }
}

/// Pull every tweet out of a timeline payload: flat entries, the pinned
/// entry, module items and module-add items all contribute. Entries the
/// upstream tombstoned stay in the output, marked
pub fn parse_timeline_tweets(data: &Value) -> Vec<Tweet> {
    let mut tweets = Vec::new();
    let mut instruction_arrays = Vec::new();
    collect_instruction_arrays(data, &mut instruction_arrays);
    for instructions in instruction_arrays {
        for instruction in instructions.iter() {
            for entry in instruction["entries"].as_array().into_iter().flatten() {
                collect_from_entry(entry, &mut tweets);
            }
            collect_from_entry(&instruction["entry"], &mut tweets);
            for item in instruction["moduleItems"].as_array().into_iter().flatten() {
                collect_from_item_content(&item["item"]["itemContent"], &mut tweets);
            }
        }
    }
    tweets
}

fn collect_from_entry(entry: &Value, tweets: &mut Vec<Tweet>) {
    let content = &entry["content"];
    collect_from_item_content(&content["itemContent"], tweets);
    for item in content["items"].as_array().into_iter().flatten() {
        collect_from_item_content(&item["item"]["itemContent"], tweets);
    }
}

fn collect_from_item_content(item_content: &Value, tweets: &mut Vec<Tweet>) {
    let result = &item_content["tweet_results"]["result"];
    if result.is_null() {
        return;
    }
    match parse_tweet_result(result) {
        Ok(tweet) => tweets.push(tweet),
        Err(error) => debug!("skipping an unparseable timeline entry: {}", error),
    }
}
