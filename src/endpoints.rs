use lazy_static::lazy_static;
use serde_json::{json, Value};
use strum_macros::{Display, EnumIter, EnumString};

pub const GRAPHQL_BASE: &str = "https://twitter.com/i/api/graphql";
pub const REST_BASE: &str = "https://api.twitter.com/1.1";
pub const UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
pub const HOME_URL: &str = "https://twitter.com/";

/// REST paths hanging off [`REST_BASE`]
pub const GUEST_ACTIVATE_PATH: &str = "guest/activate.json";
pub const VERIFY_CREDENTIALS_PATH: &str = "account/verify_credentials.json";
pub const ONBOARDING_TASK_PATH: &str = "onboarding/task.json";
pub const FRIENDSHIPS_CREATE_PATH: &str = "friendships/create.json";
pub const FRIENDSHIPS_DESTROY_PATH: &str = "friendships/destroy.json";
pub const BLOCKS_CREATE_PATH: &str = "blocks/create.json";

/// Every GraphQL operation this client knows how to issue. The query
/// identifiers are part of the upstream's URL scheme and rotate when the
/// web app redeploys; the names do not
#[derive(Display, Debug, Hash, Copy, Clone, EnumString, EnumIter, PartialEq, Eq)]
pub enum Operation {
    UserByScreenName,
    UserTweets,
    TweetDetail,
    Followers,
    Following,
    SearchTimeline,
    FavoriteTweet,
    UnfavoriteTweet,
    CreateRetweet,
    CreateTweet,
}

impl Operation {
    pub fn query_id(&self) -> &'static str {
        match self {
            Operation::UserByScreenName => "G3KGOASz96M-Qu0nwmGXNg",
            Operation::UserTweets => "E3opETHurmVJflFsUBVuUQ",
            Operation::TweetDetail => "xOhkmRac04YFZmOzU9PJHg",
            Operation::Followers => "rRXFSG5vR6drKr5M37YOTw",
            Operation::Following => "iSicc7LrzWGBgDPL0tM_TQ",
            Operation::SearchTimeline => "gkjsKepM6gl_HmFWoWKfgg",
            Operation::FavoriteTweet => "lI07N6Otwv1PhnEgXILM7A",
            Operation::UnfavoriteTweet => "ZYKSe-w7KEslx3JhSIk5LA",
            Operation::CreateRetweet => "ojPdsZsimiJrUGLR1sjUtA",
            Operation::CreateTweet => "a1p9RWpkYKBjWv_I3WzS-A",
        }
    }

    /// Mutations go over POST with a JSON body, queries over GET with
    /// url-encoded variables
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Operation::FavoriteTweet
                | Operation::UnfavoriteTweet
                | Operation::CreateRetweet
                | Operation::CreateTweet
        )
    }

    pub fn url(&self) -> String {
        format!("{}/{}/{}", GRAPHQL_BASE, self.query_id(), self)
    }

    /// The feature-flag payload the upstream requires on every request.
    /// Omitting any of these gets the whole call rejected
    pub fn features(&self) -> &'static Value {
        if self.is_mutation() {
            &MUTATION_FEATURES
        } else {
            &QUERY_FEATURES
        }
    }
}

lazy_static! {
    static ref QUERY_FEATURES: Value = json!({
        "rweb_lists_timeline_redesign_enabled": true,
        "responsive_web_graphql_exclude_directive_enabled": true,
        "verified_phone_label_enabled": false,
        "creator_subscriptions_tweet_preview_api_enabled": true,
        "responsive_web_graphql_timeline_navigation_enabled": true,
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
        "tweetypie_unmention_optimization_enabled": true,
        "responsive_web_edit_tweet_api_enabled": true,
        "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
        "view_counts_everywhere_api_enabled": true,
        "longform_notetweets_consumption_enabled": true,
        "responsive_web_twitter_article_tweet_consumption_enabled": false,
        "tweet_awards_web_tipping_enabled": false,
        "freedom_of_speech_not_reach_fetch_enabled": true,
        "standardized_nudges_misinfo": true,
        "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": true,
        "longform_notetweets_rich_text_read_enabled": true,
        "longform_notetweets_inline_media_enabled": true,
        "responsive_web_media_download_video_enabled": false,
        "responsive_web_enhance_cards_enabled": false,
    });
    static ref MUTATION_FEATURES: Value = json!({
        "tweetypie_unmention_optimization_enabled": true,
        "responsive_web_edit_tweet_api_enabled": true,
        "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
        "view_counts_everywhere_api_enabled": true,
        "longform_notetweets_consumption_enabled": true,
        "tweet_awards_web_tipping_enabled": false,
        "longform_notetweets_rich_text_read_enabled": true,
        "responsive_web_graphql_exclude_directive_enabled": true,
        "verified_phone_label_enabled": false,
        "freedom_of_speech_not_reach_fetch_enabled": true,
        "standardized_nudges_misinfo": true,
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
        "responsive_web_graphql_timeline_navigation_enabled": true,
    });
}

pub fn rest_url(path: &str) -> String {
    format!("{}/{}", REST_BASE, path)
}
