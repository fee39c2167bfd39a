//! Operation-specific parsers that read the nested, inconsistently
//! shaped upstream JSON and emit stable flat records

pub use cursor::extract_bottom_cursor;
pub use profile::{parse_profile_response, parse_user_list, parse_user_result};
pub use thread::{reconstruct, Thread};
pub use tweet::{parse_timeline_tweets, parse_tweet_result};

pub mod cursor;
pub mod profile;
pub mod thread;
pub mod tweet;
pub mod wire;
