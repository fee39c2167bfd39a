pub mod api;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod guest;
pub mod models;
pub mod rate_limit;
pub mod request;
pub mod session;
pub mod timeline;

pub use client::{Client, ClientBuilder, Page, Paginator};
pub use error::{ClientError, Result};
pub use guest::GuestTokenManager;
pub use models::{Profile, Tweet};
pub use session::{Session, SessionKey};
pub use dotenv::dotenv;
pub use std::env;
