//! Shared constants for end-to-end tests.

pub const REQUEST_TIMEOUT_SECS: u64 = 10;

pub const TRACK_1_ID: &str = "T1";
pub const FRIEND_1_ID: i64 = 7;
pub const YOUTUBE_URL: &str = "https://www.youtube.com/watch?v=test1";
