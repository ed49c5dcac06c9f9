pub mod store;
pub mod user;

use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_QUEUE_HOST: &str = "127.0.0.1";
pub const DEFAULT_QUEUE_PORT: u16 = 7071;
pub const DEFAULT_PORTAL_PORT: u16 = 5001;
pub const DEFAULT_REQUEST_TTL_SECS: u64 = 60;
pub const API_TOKEN_HEADER: &str = "x-handoff-token";

pub use store::*;
pub use user::*;

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
