//! Redis-backed request and connection limiting

pub mod connection;
pub mod rate;

pub use connection::ConnectionLimiter;
pub use rate::RateLimiter;
