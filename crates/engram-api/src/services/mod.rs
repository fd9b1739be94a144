//! Supporting services for the API server.

pub mod search_cache;

pub use search_cache::RedisCache;
