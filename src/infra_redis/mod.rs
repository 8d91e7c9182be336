mod validation_cache_redis;

pub use validation_cache_redis::*;
