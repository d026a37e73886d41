//! Hard caps protecting the engine from unbounded growth. All limits
//! surface as `EngineError::LimitExceeded` with a short reason.

/// Max number of listed properties in one marketplace.
pub const MAX_PROPERTIES: usize = 100_000;

/// Max reservations (any status, including history) kept per property.
pub const MAX_RESERVATIONS_PER_PROPERTY: usize = 10_000;

/// Longest bookable stay, in nights.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// Stays must fall inside this calendar window.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2200;

/// Ratings are whole stars from 0 to 5.
pub const MAX_RATING: u8 = 5;

pub const MAX_DESCRIPTION_LEN: usize = 4096;
pub const MAX_COMMENT_LEN: usize = 2048;

/// Outbound mail requests buffered before the queue starts dropping.
pub const MAIL_QUEUE_CAPACITY: usize = 1024;

/// Default WAL appends between compactions.
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
