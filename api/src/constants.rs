//! Application constants

/// Maximum upload size for avatars and wall logos (10 MB)
pub const MAX_IMAGE_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Uploaded images are scaled down to fit this box
pub const MAX_IMAGE_DIMENSION: u32 = 512;

/// Default page size for paginated list endpoints
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Maximum page size for paginated list endpoints
pub const MAX_PAGE_SIZE: i64 = 100;

/// Upper bound on tweets fetched per hashtag or handle import
pub const IMPORT_BATCH_SIZE: u8 = 10;

/// Email verification token lifetime in hours
pub const VERIFY_EMAIL_TOKEN_HOURS: i64 = 48;

/// Password reset token lifetime in minutes
pub const RESET_PASSWORD_TOKEN_MINUTES: i64 = 60;

/// Invitation lifetime in days
pub const INVITATION_EXPIRY_DAYS: i64 = 7;

/// Minimum password length accepted at signup and reset
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum wall title length
pub const MAX_WALL_TITLE_LENGTH: usize = 100;

/// Default schedule for the handle queue sweep (every 15 minutes)
pub const DEFAULT_HANDLE_SWEEP_CRON: &str = "0 */15 * * * *";

/// Default schedule for the engagement refresh (daily at 03:00 UTC)
pub const DEFAULT_METRICS_REFRESH_CRON: &str = "0 0 3 * * *";
