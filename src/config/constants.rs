// Identity & roulette
pub const STARTUP_EVENT_ID: &str = "startup";
// Preauth tokens effectively never expire for the startup game: 10 years.
pub const PREAUTH_TOKEN_TTL_MS: i64 = 10 * 365 * 24 * 60 * 60 * 1000;

// Leaderboard paging
pub const DEFAULT_LEADERBOARD_LIMIT: i64 = 50;
pub const MAX_LEADERBOARD_LIMIT: i64 = 1000;

// Bet settlement
pub const SCHEDULER_SHUTDOWN_GRACE_S: u64 = 10;
