//! Reference timings and slot counts

/// Worker idle poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Watchdog fatal timeout in milliseconds
pub const DEFAULT_WATCHDOG_TIMEOUT_MS: u64 = 6_000;

/// Concurrent playback sessions per controller
pub const MAX_PLAYERS: usize = 4;

/// Concurrent capture sessions per controller
pub const MAX_RECORDERS: usize = 3;

/// VOIP runs a single loopback session
pub const VOIP_SESSIONS: usize = 1;

/// File played when a start command names none
pub const DEFAULT_PLAYBACK_FILE: &str = "test.wav";

/// Simulated backend latency per operation in milliseconds
pub const DEFAULT_SIM_OP_LATENCY_MS: u64 = 20;

/// Exit status used by the demo host when the watchdog escalates
pub const FATAL_EXIT_CODE: i32 = 70;

/// Watchdog group names used by the demo host
pub const GROUP_PLAYBACK: &str = "playback";
pub const GROUP_RECORD: &str = "record";
pub const GROUP_VOIP: &str = "voip";
