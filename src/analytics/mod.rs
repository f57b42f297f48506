//! The analytics kernel: pure, deterministic functions over telemetry
//! record windows. Every analysis returns `AnalysisOutcome<T>` rather than
//! panicking or returning a sentinel when there isn't enough data, and every
//! function here is `Send + Sync` so the context assembler can run them
//! concurrently with `tokio::join!`.

pub mod anomalies;
pub mod energy_balance;
pub mod health;
pub mod load_profile;
pub mod night_discharge;
pub mod outcome;
pub mod predictive;
pub mod solar_performance;
pub mod stats;
pub mod trends;
pub mod usage_patterns;
pub mod weather_impact;

pub use outcome::AnalysisOutcome;
