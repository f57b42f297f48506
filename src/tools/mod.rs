//! The tool catalog and dispatcher the Conversation Runner calls into when
//! the model requests additional data. The executor is the only place that
//! bridges the LLM's JSON tool calls to the Telemetry Store and the
//! Analytics Kernel; it never throws into the runner.

pub mod alert_events;
pub mod catalog;
pub mod executor;

pub use catalog::{canonical_tool_name, catalog as tool_catalog, ToolSpec};
pub use executor::{execute, NoWeatherProvider, ToolContext, ToolResult, WeatherProvider};
