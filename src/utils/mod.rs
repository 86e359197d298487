/// Utility modules shared by the subscription engine and the MCP layer.
pub mod time;

pub use time::now_utc;
