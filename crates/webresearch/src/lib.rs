//! Web research tool server
//!
//! Exposes search / visit / screenshot as MCP tools on stdio, backed by one
//! long-lived Chrome and a bounded in-memory session of everything retrieved.
//!
//! ```text
//! server ──► ResearchService ──► with_retry ──► ResourceManager ─► Page
//!                   │                              safe_navigate
//!                   │                              extract_markdown / capture_bounded
//!                   └──► SessionStore ◄── ScreenshotStore
//! ```

pub mod config;
pub mod error;
pub mod research;
pub mod retry;
pub mod server;
pub mod session;
pub mod validation;

pub use config::{Cli, ResearchConfig};
pub use error::{Result, ToolError};
pub use research::{Capture, PageVisit, ResearchService};
pub use retry::{with_retry, RetryPolicy};
pub use server::McpServer;
pub use session::{ResearchResult, ResearchSession, SessionStore, SessionSummary, MAX_RESULTS};
