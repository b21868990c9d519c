//! Chrome DevTools Protocol backend
//!
//! One WebSocket per browser, one flattened target session per page.
//! `CdpPage` is the only type outside this module that speaks raw CDP;
//! everything above it goes through the `Page` trait.

pub mod client;
pub mod page;
pub mod protocol;
pub mod session;

pub use client::{CDPClient, CDPError};
pub use page::CdpPage;
pub use protocol::{CDPEvent, CDPRequest, CDPResponse};
pub use session::CDPSession;
