//! Browser Resource Management
//!
//! Keeps one automated Chrome alive across many sequential operations and
//! makes the decisions that sit on top of its raw output.
//!
//! # Architecture Philosophy
//!
//! 1. **Data structures first**: one owned browser/page pair, explicit state machines
//! 2. **Traits at the seam**: `Launcher` / `BrowserHandle` / `Page` hide CDP so the
//!    backend can be swapped for the in-memory fake in tests
//! 3. **Plain data across the page boundary**: in-page logic returns snapshots,
//!    decisions are pure functions over them
//! 4. **Practical**: bounded waits everywhere, nothing blocks forever

pub mod cdp;
pub mod config;
pub mod error;
pub mod events;
pub mod launcher;
pub mod manager;
pub mod navigation;
pub mod page;
pub mod screenshot;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cdp::{CDPClient, CDPSession};
pub use config::{BrowserConfig, PageSettings, Viewport};
pub use error::{BrowserError, ErrorKind, Result};
pub use events::{BrowserEvent, EventBus};
pub use launcher::{BrowserHandle, ChromeLauncher, Launcher};
pub use manager::{BrowserState, PageState, ResourceManager};
pub use navigation::{safe_navigate, QualityProfile};
pub use page::{Cookie, NavigationResponse, Page, QualitySnapshot};
pub use screenshot::capture_bounded;
