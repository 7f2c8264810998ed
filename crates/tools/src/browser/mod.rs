//! CDP-based browser control.
//!
//! - `cdp`: WebSocket command/event transport
//! - `session`: Chrome process launch and page attach
//! - `driver`: the `PageDriver` capability and its CDP implementation
//! - `indexer`: focus-order element indexing
//! - `watcher`: bounded navigation settlement

pub mod cdp;
pub mod driver;
pub mod indexer;
pub mod session;
pub mod watcher;

pub use driver::{CdpPage, ElementProbe, LifecycleEvent, NavigateOutcome, PageDriver};
pub use indexer::{format_elements, scrape, ElementRole, IndexLimits, IndexedElement};
pub use session::{find_browser_binary, BrowserSession};
pub use watcher::{LifecycleFlags, NavigationWatcher, Settlement};
