//! hostdns-nameserver: keeps the host resolver pointed at the local DNS
//! server.
//!
//! ```text
//! ConfigReloadMonitor (background task)
//!   ├── shutdown       → stop
//!   ├── ChangeStream   → write to the watched file → DnsManager::set_primary()
//!   ├── watcher errors → log
//!   └── ticker         → DnsManager::set_primary()
//! ```

pub mod manager;
pub mod monitor;
pub mod watcher;

pub use manager::{CommandDnsManager, DnsManager};
pub use monitor::ConfigReloadMonitor;
pub use watcher::{ChangeEvent, ChangeKind, ChangeSender, ChangeStream, FsWatcher, WatchError};
