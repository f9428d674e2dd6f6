//! # xref-bridge - Cross-Heap Reference Lifecycle Bridge
//!
//! Lets managed proxies own reference-counted foreign objects without ever
//! releasing an object the foreign side still uses, while still letting the
//! managed collector reclaim proxies (and the callbacks they own) once both
//! sides are done with them.
//!
//! ## Protocol
//!
//! 1. Wrapping a foreign object installs a *toggle reference*. From then on
//!    the foreign side reports whether anything besides the bridge holds
//!    the object ([`Bridge::on_toggle`]).
//! 2. Callbacks connected through an [`Object`] live in a per-handle
//!    registry that the managed tracer cannot see, so a callback capturing
//!    its own proxy does not keep that proxy alive.
//! 3. When a proxy becomes unreachable its finalizer asks the
//!    [`coordinator`]: release if nothing re-entered the registry and the
//!    foreign side holds no extra reference, otherwise defer and try again
//!    on a later collection pass.
//!
//! ## Example
//!
//! ```rust,ignore
//! use xref_bridge::{Bridge, BridgeConfig};
//! use xref_heap::Heap;
//!
//! let heap = Heap::new();
//! let bridge = Bridge::new(foreign, heap.clone(), BridgeConfig::default())?;
//! xref_bridge::install_global(bridge.clone());
//!
//! let window = bridge.adopt(handle)?;
//! window.connect("destroy", |_args| println!("gone"))?;
//! drop(window);
//! heap.collect(); // finalizer decides; foreign object released if unused
//! ```
//!
//! ## Modules
//!
//! - [`bridge`]: wrapping, notifications, finalizer wiring
//! - [`toggle`]: Toggle Tracker
//! - [`closures`]: Closure Registry
//! - [`dispatch`]: Callback Dispatcher
//! - [`coordinator`]: Finalization Coordinator state machine
//! - [`proxy`], [`object`]: managed-side handles
//! - [`global`]: process-wide bridge for FFI trampolines
//! - [`logging`], [`stats`]: bridge events and counters

pub mod bridge;
pub mod closures;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod foreign;
pub mod global;
pub mod handle;
pub mod logging;
pub mod object;
pub mod proxy;
pub mod stats;
pub mod toggle;

pub use bridge::{Bridge, SharedTables};
pub use closures::{Callback, ClosureTable, RegistryId};
pub use config::{BridgeConfig, ConfigError};
pub use coordinator::{DeferReason, FinalizeState};
pub use error::{BindError, BridgeError, Result};
pub use foreign::ForeignObjects;
pub use global::{closure_finalized, install_global, marshal, toggle_notify, uninstall_global};
pub use handle::{CallbackToken, ForeignHandle, Value};
pub use logging::{BridgeEvent, EventLog};
pub use object::Object;
pub use proxy::Proxy;
pub use stats::StatsSnapshot;
pub use toggle::ToggleTracker;

/// Crate version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
