//! # xref-heap - Reference Managed Heap
//!
//! A small tracing heap that provides the managed-side contract the bridge
//! depends on:
//!
//! - **Tracing from roots**: objects reachable from a [`Root`] through
//!   [`Trace`] edges survive; everything else is unreachable.
//! - **Run-once finalizers**: an unreachable object with an armed finalizer
//!   is kept for one more cycle while the finalizer runs. The finalizer must
//!   re-arm itself to run again.
//! - **Collection requests**: [`CollectionScheduler::request_collection`]
//!   asks for another pass without blocking; a [`Collector`] thread can
//!   service requests in the background.
//!
//! ## Example
//!
//! ```rust
//! use xref_heap::{CollectionScheduler, Heap};
//!
//! let heap = Heap::new();
//! let root = heap.alloc(42u32);
//! let gc = root.gc();
//!
//! heap.set_finalizer(gc, |_heap, gc| {
//!     println!("finalizing {:?}", gc);
//! })?;
//!
//! drop(root);
//! heap.request_collection();
//! heap.collect_if_requested(); // finalizer runs, object kept this cycle
//! heap.collect(); // swept
//! assert!(!heap.is_live(gc.id()));
//! # Ok::<(), xref_heap::HeapError>(())
//! ```
//!
//! ## Modules
//!
//! - [`heap`]: slot arena, roots, mark-sweep and finalizers
//! - [`collector`]: background collection thread
//! - [`ptr`]: object identities and typed pointers
//! - [`trace`]: the [`Trace`] trait and edge reporting
//! - [`error`]: error types

pub mod collector;
pub mod error;
pub mod heap;
pub mod ptr;
pub mod trace;

pub use collector::{Collector, CollectorConfig};
pub use error::{HeapError, Result};
pub use heap::{CollectionReport, CollectionScheduler, Heap, HeapStats, Root};
pub use ptr::{Gc, ObjectId};
pub use trace::{Trace, Tracer};

/// Crate version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
