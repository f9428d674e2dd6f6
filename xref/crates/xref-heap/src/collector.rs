//! Collector - background thread servicing collection requests.
//!
//! [`CollectionScheduler::request_collection`] only counts a request and
//! wakes this thread; the pass itself runs here, off the caller's stack.
//! Without a running collector, requests simply accumulate until someone
//! calls [`Heap::collect`] or [`Heap::collect_if_requested`].

use crate::error::{HeapError, Result};
use crate::heap::Heap;
use crossbeam::channel::{self, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Collector configuration
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Periodic collection interval
    ///
    /// If `Some`, a pass also runs whenever this much time passes without a
    /// request. If `None`, passes run on request only.
    ///
    /// Default: None
    pub interval: Option<Duration>,

    /// Name given to the worker thread
    ///
    /// Default: "xref-collector"
    pub thread_name: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval: None,
            thread_name: "xref-collector".to_string(),
        }
    }
}

impl CollectorConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.interval == Some(Duration::ZERO) {
            return Err(HeapError::Configuration(
                "interval must be non-zero".to_string(),
            ));
        }
        if self.thread_name.is_empty() {
            return Err(HeapError::Configuration(
                "thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Background collector bound to one heap
pub struct Collector {
    heap: Arc<Heap>,
    config: CollectorConfig,
    running: Arc<AtomicBool>,
    cycles: Arc<AtomicU64>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Collector {
    pub fn new(heap: Arc<Heap>, config: CollectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            heap,
            config,
            running: Arc::new(AtomicBool::new(false)),
            cycles: Arc::new(AtomicU64::new(0)),
            thread_handle: Mutex::new(None),
        })
    }

    /// Start the worker thread
    pub fn start(&self) -> Result<()> {
        let mut slot = self.thread_handle.lock();
        if slot.is_some() {
            return Err(HeapError::CollectorRunning);
        }

        let (sender, receiver) = channel::bounded::<()>(1);
        self.heap.set_waker(Some(sender));
        self.running.store(true, Ordering::Release);

        let heap = Arc::clone(&self.heap);
        let running = Arc::clone(&self.running);
        let cycles = Arc::clone(&self.cycles);
        let interval = self.config.interval;

        let spawned = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                log::debug!("collector thread started");
                loop {
                    let woke = match interval {
                        Some(interval) => match receiver.recv_timeout(interval) {
                            Ok(()) | Err(RecvTimeoutError::Timeout) => true,
                            Err(RecvTimeoutError::Disconnected) => false,
                        },
                        None => receiver.recv().is_ok(),
                    };
                    if !woke || !running.load(Ordering::Acquire) {
                        break;
                    }

                    heap.collect();
                    cycles.fetch_add(1, Ordering::Release);
                }
                log::debug!("collector thread stopped");
            });

        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            },
            Err(err) => {
                self.running.store(false, Ordering::Release);
                self.heap.set_waker(None);
                Err(HeapError::Spawn(err))
            },
        }
    }

    /// Stop the worker thread and wait for it
    pub fn stop(&self) -> Result<()> {
        let handle = self
            .thread_handle
            .lock()
            .take()
            .ok_or(HeapError::CollectorStopped)?;

        self.running.store(false, Ordering::Release);
        // Dropping the only sender disconnects the worker's receiver.
        self.heap.set_waker(None);
        let _ = handle.join();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.lock().is_some()
    }

    /// Passes completed by the worker thread
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::CollectionScheduler;
    use std::time::Instant;

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_config_validation() {
        assert!(CollectorConfig::default().validate().is_ok());

        let zero = CollectorConfig {
            interval: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_request_wakes_collector() {
        let heap = Heap::new();
        let gc = heap.alloc(1u32).gc();
        let collector = Collector::new(Arc::clone(&heap), CollectorConfig::default()).unwrap();
        collector.start().unwrap();

        heap.request_collection();

        assert!(wait_for(|| !heap.is_live(gc.id())));
        assert!(collector.cycles() >= 1);
        collector.stop().unwrap();
    }

    #[test]
    fn test_start_twice_and_stop_twice() {
        let collector = Collector::new(Heap::new(), CollectorConfig::default()).unwrap();
        collector.start().unwrap();
        assert!(matches!(collector.start(), Err(HeapError::CollectorRunning)));
        assert!(collector.is_running());

        collector.stop().unwrap();
        assert!(matches!(collector.stop(), Err(HeapError::CollectorStopped)));
        assert!(!collector.is_running());
    }

    #[test]
    fn test_interval_collects_without_requests() {
        let heap = Heap::new();
        let gc = heap.alloc(1u32).gc();
        let config = CollectorConfig {
            interval: Some(Duration::from_millis(10)),
            ..Default::default()
        };
        let collector = Collector::new(Arc::clone(&heap), config).unwrap();
        collector.start().unwrap();

        assert!(wait_for(|| !heap.is_live(gc.id())));
        collector.stop().unwrap();
    }
}
