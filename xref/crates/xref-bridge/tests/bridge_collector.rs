//! Bridge driven by a background collector thread.

mod common;

use common::BridgeFixture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use xref_heap::{Collector, CollectorConfig};

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
fn test_last_reference_notification_drives_release() {
    let fx = BridgeFixture::new();
    let collector = Collector::new(Arc::clone(&fx.heap), CollectorConfig::default()).unwrap();
    collector.start().unwrap();

    let handle = fx.sim.create();
    let object = fx.bridge.adopt(handle).unwrap();
    fx.sim.native_ref(handle);
    drop(object);

    // Nothing asks for a pass until the native holder lets go
    fx.sim.native_unref(handle);

    assert!(wait_for(|| fx.sim.is_destroyed(handle)));
    assert!(fx.bridge.stats().collection_requests >= 1);
    assert!(collector.cycles() >= 1);
    collector.stop().unwrap();
    assert!(fx.sim.violations().is_empty());
}

#[test]
fn test_many_objects_from_many_threads() {
    let fx = Arc::new(BridgeFixture::new());
    let collector = Collector::new(
        Arc::clone(&fx.heap),
        CollectorConfig {
            interval: Some(Duration::from_millis(2)),
            ..Default::default()
        },
    )
    .unwrap();
    collector.start().unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let fx = Arc::clone(&fx);
            std::thread::spawn(move || {
                let mut handles = Vec::new();
                for _ in 0..25 {
                    let handle = fx.sim.create();
                    let object = fx.bridge.adopt(handle).unwrap();
                    object.connect("tick", |_| {}).unwrap();
                    fx.sim.emit(handle, "tick", &[]);
                    handles.push(handle);
                }
                handles
            })
        })
        .collect();

    let handles: Vec<_> = workers
        .into_iter()
        .flat_map(|worker| worker.join().unwrap())
        .collect();

    assert!(wait_for(|| handles.iter().all(|h| fx.sim.is_destroyed(*h))));
    collector.stop().unwrap();

    assert_eq!(fx.bridge.stats().released, 100);
    assert_eq!(fx.sim.toggle_adds(), fx.sim.toggle_removes());
}
