//! Property tests: random interleavings of wrapping, native references,
//! callbacks and collection passes.

mod common;

use common::BridgeFixture;
use proptest::prelude::*;
use xref_bridge::{Object, Value};

#[derive(Debug, Clone)]
enum Op {
    Rewrap,
    DropObject,
    NativeRef,
    NativeUnref,
    Connect,
    Emit,
    Collect,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Rewrap),
        1 => Just(Op::DropObject),
        1 => Just(Op::NativeRef),
        1 => Just(Op::NativeUnref),
        1 => Just(Op::Connect),
        1 => Just(Op::Emit),
        2 => Just(Op::Collect),
    ]
}

fn run(ops: &[Op]) -> BridgeFixture {
    let fx = BridgeFixture::new();
    let handle = fx.sim.create();
    let mut objects: Vec<Object> = vec![fx.bridge.adopt(handle).unwrap()];
    let mut native = 0u32;

    for op in ops {
        match op {
            Op::Rewrap => {
                if !fx.sim.is_destroyed(handle) {
                    objects.push(fx.bridge.acquire(handle).unwrap());
                }
            },
            Op::DropObject => {
                objects.pop();
            },
            Op::NativeRef => {
                if !fx.sim.is_destroyed(handle) {
                    fx.sim.native_ref(handle);
                    native += 1;
                }
            },
            Op::NativeUnref => {
                if native > 0 {
                    fx.sim.native_unref(handle);
                    native -= 1;
                }
            },
            Op::Connect => {
                if let Some(object) = objects.last() {
                    let proxy = object.gc();
                    object
                        .connect("activate", move |_: &[Value]| {
                            let _ = proxy;
                        })
                        .unwrap();
                }
            },
            Op::Emit => {
                fx.sim.emit(handle, "activate", &[]);
            },
            Op::Collect => {
                fx.collect();
            },
        }

        // Released only when nothing on either side still uses the object
        if fx.sim.is_destroyed(handle) {
            assert!(objects.is_empty());
            assert_eq!(native, 0);
        }
    }

    objects.clear();
    for _ in 0..native {
        fx.sim.native_unref(handle);
    }
    fx.collect_until_quiet(8);

    assert!(fx.sim.is_destroyed(handle), "bridge never converged");
    fx
}

proptest! {
    #[test]
    fn test_property_never_double_release(ops in prop::collection::vec(op(), 0..40)) {
        let fx = run(&ops);
        prop_assert!(fx.sim.violations().is_empty(), "{:?}", fx.sim.violations());
        prop_assert_eq!(fx.sim.toggle_adds(), fx.sim.toggle_removes());
        prop_assert_eq!(fx.bridge.stats().outstanding(), 0);
    }

    #[test]
    fn test_property_registry_gone_after_convergence(ops in prop::collection::vec(op(), 0..40)) {
        let fx = run(&ops);
        let tables = fx.bridge.tables();
        prop_assert!(tables.closures().is_empty());
        prop_assert!(tables.toggles().is_empty());
    }
}
