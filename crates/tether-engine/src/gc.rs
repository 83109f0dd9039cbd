//! Mark-and-sweep collection
//!
//! Roots are the global object, pinned objects and the pending exception.
//! Class mark hooks run with no heap borrow held. Finalizers run after the
//! dead objects have left the heap, so a finalizer can never observe a
//! half-swept object through the context.

use std::collections::HashSet;

use crate::class::{Finalizer, GcMark, Marker};
use crate::context::Context;
use crate::object::HeapObject;
use crate::value::{ObjectId, Value};

/// Collector counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Completed collections
    pub runs: u64,
    /// Objects removed by the last collection
    pub collected: usize,
    /// Finalizers run by the last collection
    pub finalized: usize,
    /// Objects alive after the last collection
    pub live: usize,
}

impl Context {
    /// Collect every object not reachable from a root
    pub fn run_gc(&self) -> GcStats {
        let marked = self.mark();

        let dead: Vec<HeapObject> = {
            let mut heap = self.inner.heap.borrow_mut();
            let ids: Vec<ObjectId> = heap.live_ids().filter(|id| !marked.contains(id)).collect();
            ids.into_iter().filter_map(|id| heap.remove(id)).collect()
        };
        let collected = dead.len();
        let finalized = self.finalize(dead);

        let mut stats = self.inner.stats.borrow_mut();
        stats.runs += 1;
        stats.collected = collected;
        stats.finalized = finalized;
        stats.live = self.inner.heap.borrow().len();
        tracing::trace!("gc run {}: {} collected, {} live", stats.runs, collected, stats.live);
        *stats
    }

    pub fn gc_stats(&self) -> GcStats {
        *self.inner.stats.borrow()
    }

    fn mark(&self) -> HashSet<ObjectId> {
        let hooks: Vec<Option<GcMark>> =
            self.inner.classes.borrow().iter().map(|c| c.gc_mark.clone()).collect();

        let mut work: Vec<ObjectId> = self.inner.heap.borrow().pinned_ids().collect();
        work.push(self.inner.global);
        if let Some(Value::Object(id)) = &*self.inner.exception.borrow() {
            work.push(*id);
        }

        let mut marked = HashSet::new();
        while let Some(id) = work.pop() {
            if !marked.insert(id) {
                continue;
            }
            let traced = {
                let heap = self.inner.heap.borrow();
                let Some(object) = heap.get(id) else { continue };
                object.children(&mut work);
                let hook = hooks.get(object.class.0 as usize).cloned().flatten();
                object.opaque.clone().zip(hook)
            };
            if let Some((payload, hook)) = traced {
                let mut marker = Marker::default();
                hook(&*payload, &mut marker);
                work.extend(marker.found);
            }
        }
        marked
    }

    /// Run class finalizers for removed objects, then drop them
    fn finalize(&self, mut dead: Vec<HeapObject>) -> usize {
        let finalizers: Vec<Option<Finalizer>> =
            self.inner.classes.borrow().iter().map(|c| c.finalizer.clone()).collect();
        let mut count = 0;
        for object in &mut dead {
            let Some(finalizer) = finalizers.get(object.class.0 as usize).cloned().flatten() else {
                continue;
            };
            if let Some(opaque) = object.opaque.take() {
                finalizer(self, opaque);
                count += 1;
            }
        }
        drop(dead);
        count
    }

    /// Finalize everything; runs when the last context handle drops
    pub(crate) fn teardown(&self) {
        self.inner.exception.borrow_mut().take();
        // finalizers may allocate, so sweep until the heap stays empty
        for _ in 0..8 {
            let dead: Vec<HeapObject> = {
                let mut heap = self.inner.heap.borrow_mut();
                let ids: Vec<ObjectId> = heap.live_ids().collect();
                ids.into_iter().filter_map(|id| heap.remove(id)).collect()
            };
            if dead.is_empty() {
                return;
            }
            self.finalize(dead);
        }
        tracing::warn!("context teardown left {} objects", self.object_count());
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::class::ClassDef;
    use crate::context::Context;
    use crate::value::Value;

    #[test]
    fn test_unreachable_cycle_collected() {
        let ctx = Context::new();
        let a = ctx.new_object();
        let b = ctx.new_object();
        ctx.set_property(&a, "b", b.clone()).unwrap();
        ctx.set_property(&b, "a", a.clone()).unwrap();
        let before = ctx.object_count();
        let stats = ctx.run_gc();
        assert_eq!(stats.collected, 2);
        assert_eq!(ctx.object_count(), before - 2);
        assert!(!ctx.is_live(&a));
    }

    #[test]
    fn test_global_and_pins_are_roots() {
        let ctx = Context::new();
        let kept = ctx.new_object();
        ctx.set_property(&ctx.global(), "kept", kept.clone()).unwrap();
        let pinned = ctx.dup_value(&ctx.new_object());
        ctx.run_gc();
        assert!(ctx.is_live(&kept));
        assert!(ctx.is_live(&pinned));
        ctx.free_value(pinned.clone());
        ctx.run_gc();
        assert!(!ctx.is_live(&pinned));
    }

    #[test]
    fn test_mark_hook_and_finalizer() {
        struct Payload {
            child: Value,
        }
        let ctx = Context::new();
        let finalized = Rc::new(Cell::new(0));
        let counter = finalized.clone();
        let class = ctx.register_class(
            ClassDef::new("Holder")
                .gc_mark(|payload, marker| {
                    if let Some(p) = payload.downcast_ref::<Payload>() {
                        marker.mark(&p.child);
                    }
                })
                .finalizer(move |_ctx, _opaque| counter.set(counter.get() + 1)),
        );
        let child = ctx.new_object();
        let holder = ctx.new_object_class(class, Some(Rc::new(Payload { child: child.clone() })));
        let holder = ctx.dup_value(&holder);

        ctx.run_gc();
        assert!(ctx.is_live(&child));
        assert_eq!(finalized.get(), 0);

        ctx.free_value(holder.clone());
        ctx.run_gc();
        assert!(!ctx.is_live(&holder));
        assert!(!ctx.is_live(&child));
        assert_eq!(finalized.get(), 1);
        ctx.run_gc();
        assert_eq!(finalized.get(), 1);
    }

    #[test]
    fn test_teardown_runs_finalizers() {
        let finalized = Rc::new(Cell::new(0));
        {
            let ctx = Context::new();
            let counter = finalized.clone();
            let class = ctx.register_class(
                ClassDef::new("Leaf").finalizer(move |_ctx, _| counter.set(counter.get() + 1)),
            );
            let leaf = ctx.new_object_class(class, Some(Rc::new(())));
            ctx.set_property(&ctx.global(), "leaf", leaf).unwrap();
        }
        assert_eq!(finalized.get(), 1);
    }
}
