//! Reference slot objects
//!
//! Bound functions recover their template and native object from fixed data
//! slots. Each slot holds a hookless object whose opaque payload owns one
//! strong reference; collecting the object releases it.

use std::any::Any;
use std::rc::Rc;

use tether_engine::{ClassDef, ClassId, Context, Value};

const REF_CLASS: &str = "tether.Ref";

fn ref_class(ctx: &Context) -> ClassId {
    ctx.class_id(REF_CLASS)
        .unwrap_or_else(|| ctx.register_class(ClassDef::new(REF_CLASS)))
}

pub(crate) fn new_ref<T: Any>(ctx: &Context, payload: T) -> Value {
    ctx.new_object_class(ref_class(ctx), Some(Rc::new(payload)))
}

pub(crate) fn ref_payload<T: Any + Clone>(ctx: &Context, value: &Value) -> Option<T> {
    let opaque = ctx.opaque(value, ref_class(ctx))?;
    opaque.downcast_ref::<T>().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ref_round_trip_and_release() {
        let ctx = Context::new();
        let shared = Arc::new(7u8);
        let slot = new_ref(&ctx, shared.clone());
        assert_eq!(Arc::strong_count(&shared), 2);
        assert_eq!(ref_payload::<Arc<u8>>(&ctx, &slot).as_deref(), Some(&7));
        assert!(ref_payload::<Arc<u16>>(&ctx, &slot).is_none());
        ctx.run_gc();
        assert_eq!(Arc::strong_count(&shared), 1);
    }
}
