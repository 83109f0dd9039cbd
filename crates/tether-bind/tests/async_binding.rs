//! Async property integration tests - worker dispatch and delivery back to
//! the engine thread

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tether_bind::engine::{Context, PromiseState, Value};
use tether_bind::{ErrorDesc, FunctionTemplate, ObjectTemplate, MODE_OBJECT};

use common::{call_method, init_tracing, module_env, recorder, WAIT};

// ============================================================================
// STD CALLBACKS
// ============================================================================

#[test]
fn test_std_callback_receives_result() {
    init_tracing();
    let ctx = Context::new();
    let tpl = ObjectTemplate::new(&module_env(&ctx, "greeter"));
    tpl.set_async_std("greet", |info| info.post(format!("hello {}", info.param(0).string_value())));
    let obj = tpl.new_instance(&ctx).unwrap();
    let (cb, calls) = recorder(&ctx);

    let ret = call_method(&ctx, &obj, "greet", &[Value::from("bob"), cb]).unwrap();
    assert!(ret.is_undefined());
    assert!(ctx.run_jobs_until(|| !calls.borrow().is_empty(), WAIT));
    assert_eq!(calls.borrow()[0], vec![Value::Null, Value::from("hello bob")]);
}

#[test]
fn test_std_callback_receives_error() {
    init_tracing();
    let ctx = Context::new();
    let tpl = ObjectTemplate::new(&module_env(&ctx, "greeter"));
    tpl.set_async_std("fail", |info| info.post_error("boom"));
    let obj = tpl.new_instance(&ctx).unwrap();
    let (cb, calls) = recorder(&ctx);

    call_method(&ctx, &obj, "fail", &[cb]).unwrap();
    assert!(ctx.run_jobs_until(|| !calls.borrow().is_empty(), WAIT));
    let err = calls.borrow()[0][0].clone();
    assert!(ctx.is_error(&err));
    assert_eq!(ctx.describe_exception(&err), "Error: boom");
}

#[test]
fn test_token_fires_only_once() {
    init_tracing();
    let ctx = Context::new();
    let tpl = ObjectTemplate::new(&module_env(&ctx, "twice"));
    tpl.set_async_std("twice", |info| {
        info.post(1);
        info.post(2);
    });
    let obj = tpl.new_instance(&ctx).unwrap();
    let (cb, calls) = recorder(&ctx);

    call_method(&ctx, &obj, "twice", &[cb]).unwrap();
    assert!(ctx.run_jobs_until(|| !calls.borrow().is_empty(), WAIT));
    ctx.poll_jobs(Duration::from_millis(50));
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(calls.borrow()[0][1], Value::Int(1));
}

#[test]
fn test_prepare_hook_reject_skips_body() {
    init_tracing();
    let ctx = Context::new();
    let ran = Arc::new(AtomicBool::new(false));
    let tpl = ObjectTemplate::new(&module_env(&ctx, "files"));
    let flag = Arc::clone(&ran);
    tpl.set_async_std("open", move |_| flag.store(true, Ordering::SeqCst))
        .prepare_params(|prep| {
            if prep.arg(0).as_str().is_none() {
                prep.reject(ErrorDesc::new("path required"));
            }
            false
        });
    let obj = tpl.new_instance(&ctx).unwrap();
    let (cb, calls) = recorder(&ctx);

    call_method(&ctx, &obj, "open", &[Value::Int(3), cb]).unwrap();
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(ctx.describe_exception(&calls.borrow()[0][0]), "Error: path required");
    std::thread::sleep(Duration::from_millis(50));
    assert!(!ran.load(Ordering::SeqCst));
}

// ============================================================================
// FIRE AND FORGET
// ============================================================================

#[test]
fn test_fire_and_forget_passes_first_argument() {
    init_tracing();
    let ctx = Context::new();
    let tpl = ObjectTemplate::new(&module_env(&ctx, "echo"));
    tpl.set_async("echo", |info| info.post(info.param(0)));
    let obj = tpl.new_instance(&ctx).unwrap();
    let (cb, calls) = recorder(&ctx);

    call_method(&ctx, &obj, "echo", &[Value::Int(9), cb]).unwrap();
    assert!(ctx.run_jobs_until(|| !calls.borrow().is_empty(), WAIT));
    assert_eq!(calls.borrow()[0], vec![Value::Int(9)]);
}

#[test]
fn test_fire_and_forget_without_arguments_sees_null() {
    init_tracing();
    let ctx = Context::new();
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let tpl = ObjectTemplate::new(&module_env(&ctx, "ping"));
    tpl.set_async("ping", move |info| {
        let _ = tx.lock().unwrap().send((info.params().len(), info.param(0).is_null()));
    });
    let obj = tpl.new_instance(&ctx).unwrap();

    let ret = call_method(&ctx, &obj, "ping", &[]).unwrap();
    assert!(ret.is_undefined());
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), (0, true));
}

#[test]
fn test_same_object_runs_in_call_order() {
    init_tracing();
    let ctx = Context::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let tpl = ObjectTemplate::new(&module_env(&ctx, "ordered"));
    tpl.set_async_schedule_mode(MODE_OBJECT);
    let sink = Arc::clone(&order);
    tpl.set_async("push", move |info| sink.lock().unwrap().push(info.param(0).int_value()));
    let obj = tpl.new_instance(&ctx).unwrap();

    for i in 0..20 {
        call_method(&ctx, &obj, "push", &[Value::Int(i)]).unwrap();
    }
    let deadline = Instant::now() + WAIT;
    while order.lock().unwrap().len() < 20 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
}

// ============================================================================
// PROMISES
// ============================================================================

#[test]
fn test_promise_resolves_with_posted_value() {
    init_tracing();
    let ctx = Context::new();
    let tpl = ObjectTemplate::new(&module_env(&ctx, "loader"));
    tpl.set_promise("load", |info| info.post(42));
    let obj = tpl.new_instance(&ctx).unwrap();

    let promise = call_method(&ctx, &obj, "load", &[]).unwrap();
    assert_eq!(ctx.promise_state(&promise), Some(PromiseState::Pending));
    assert!(ctx.run_jobs_until(|| ctx.promise_state(&promise) != Some(PromiseState::Pending), WAIT));
    assert_eq!(ctx.promise_state(&promise), Some(PromiseState::Fulfilled));
    assert_eq!(ctx.promise_result(&promise), Value::Int(42));
}

#[test]
fn test_post_js_thread_resolves_with_engine_value() {
    init_tracing();
    let ctx = Context::new();
    let tpl = ObjectTemplate::new(&module_env(&ctx, "loader"));
    tpl.set_promise("list", |info| {
        info.post_js_thread(|js| {
            let list = js.context().new_array(vec![Value::Int(1), Value::Int(2)]);
            js.return_value().set(list);
        })
    });
    let obj = tpl.new_instance(&ctx).unwrap();

    let promise = call_method(&ctx, &obj, "list", &[]).unwrap();
    assert!(ctx.run_jobs_until(|| ctx.promise_state(&promise) != Some(PromiseState::Pending), WAIT));
    let list = ctx.promise_result(&promise);
    assert_eq!(ctx.array_len(&list).unwrap(), 2);
}

#[test]
fn test_promise_stays_pending_after_owner_is_collected() {
    init_tracing();
    let ctx = Context::new();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let go_rx = Mutex::new(go_rx);
    let done_tx = Mutex::new(done_tx);
    let tpl = ObjectTemplate::new(&module_env(&ctx, "late"));
    tpl.set_promise("later", move |info| {
        let _ = go_rx.lock().unwrap().recv();
        info.post(1);
        let _ = done_tx.lock().unwrap().send(());
    });
    let obj = tpl.new_instance(&ctx).unwrap();
    let promise = ctx.dup_value(&call_method(&ctx, &obj, "later", &[]).unwrap());

    ctx.run_gc();
    assert!(!ctx.is_live(&obj));
    go_tx.send(()).unwrap();
    done_rx.recv_timeout(WAIT).unwrap();
    ctx.poll_jobs(Duration::from_millis(50));
    assert_eq!(ctx.promise_state(&promise), Some(PromiseState::Pending));
}

// ============================================================================
// CONSTRUCTORS
// ============================================================================

#[test]
fn test_async_prototype_method_on_constructed_instance() {
    init_tracing();
    let ctx = Context::new();
    let lamp = FunctionTemplate::new(&module_env(&ctx, "home"), "Lamp");
    lamp.prototype_template().set_promise("toggle", |info| {
        assert_eq!(info.template().function_name(), "Lamp");
        info.post("on")
    });
    let ctor = lamp.get_function(&ctx).unwrap();
    let a = ctx.call_constructor(&ctor, &[]).unwrap();
    let b = ctx.call_constructor(&ctor, &[]).unwrap();

    let pa = call_method(&ctx, &a, "toggle", &[]).unwrap();
    let pb = call_method(&ctx, &b, "toggle", &[]).unwrap();
    let settled = |p: &Value| ctx.promise_state(p) != Some(PromiseState::Pending);
    assert!(ctx.run_jobs_until(|| settled(&pa) && settled(&pb), WAIT));
    assert_eq!(ctx.promise_result(&pa), Value::from("on"));
    assert_eq!(ctx.promise_result(&pb), Value::from("on"));
}
