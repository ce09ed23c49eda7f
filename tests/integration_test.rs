use deft::prelude::*;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn runtime(threads: usize) -> Runtime {
    Runtime::new(Config::builder().num_threads(threads).build().unwrap()).unwrap()
}

#[test]
fn test_spawn_and_wait() {
    let rt = runtime(2);
    let ran = Arc::new(Mutex::new(false));

    let observed = ran.clone();
    let task = rt.spawn(move || {
        *observed.lock() = true;
        Ok(())
    });

    assert!(task.wait().is_ok());
    assert!(*ran.lock());
}

#[test]
fn test_wait_after_success_is_immediate() {
    let rt = runtime(2);

    let task = rt.spawn(|| Ok(()));
    task.wait().unwrap();

    let start = Instant::now();
    task.wait().unwrap();
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn test_failure_surfaces_only_at_wait() {
    let rt = runtime(2);

    let task = rt.spawn(|| Err(TaskError::msg("boom")));

    let first = task.wait().unwrap_err();
    let second = task.wait().unwrap_err();
    assert_eq!(first.to_string(), "boom");
    assert_eq!(second.to_string(), "boom");
}

#[test]
fn test_spawned_panic_becomes_failure() {
    let rt = runtime(2);

    let task = rt.spawn(|| panic!("kaput"));

    let err = task.wait().unwrap_err();
    assert!(err.is_panic());
    assert!(err.to_string().contains("kaput"));
}

#[test]
fn test_first_completion_survives_a_late_one() {
    let rt = runtime(2);

    let task = rt.pending();
    task.complete_success();

    let late = task.clone();
    let attempt = thread::spawn(move || late.complete_failure(TaskError::msg("too late"))).join();

    assert!(attempt.is_err());
    assert!(task.wait().is_ok());
}

#[test]
fn test_join_all_empty_completes_immediately() {
    let rt = runtime(2);

    let joined = rt.join_all(Vec::new());
    assert!(joined.is_complete());
    assert!(joined.wait().is_ok());
}

#[test]
fn test_join_all_waits_for_every_input() {
    let rt = runtime(2);

    let t1 = rt.pending();
    let t2 = rt.pending();
    let t3 = rt.pending();
    let joined = rt.join_all(vec![t1.clone(), t2.clone(), t3.clone()]);

    assert!(!joined.is_complete());
    t1.complete_success();
    t2.complete_failure(TaskError::msg("one bad"));
    assert!(!joined.is_complete());

    t3.complete_success();
    // the joined task swallows individual failures...
    assert!(joined.wait().is_ok());
    // ...but each input's outcome stays observable
    assert!(t2.wait().is_err());
}

#[test]
fn test_iterate_runs_strictly_in_order() {
    let rt = Arc::new(runtime(2));
    let log: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));

    let tasks = {
        let rt = rt.clone();
        let log = log.clone();
        (0..4).map(move |i| {
            let log = log.clone();
            rt.spawn(move || {
                log.lock().push(i);
                Ok(())
            })
        })
    };

    rt.iterate(tasks).wait().unwrap();
    assert_eq!(*log.lock(), vec![0, 1, 2, 3]);
}

#[test]
fn test_iterate_halts_on_failure() {
    let rt = Arc::new(runtime(2));
    let attempted: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));

    let tasks = {
        let rt = rt.clone();
        let attempted = attempted.clone();
        (0..3).map(move |i| {
            let attempted = attempted.clone();
            rt.spawn(move || {
                attempted.lock().push(i);
                if i == 1 {
                    return Err(TaskError::msg("task one failed"));
                }
                Ok(())
            })
        })
    };

    let err = rt.iterate(tasks).wait().unwrap_err();
    assert_eq!(err.to_string(), "task one failed");

    // the third task is never pulled from the sequence
    thread::sleep(Duration::from_millis(50));
    assert_eq!(*attempted.lock(), vec![0, 1]);
}

#[test]
fn test_iterate_captures_a_panicking_pull() {
    let rt = Arc::new(runtime(2));

    let tasks = {
        let rt = rt.clone();
        (0..3).map(move |i| {
            if i == 1 {
                panic!("sequence exploded");
            }
            rt.spawn(|| Ok(()))
        })
    };

    let err = rt.iterate(tasks).wait().unwrap_err();
    assert!(err.is_panic());
}

#[test]
fn test_delay_zero_is_immediate() {
    let rt = runtime(2);

    let task = rt.delay(Duration::ZERO);
    assert!(task.is_complete());

    let start = Instant::now();
    task.wait().unwrap();
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn test_delay_takes_at_least_its_duration() {
    let rt = runtime(2);

    let start = Instant::now();
    rt.delay(Duration::from_millis(50)).wait().unwrap();
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[test]
fn test_value_chain_doubles() {
    let rt = runtime(2);

    let answer = rt.spawn_value(|| Ok(21)).continue_with(|n| Ok(n * 2));
    assert_eq!(answer.wait().unwrap(), 42);
}

#[test]
fn test_value_failure_skips_the_callback() {
    let rt = runtime(2);

    let chained = rt
        .spawn_value::<i32, _>(|| Err(TaskError::msg("nope")))
        .continue_with(|n| Ok(n + 1));

    assert_eq!(chained.wait().unwrap_err().to_string(), "nope");
}

#[test]
fn test_prebuilt_value_tasks() {
    let rt = runtime(2);

    assert_eq!(rt.value(7).wait().unwrap(), 7);
    assert!(rt.value_err::<i32>(TaskError::msg("bad")).wait().is_err());
}

#[test]
fn test_continue_with_task_flattens() {
    let rt = Arc::new(runtime(2));

    let first = rt.spawn(|| Ok(()));
    let inner_rt = rt.clone();
    let chained =
        first.continue_with_task(move || Ok(inner_rt.delay(Duration::from_millis(10))));
    assert!(chained.wait().is_ok());
}

#[test]
fn test_continue_with_task_forwards_inner_failure() {
    let rt = Arc::new(runtime(2));

    let first = rt.spawn(|| Ok(()));
    let inner_rt = rt.clone();
    let chained = first
        .continue_with_task(move || Ok(inner_rt.spawn(|| Err(TaskError::msg("inner broke")))));

    assert_eq!(chained.wait().unwrap_err().to_string(), "inner broke");
}

#[derive(Debug)]
struct Locale(&'static str);

#[test]
fn test_ambient_context_crosses_a_spawn() {
    let rt = runtime(2);
    let seen: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let ctx = AmbientContext::capture().with_value(Locale("fr-FR"));
    let observed = seen.clone();
    let task = ctx.run(|| {
        rt.spawn(move || {
            *observed.lock() = deft::context::get::<Locale>().map(|l| l.0.to_string());
            Ok(())
        })
    });

    task.wait().unwrap();
    assert_eq!(seen.lock().as_deref(), Some("fr-FR"));
}

#[test]
fn test_ambient_context_captured_at_registration() {
    let rt = runtime(2);
    let seen: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let pending = rt.pending();
    let ctx = AmbientContext::capture().with_value(Locale("ja-JP"));
    let observed = seen.clone();
    let chained = ctx.run(|| {
        pending.continue_with(move || {
            *observed.lock() = deft::context::get::<Locale>().map(|l| l.0.to_string());
            Ok(())
        })
    });

    // completion happens outside the context scope
    pending.complete_success();
    chained.wait().unwrap();
    assert_eq!(seen.lock().as_deref(), Some("ja-JP"));
}

#[test]
fn test_work_spreads_over_a_fixed_thread_set() {
    let rt = Arc::new(runtime(3));
    let ids: Arc<Mutex<HashSet<thread::ThreadId>>> = Arc::new(Mutex::new(HashSet::new()));

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let ids = ids.clone();
            rt.spawn(move || {
                ids.lock().insert(thread::current().id());
                thread::sleep(Duration::from_millis(1));
                Ok(())
            })
        })
        .collect();

    rt.join_all(tasks).wait().unwrap();

    let distinct = ids.lock().len();
    assert!(distinct >= 1 && distinct <= 3);
    assert_eq!(rt.num_threads(), 3);
}

#[test]
fn test_single_worker_preserves_submission_order() {
    let rt = runtime(1);
    let log: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let log = log.clone();
            rt.spawn(move || {
                log.lock().push(i);
                Ok(())
            })
        })
        .collect();

    rt.join_all(tasks).wait().unwrap();
    assert_eq!(*log.lock(), (0..8).collect::<Vec<_>>());
}

#[test]
fn test_pool_survives_a_raw_panicking_item() {
    let rt = runtime(1);

    rt.submit(|| panic!("raw item"));

    // the single worker must still be alive to run this
    assert!(rt.spawn(|| Ok(())).wait().is_ok());
    assert!(rt.metrics().items_panicked >= 1);
}

#[test]
fn test_tasks_can_be_awaited() {
    let rt = runtime(2);

    futures::executor::block_on(async {
        rt.delay(Duration::from_millis(10)).await.unwrap();

        let value = rt.spawn_value(|| Ok(5)).await.unwrap();
        assert_eq!(value, 5);

        let err = rt.spawn(|| Err(TaskError::msg("async boom"))).await;
        assert_eq!(err.unwrap_err().to_string(), "async boom");
    });
}
