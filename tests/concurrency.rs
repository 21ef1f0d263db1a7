//=============================================
// tests/concurrency.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: Screen-variable sharing, deferred callbacks, and timers
//=============================================

use std::thread;
use std::time::{Duration, Instant};

use emberscript::{ScriptRuntime, Value};

#[test]
fn screen_variables_are_shared_across_evaluation_threads() {
    let mut runtime = ScriptRuntime::new();
    runtime
        .execute_source(
            "screen board { var total: int = 0; }\
             function post(name: string, n: int) { screen.set(\"board\", name, n); }",
            None,
        )
        .expect("execution");

    let mut workers = Vec::new();
    for t in 0..4 {
        let handle = runtime.handle();
        workers.push(thread::spawn(move || {
            let mut interp = handle.interpreter();
            for i in 0..25 {
                interp
                    .invoke(
                        "post",
                        vec![
                            Value::Str(format!("slot_{}_{}", t, i)),
                            Value::Int(i),
                        ],
                    )
                    .expect("post");
            }
        }));
    }
    for worker in workers {
        worker.join().expect("worker");
    }

    // 100 posts plus the declared `total` slot.
    let mut count = 0;
    for t in 0..4 {
        for i in 0..25 {
            if runtime
                .get_variable("board", &format!("slot_{}_{}", t, i))
                .is_some()
            {
                count += 1;
            }
        }
    }
    assert_eq!(count, 100);
    runtime.shutdown();
}

#[test]
fn run_later_preserves_per_thread_fifo_order() {
    let mut runtime = ScriptRuntime::new();
    runtime
        .execute_source(
            "screen main { var log: string = \"\"; }\
             function mark_a() { screen.set(\"main\", \"log\", screen.get(\"main\", \"log\") + \"a\"); }\
             function mark_b() { screen.set(\"main\", \"log\", screen.get(\"main\", \"log\") + \"b\"); }\
             function mark_c() { screen.set(\"main\", \"log\", screen.get(\"main\", \"log\") + \"c\"); }\
             function schedule() {\
                 thread.runlater(\"mark_a\");\
                 thread.runlater(\"mark_b\");\
                 thread.runlater(\"mark_c\");\
             }",
            None,
        )
        .expect("execution");

    runtime.invoke("schedule", vec![]).expect("schedule");
    assert!(runtime.wait_idle(Duration::from_secs(2)));
    assert_eq!(
        runtime.get_variable("main", "log"),
        Some(Value::Str("abc".into()))
    );
    runtime.shutdown();
}

#[test]
fn callbacks_run_under_the_screen_context_they_were_scheduled_from() {
    let mut runtime = ScriptRuntime::new();
    runtime
        .execute_source(
            "screen alpha { var log: string = \"\"; }\
             screen beta { var log: string = \"\"; }\
             function tag() {\
                 var here: string = screen.current();\
                 screen.set(here, \"log\", screen.get(here, \"log\") + here);\
             }\
             function schedule_tags() {\
                 thread.runlater(\"tag\");\
                 thread.runlater(\"tag\");\
             }",
            None,
        )
        .expect("execution");

    let mut workers = Vec::new();
    for name in ["alpha", "beta"] {
        let handle = runtime.handle();
        workers.push(thread::spawn(move || {
            let mut interp = handle.interpreter();
            interp.set_current_screen(Some(name.to_string()));
            interp.invoke("schedule_tags", vec![]).expect("schedule");
        }));
    }
    for worker in workers {
        worker.join().expect("worker");
    }

    assert!(runtime.wait_idle(Duration::from_secs(2)));
    // Each callback touched only its own screen's state.
    assert_eq!(
        runtime.get_variable("alpha", "log"),
        Some(Value::Str("alphaalpha".into()))
    );
    assert_eq!(
        runtime.get_variable("beta", "log"),
        Some(Value::Str("betabeta".into()))
    );
    runtime.shutdown();
}

#[test]
fn stopped_timers_never_fire_again() {
    let mut runtime = ScriptRuntime::new();
    runtime
        .execute_source(
            "screen main { var ticks: int = 0; }\
             function on_tick() { screen.set(\"main\", \"ticks\", screen.get(\"main\", \"ticks\") + 1); }\
             thread.timerstart(\"pulse\", 25, \"on_tick\");",
            None,
        )
        .expect("execution");

    thread::sleep(Duration::from_millis(120));
    let stopped = runtime
        .execute_source("return thread.timerstop(\"pulse\");", None)
        .expect("stop");
    assert_eq!(stopped, Some(Value::Bool(true)));
    assert!(runtime.wait_idle(Duration::from_secs(2)));

    let fired = match runtime.get_variable("main", "ticks") {
        Some(Value::Int(n)) => n,
        other => panic!("expected tick count, got {:?}", other),
    };
    assert!(fired >= 1, "timer should have fired at least once");

    // Long past another period; the registration removal must hold.
    thread::sleep(Duration::from_millis(100));
    assert!(runtime.wait_idle(Duration::from_secs(1)));
    assert_eq!(
        runtime.get_variable("main", "ticks"),
        Some(Value::Int(fired))
    );

    let running = runtime
        .execute_source("return thread.timerisrunning(\"pulse\");", None)
        .expect("query");
    assert_eq!(running, Some(Value::Bool(false)));
    runtime.shutdown();
}

#[test]
fn sleeping_one_context_does_not_block_another() {
    let mut runtime = ScriptRuntime::new();
    runtime
        .execute_source(
            "function slow() { system.sleep(800); return 1; }\
             function quick() { return 2; }",
            None,
        )
        .expect("execution");

    let sleeper = {
        let handle = runtime.handle();
        thread::spawn(move || handle.interpreter().invoke("slow", vec![]).expect("slow"))
    };

    // Give the sleeper a head start, then prove the other context runs.
    thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    let quick = runtime.invoke("quick", vec![]).expect("quick");
    let elapsed = started.elapsed();
    assert_eq!(quick, Value::Int(2));
    assert!(
        elapsed < Duration::from_millis(400),
        "quick call was blocked for {:?}",
        elapsed
    );

    assert_eq!(sleeper.join().expect("sleeper"), Value::Int(1));
    runtime.shutdown();
}

#[test]
fn function_refs_schedule_callbacks_too() {
    let mut runtime = ScriptRuntime::new();
    runtime
        .execute_source(
            "screen main { var hits: int = 0; }\
             function bump() { screen.set(\"main\", \"hits\", screen.get(\"main\", \"hits\") + 1); }\
             var cb = \"bump\";\
             thread.runlater(cb);",
            None,
        )
        .expect("execution");
    assert!(runtime.wait_idle(Duration::from_secs(2)));
    assert_eq!(runtime.get_variable("main", "hits"), Some(Value::Int(1)));
    runtime.shutdown();
}
