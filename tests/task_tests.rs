//! Integration tests for exclusive and shared task handles.
//!
//! Covers argument/result round trips, context injection, imports, error
//! reconstruction, transfer lists, out-of-order completion, fork and kill.
//! Organized into module blocks per concern.

use std::time::{Duration, Instant};

use bytes::Bytes;
use offload::{
    registry, Completion, ContextMap, ContextValue, Error, ErrorObject, Task, TaskHandle,
};
use serde_json::{json, Value};

/// Registers the entry tasks and helpers every test relies on.
fn register_fixtures() {
    let registry = registry();

    registry.register_task("it-sum", |call| async move {
        let total: f64 = call.args().iter().filter_map(Value::as_f64).sum();
        Ok(json!(total))
    });
    registry.register_task("it-identity", |call| async move {
        Ok(call.into_args().into_iter().next().unwrap_or_default())
    });
    registry.register_task("it-delayed-sum", |call| async move {
        let ms = call.arg(0).and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        let a = call.arg(1).and_then(Value::as_i64).unwrap_or(0);
        let b = call.arg(2).and_then(Value::as_i64).unwrap_or(0);
        Ok(json!(a + b))
    });
    registry.register_task("it-throw", |_| async {
        Err(ErrorObject::new("Test error").with_property("code", json!("E_TEST")))
    });
    registry.register_task("it-reject-raw", |_| async {
        Err(ErrorObject::from_value(json!("Test error")))
    });
    registry.register_task("it-context", |call| async move {
        Ok(call.scope().snapshot())
    });
    registry.register_task("it-apply", |call| async move {
        let name = call.arg(0).and_then(Value::as_str).unwrap_or_default().to_string();
        let rest = call.args().get(1..).unwrap_or_default().to_vec();
        call.call(&name, &rest)
    });
    registry.register_task("it-byte-lengths", |call| async move {
        let lengths: Vec<usize> = call.transfer().iter().map(Bytes::len).collect();
        Ok(json!(lengths))
    });
    registry.register_task("it-repeat", |call| async move {
        let text = call.arg(0).and_then(Value::as_str).unwrap_or_default();
        Ok(json!(text.repeat(2)))
    });

    registry.register_function("it-double", |args| {
        let x = args
            .first()
            .and_then(Value::as_f64)
            .ok_or_else(|| ErrorObject::named("TypeError", "expected a number"))?;
        Ok(json!(x * 2.0))
    });
    registry.register_function("it-add", |args| {
        let a = args.first().and_then(Value::as_f64).unwrap_or(0.0);
        let b = args.get(1).and_then(Value::as_f64).unwrap_or(0.0);
        Ok(json!(a + b))
    });

    registry.register_module(
        "http://localhost:9876/js/sum.js",
        ContextMap::new().with("sum", ContextValue::function("it-add")),
    );
    registry.register_output_transfer("it-string-bytes", |value| {
        value
            .as_str()
            .map(|s| vec![Bytes::copy_from_slice(s.as_bytes())])
            .unwrap_or_default()
    });
}

// ─── Round Trip Tests ───────────────────────────────────────────────────────

mod round_trip_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_exclusive_identity_returns_argument_unchanged() {
        register_fixtures();
        let task = Task::builder("it-identity").exclusive().unwrap();
        let arg = json!({"a": [1, 2.5, "x", null, true], "b": {"c": "d"}});

        assert_eq!(task.run(vec![arg.clone()]).await.unwrap(), arg);
        task.kill();
    }

    #[tokio::test]
    async fn test_sum_on_both_strategies() {
        register_fixtures();
        let exclusive = Task::builder("it-sum").exclusive().unwrap();
        let shared = Task::builder("it-sum").shared().unwrap();
        let args = vec![json!(1), json!(2)];

        assert_eq!(exclusive.run(args.clone()).await.unwrap(), json!(3.0));
        assert_eq!(shared.run(args).await.unwrap(), json!(3.0));
        exclusive.kill();
        shared.kill();
    }

    #[tokio::test]
    async fn test_async_entry_resolves_after_delay() {
        register_fixtures();
        let task = Task::builder("it-delayed-sum").shared().unwrap();

        let started = Instant::now();
        let value = task
            .run(vec![json!(100), json!(1), json!(2)])
            .await
            .unwrap();
        assert_eq!(value, json!(3));
        assert!(started.elapsed() >= Duration::from_millis(100));
        task.kill();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_finite_floats_come_back_bit_exact(
            values in proptest::collection::vec(
                any::<f64>().prop_filter("finite", |f| f.is_finite()),
                1..32,
            ),
        ) {
            register_fixtures();
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let returned = runtime.block_on(async {
                let task = Task::builder("it-identity").exclusive().unwrap();
                let returned = task.run(vec![json!(values)]).await.unwrap();
                task.kill();
                returned
            });

            let returned: Vec<f64> = serde_json::from_value(returned).unwrap();
            prop_assert_eq!(returned, values);
        }
    }
}

// ─── Context Tests ──────────────────────────────────────────────────────────

mod context_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_every_value_kind_is_observable() {
        register_fixtures();
        let context = ContextMap::new()
            .with("c", true)
            .with("b", 5)
            .with("a", "a")
            .with("double", ContextValue::function("it-double"))
            .with("d", json!({"deep": "a"}));
        let task = Task::builder("it-context")
            .context(context)
            .exclusive()
            .unwrap();

        let observed = task.run(Vec::new()).await.unwrap();
        assert_eq!(
            observed,
            json!({
                "c": true,
                "b": 5,
                "a": "a",
                "double": {"function": "it-double"},
                "d": {"deep": "a"}
            })
        );
        task.kill();
    }

    #[tokio::test]
    async fn test_context_function_is_callable() {
        register_fixtures();
        let task = Task::builder("it-apply")
            .context(ContextMap::new().with("double", ContextValue::function("it-double")))
            .shared()
            .unwrap();

        assert_eq!(
            task.run(vec![json!("double"), json!(4)]).await.unwrap(),
            json!(8.0)
        );
        let err = task.run(vec![json!("double"), json!("x")]).await.unwrap_err();
        assert_eq!(err.as_execution().unwrap().name(), Some("TypeError"));
        task.kill();
    }

    #[tokio::test]
    async fn test_serializable_struct_becomes_object_binding() {
        #[derive(serde::Serialize)]
        struct Limits {
            max: u32,
            tags: Vec<&'static str>,
        }

        register_fixtures();
        let limits = Limits {
            max: 7,
            tags: vec!["x", "y"],
        };
        let task = Task::builder("it-context")
            .context(ContextMap::new().with("limits", ContextValue::from_serialize(&limits)))
            .exclusive()
            .unwrap();

        assert_eq!(
            task.run(Vec::new()).await.unwrap(),
            json!({"limits": {"max": 7, "tags": ["x", "y"]}})
        );
    }

    #[tokio::test]
    async fn test_large_unsigned_integers_read_back_unchanged() {
        register_fixtures();
        let task = Task::builder("it-context")
            .context(
                ContextMap::new()
                    .with("big", u64::MAX)
                    .with("big_json", json!(u64::MAX)),
            )
            .exclusive()
            .unwrap();

        let observed = task.run(Vec::new()).await.unwrap();
        assert_eq!(observed, json!({"big": u64::MAX, "big_json": u64::MAX}));
        assert_eq!(observed["big"].as_u64(), Some(u64::MAX));
        task.kill();
    }

    #[test]
    fn test_nested_non_finite_float_fails_at_build_time() {
        #[derive(serde::Serialize)]
        struct Bounds {
            low: f64,
            high: Vec<f64>,
        }

        register_fixtures();
        let bounds = Bounds {
            low: 0.0,
            high: vec![1.0, f64::NAN],
        };
        let err = Task::builder("it-context")
            .context(ContextMap::new().with("bounds", ContextValue::from_serialize(&bounds)))
            .exclusive()
            .unwrap_err();
        match err {
            Error::Serialization(err) => {
                assert_eq!(err.binding, "bounds");
                assert!(err.reason.contains("not a finite number"), "{}", err.reason);
            },
            other => panic!("expected a serialization error, got {other:?}"),
        }
    }

    #[test]
    fn test_unrepresentable_context_fails_at_build_time() {
        register_fixtures();
        let err = Task::builder("it-context")
            .context(ContextMap::new().with("ratio", f64::INFINITY))
            .shared()
            .unwrap_err();
        match err {
            Error::Serialization(err) => assert_eq!(err.binding, "ratio"),
            other => panic!("expected a serialization error, got {other:?}"),
        }

        let err = Task::builder("it-context")
            .context(ContextMap::new().with("f", ContextValue::function("it-not-registered")))
            .exclusive()
            .unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}

// ─── Import Tests ───────────────────────────────────────────────────────────

mod import_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_relative_import_resolves_against_root_path() {
        register_fixtures();
        let task = Task::builder("it-apply")
            .import("/js/sum.js")
            .root_path("http://localhost:9876")
            .shared()
            .unwrap();

        assert_eq!(
            task.run(vec![json!("sum"), json!(1), json!(2)]).await.unwrap(),
            json!(3.0)
        );
        assert!(task
            .program()
            .text()
            .contains("http://localhost:9876/js/sum.js"));
        task.kill();
    }

    #[tokio::test]
    async fn test_unknown_import_rejects_every_call() {
        register_fixtures();
        let task = Task::builder("it-sum")
            .import("https://cdn.invalid/missing.js")
            .shared()
            .unwrap();

        for _ in 0..2 {
            let err = task.run(vec![json!(1)]).await.unwrap_err();
            let error = err.as_execution().unwrap();
            assert_eq!(error.name(), Some("StartupError"));
            assert!(error.message().unwrap().contains("missing.js"));
        }
        task.kill();
    }
}

// ─── Error Tests ────────────────────────────────────────────────────────────

mod error_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_thrown_error_keeps_its_properties() {
        register_fixtures();
        for task in [
            Box::new(Task::builder("it-throw").exclusive().unwrap()) as Box<dyn TaskHandle>,
            Box::new(Task::builder("it-throw").shared().unwrap()),
        ] {
            let err = task.run(Vec::new()).await.unwrap_err();
            let error = err.as_execution().unwrap();
            assert_eq!(error.message(), Some("Test error"));
            assert_eq!(error.get("code"), Some(&json!("E_TEST")));
            task.kill();
        }
    }

    #[tokio::test]
    async fn test_raw_rejection_value_round_trips() {
        register_fixtures();
        let task = Task::builder("it-reject-raw").exclusive().unwrap();

        let err = task.run(Vec::new()).await.unwrap_err();
        let error = err.as_execution().unwrap();
        assert_eq!(error.as_value(), &json!("Test error"));
        assert_eq!(error.message(), Some("Test error"));
    }

    #[tokio::test]
    async fn test_shared_context_survives_a_failed_call() {
        register_fixtures();
        let task = Task::builder("it-apply")
            .context(ContextMap::new().with("double", ContextValue::function("it-double")))
            .shared()
            .unwrap();

        assert!(task.run(vec![json!("nope")]).await.is_err());
        assert_eq!(
            task.run(vec![json!("double"), json!(1)]).await.unwrap(),
            json!(2.0)
        );
        task.kill();
    }
}

// ─── Concurrency Tests ──────────────────────────────────────────────────────

mod concurrency_tests {
    use super::*;
    use futures::future::join_all;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_timed_calls_complete_out_of_order() {
        register_fixtures();
        let task = Task::builder("it-delayed-sum").shared().unwrap();

        let order = parking_lot::Mutex::new(Vec::new());
        let slow = async {
            let value = task.run(vec![json!(300), json!(1), json!(1)]).await.unwrap();
            order.lock().push("slow");
            value
        };
        let fast = async {
            let value = task.run(vec![json!(20), json!(2), json!(2)]).await.unwrap();
            order.lock().push("fast");
            value
        };
        let (slow, fast) = tokio::join!(slow, fast);

        assert_eq!(slow, json!(2));
        assert_eq!(fast, json!(4));
        assert_eq!(*order.lock(), vec!["fast", "slow"]);
        task.kill();
    }

    #[tokio::test]
    async fn test_concurrent_calls_match_their_arguments() {
        register_fixtures();
        let task = Task::builder("it-delayed-sum").shared().unwrap();

        let calls = (0..32i64).map(|i| {
            let delay = (32 - i) as u64 * 3;
            task.run(vec![json!(delay), json!(i), json!(i)])
        });
        let results = join_all(calls).await;

        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap(), json!(i as i64 * 2));
        }
        assert_eq!(task.in_flight(), 0);
        task.kill();
    }

    #[tokio::test]
    async fn test_exclusive_calls_run_in_parallel() {
        register_fixtures();
        let task = Task::builder("it-delayed-sum").exclusive().unwrap();

        let started = Instant::now();
        let calls = (0..4).map(|_| task.run(vec![json!(200), json!(1), json!(1)]));
        for result in join_all(calls).await {
            assert_eq!(result.unwrap(), json!(2));
        }
        assert!(started.elapsed() < Duration::from_millis(800));
        task.kill();
    }
}

// ─── Transfer Tests ─────────────────────────────────────────────────────────

mod transfer_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_input_buffers_move_with_the_call() {
        register_fixtures();
        let task = Task::builder("it-byte-lengths")
            .input_transfer(|args| {
                args.iter()
                    .filter_map(Value::as_str)
                    .map(|s| Bytes::copy_from_slice(s.as_bytes()))
                    .collect()
            })
            .shared()
            .unwrap();

        assert_eq!(
            task.run(vec![json!("abc"), json!(1), json!("de")]).await.unwrap(),
            json!([3, 2])
        );
        task.kill();
    }

    #[tokio::test]
    async fn test_output_buffers_come_back_with_the_result() {
        register_fixtures();
        let task = Task::builder("it-repeat")
            .output_transfer("it-string-bytes")
            .exclusive()
            .unwrap();

        let Completion { value, transfer } =
            task.run_with_transfer(vec![json!("ab")]).await.unwrap();
        assert_eq!(value, json!("abab"));
        assert_eq!(transfer, vec![Bytes::from_static(b"abab")]);
    }

    #[test]
    fn test_unregistered_output_selector_fails_at_build_time() {
        register_fixtures();
        let err = Task::builder("it-repeat")
            .output_transfer("it-no-such-selector")
            .shared()
            .unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}

// ─── Lifecycle Tests ────────────────────────────────────────────────────────

mod lifecycle_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_fork_reuses_program_text() {
        register_fixtures();
        let task = Task::builder("it-sum")
            .context(ContextMap::new().with("base", 1))
            .shared()
            .unwrap();
        let forked = task.fork().unwrap();

        assert_eq!(task.program().text(), forked.program().text());
        task.kill();
        assert!(matches!(task.run(vec![json!(1)]).await, Err(Error::Killed)));
        assert_eq!(forked.run(vec![json!(1), json!(1)]).await.unwrap(), json!(2.0));
        forked.kill();
    }

    #[tokio::test]
    async fn test_exclusive_kill_then_fork() {
        register_fixtures();
        let task = Task::builder("it-identity").exclusive().unwrap();
        task.kill();
        task.kill();
        assert!(matches!(task.run(vec![json!(1)]).await, Err(Error::Killed)));

        let forked = task.fork().unwrap();
        assert_eq!(forked.run(vec![json!(1)]).await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_killing_a_shared_task_rejects_in_flight_calls() {
        register_fixtures();
        let task = std::sync::Arc::new(Task::builder("it-delayed-sum").shared().unwrap());

        let pending = tokio::spawn({
            let task = task.clone();
            async move { task.run(vec![json!(60_000), json!(1), json!(1)]).await }
        });
        while task.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        task.kill();

        let outcome = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, Err(Error::Terminated)));
    }
}
