//! End-to-end scenarios driving the coordinator with the simulated
//! serialized processor under virtual time.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use microbatch::{
    BatchCoordinator, CoordinatorConfig, MicrobatchError, RecordingProcessor, SimulatedProcessor,
    WorkItem,
};

fn simulated_coordinator(config: CoordinatorConfig, latency_ms: u64) -> BatchCoordinator {
    BatchCoordinator::new(
        Arc::new(SimulatedProcessor::new(latency_ms)),
        config,
        CancellationToken::new(),
    )
}

#[test_log::test(tokio::test(start_paused = true))]
async fn single_item_completes_after_one_tick_and_one_compute_latency() {
    let coordinator = simulated_coordinator(CoordinatorConfig::default(), 1000);

    let start = tokio::time::Instant::now();
    let result = coordinator
        .process(WorkItem {
            id: 1,
            input: "SingleTest".to_string(),
        })
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(result.id, 1);
    assert_eq!(result.output, "Processed_SingleTest");
    // One 200ms tick to flush plus one fixed compute latency
    assert!(elapsed >= Duration::from_millis(1000));
    assert!(elapsed < Duration::from_millis(2000), "took {elapsed:?}");
}

#[test_log::test(tokio::test(start_paused = true))]
async fn four_concurrent_items_complete_within_one_compute_latency() {
    let coordinator = simulated_coordinator(CoordinatorConfig::default(), 1000);

    let start = tokio::time::Instant::now();
    let handles: Vec<_> = (1..=4)
        .map(|id| {
            coordinator
                .submit(WorkItem {
                    id,
                    input: format!("Input_{id}"),
                })
                .unwrap()
        })
        .collect();

    let results = join_all(
        handles
            .into_iter()
            .map(|handle| handle.wait(Duration::from_secs(2))),
    )
    .await;
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    for (i, result) in results.into_iter().enumerate() {
        let result = result.unwrap();
        assert_eq!(result.id, i as i64 + 1);
        assert_eq!(result.output, format!("Processed_Input_{}", i + 1));
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn eight_concurrent_items_complete_as_two_serialized_batches() {
    let config = CoordinatorConfig {
        // Generous caller deadline; this scenario asserts batching and total
        // latency, not timeouts
        request_timeout_ms: 5000,
        ..Default::default()
    };
    let coordinator = simulated_coordinator(config, 1000);

    let start = tokio::time::Instant::now();
    let items: Vec<WorkItem> = (1..=8)
        .map(|id| WorkItem {
            id,
            input: format!("Batch_{id}"),
        })
        .collect();
    let results = join_all(items.into_iter().map(|item| coordinator.process(item))).await;
    let elapsed = start.elapsed();

    // Two batches of four through one exclusive compute resource: roughly
    // two fixed latencies, not one and not eight
    assert!(elapsed >= Duration::from_millis(2000));
    assert!(elapsed < Duration::from_millis(2500), "took {elapsed:?}");

    for (i, result) in results.into_iter().enumerate() {
        let result = result.unwrap();
        assert_eq!(result.id, i as i64 + 1);
        assert_eq!(result.output, format!("Processed_Batch_{}", i + 1));
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn overload_times_out_every_caller_behind_the_serialized_backlog() {
    // Five batches of four at one second each, against a deadline between the
    // first and second batch completion: only the batch that acquires the
    // compute lock first can make it.
    let config = CoordinatorConfig {
        request_timeout_ms: 1500,
        ..Default::default()
    };
    let coordinator = simulated_coordinator(config, 1000);

    let handles: Vec<_> = (0..20)
        .map(|id| {
            coordinator
                .submit(WorkItem {
                    id,
                    input: format!("Timeout_Test_{id}"),
                })
                .unwrap()
        })
        .collect();

    let outcomes = join_all(
        handles
            .into_iter()
            .map(|handle| handle.wait(Duration::from_millis(1500))),
    )
    .await;

    let mut ok = 0usize;
    let mut timed_out = 0usize;
    for (id, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(result) => {
                // Whichever batch won the compute lock, each result matches
                // its own item
                assert_eq!(result.id, id as i64);
                assert_eq!(result.output, format!("Processed_Timeout_Test_{id}"));
                ok += 1;
            }
            Err(MicrobatchError::Timeout(timed_out_id)) => {
                assert_eq!(timed_out_id, id as i64);
                timed_out += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    // Exactly one batch completes inside the deadline; the other sixteen
    // callers are stuck behind the serialized backlog
    assert_eq!(ok, 4);
    assert_eq!(timed_out, 16);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn compute_latency_beyond_the_deadline_times_out_every_caller() {
    let config = CoordinatorConfig {
        request_timeout_ms: 2000,
        ..Default::default()
    };
    let coordinator = simulated_coordinator(config, 3000);

    let items: Vec<WorkItem> = (0..20)
        .map(|id| WorkItem {
            id,
            input: format!("Timeout_Test_{id}"),
        })
        .collect();
    let outcomes = join_all(items.into_iter().map(|item| coordinator.process(item))).await;

    for (id, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Err(MicrobatchError::Timeout(timed_out_id)) => assert_eq!(timed_out_id, id as i64),
            other => panic!("expected timeout for item {id}, got {other:?}"),
        }
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn every_submitted_item_reaches_the_processor_despite_timeouts() {
    // Callers time out almost immediately, yet all five batches still run to
    // completion with their full membership.
    let config = CoordinatorConfig {
        request_timeout_ms: 100,
        ..Default::default()
    };
    let processor = Arc::new(RecordingProcessor::new());
    let triggers: Vec<_> = (0..5).map(|_| processor.hold_next()).collect();
    let coordinator =
        BatchCoordinator::new(processor.clone(), config, CancellationToken::new());

    let outcomes = join_all((0..20).map(|id| {
        coordinator.process(WorkItem {
            id,
            input: format!("Load_{id}"),
        })
    }))
    .await;
    for outcome in outcomes {
        assert!(matches!(outcome, Err(MicrobatchError::Timeout(_))));
    }

    for trigger in triggers {
        let _ = trigger.send(());
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(processor.batch_sizes(), vec![4, 4, 4, 4, 4]);
    // Batches may run in any order relative to one another; membership is
    // what must be complete and disjoint
    let mut seen: Vec<i64> = processor
        .calls()
        .iter()
        .flatten()
        .map(|item| item.id)
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..20).collect::<Vec<i64>>());
    assert_eq!(processor.in_flight_count(), 0);
}
