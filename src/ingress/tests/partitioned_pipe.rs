//! Partitioned state machine: per-key clocks, the inverted watermark index,
//! and the global low watermark.

use ingress::{
    CollectedOutput, CollectingDiagnostics, CollectingObserver, DisorderPolicy, EventBatch,
    FlushPolicy, IngressConfig, IngressError, LowWatermarkPolicy, OnCompletedPolicy,
    OutOfOrderEvent, PartitionedIngressPipe, PartitionedStreamEvent, PunctuationPolicy,
    StreamEvent, INFINITY_SYNC_TIME,
};
use std::sync::{Arc, Mutex};

type Key = &'static str;
type Collected = Arc<Mutex<CollectedOutput<Key, u64>>>;
type Reports = Arc<Mutex<Vec<OutOfOrderEvent<PartitionedStreamEvent<Key, u64>>>>>;

fn pipe_with(
    config: IngressConfig,
) -> (PartitionedIngressPipe<Key, u64>, Collected, Reports) {
    let observer = CollectingObserver::new();
    let collected = observer.handle();
    let diagnostics = CollectingDiagnostics::new();
    let reports = diagnostics.handle();
    let pipe = PartitionedIngressPipe::new(config, Box::new(observer), Box::new(diagnostics))
        .expect("valid config");
    (pipe, collected, reports)
}

fn base_config(disorder: DisorderPolicy) -> IngressConfig {
    IngressConfig {
        disorder,
        flush: FlushPolicy::OnBatchBoundary,
        punctuation: PunctuationPolicy::None,
        low_watermark: LowWatermarkPolicy::None,
        on_completed: OnCompletedPolicy::EndOfStream,
        batch_size: 1_024,
        ..IngressConfig::default()
    }
}

fn data(key: Key, sync_time: i64, payload: u64) -> PartitionedStreamEvent<Key, u64> {
    PartitionedStreamEvent::data(
        key,
        StreamEvent::interval(sync_time, sync_time + 50, payload).expect("valid interval"),
    )
}

/// `(key, sync_time)` of every data row, in batch order.
fn keyed_rows(batches: &[EventBatch<Key, u64>]) -> Vec<(Option<Key>, i64)> {
    let mut out = Vec::new();
    for batch in batches {
        for i in 0..batch.len() {
            if batch.payloads()[i].is_some() {
                out.push((batch.keys()[i], batch.sync_times()[i]));
            }
        }
    }
    out
}

/// `(key, time)` of every marker row (punctuation or low watermark).
fn markers(batches: &[EventBatch<Key, u64>]) -> Vec<(Option<Key>, i64)> {
    let mut out = Vec::new();
    for batch in batches {
        for i in 0..batch.len() {
            if batch.is_marker(i) {
                out.push((batch.keys()[i], batch.sync_times()[i]));
            }
        }
    }
    out
}

#[test]
fn partitions_keep_independent_clocks() {
    let (mut pipe, collected, reports) =
        pipe_with(base_config(DisorderPolicy::Adjust { reorder_latency: 0 }));
    pipe.enable().unwrap();
    pipe.on_next(data("a", 10, 0)).unwrap();
    // "b" is far behind "a" and must not be considered disordered.
    pipe.on_next(data("b", 3, 1)).unwrap();
    // A genuine regression inside "a" is adjusted against "a"'s clock only.
    pipe.on_next(data("a", 6, 2)).unwrap();
    pipe.on_next(data("b", 4, 3)).unwrap();
    pipe.on_completed().unwrap();

    assert_eq!(pipe.current_time(&"a"), Some(10));
    assert_eq!(pipe.current_time(&"b"), Some(4));

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].time_adjustment, Some(4));

    // Per-key rows are each non-decreasing.
    let rows = keyed_rows(&collected.lock().unwrap().batches);
    for key in ["a", "b"] {
        let times: Vec<i64> = rows
            .iter()
            .filter(|(k, _)| *k == Some(key))
            .map(|(_, t)| *t)
            .collect();
        assert!(
            times.windows(2).all(|pair| pair[0] <= pair[1]),
            "partition {key} regressed: {times:?}"
        );
    }
}

#[test]
fn disorder_in_one_partition_leaves_others_buffered() {
    let (mut pipe, _, _) =
        pipe_with(base_config(DisorderPolicy::Adjust { reorder_latency: 20 }));
    pipe.enable().unwrap();
    for t in [30, 12, 25, 18] {
        pipe.on_next(data("a", t, t as u64)).unwrap();
    }
    pipe.on_next(data("b", 100, 9)).unwrap();
    // "a" drained to 30 - 20 = 10: everything still buffered there; "b"
    // drained to 80.
    assert_eq!(pipe.buffered_len(), 4 + 1);
    assert_eq!(pipe.min_high_watermark(), Some(30));
    pipe.dispose();
    assert_eq!(pipe.pooled_leases(), 0);
}

#[test]
fn explicit_low_watermark_bounds_every_partition() {
    let (mut pipe, collected, reports) =
        pipe_with(base_config(DisorderPolicy::Drop { reorder_latency: 0 }));
    pipe.enable().unwrap();
    pipe.on_next(data("a", 10, 0)).unwrap();
    pipe.on_next(data("b", 80, 1)).unwrap();
    pipe.on_next(PartitionedStreamEvent::low_watermark(50)).unwrap();
    assert_eq!(pipe.low_watermark(), 50);
    // "a" was dragged up to the bound even though its own clock was at 10.
    assert_eq!(pipe.current_time(&"a"), Some(50));
    // Below the bound now: dropped, even for a never-seen partition.
    pipe.on_next(data("a", 30, 2)).unwrap();
    pipe.on_next(data("c", 49, 3)).unwrap();
    pipe.on_next(data("b", 90, 4)).unwrap();
    pipe.on_completed().unwrap();

    assert_eq!(reports.lock().unwrap().len(), 2);
    let collected = collected.lock().unwrap();
    assert!(markers(&collected.batches).contains(&(None, 50)));
    // Only a's original event predates the bound; everything later is >= 50.
    assert_eq!(
        keyed_rows(&collected.batches)
            .iter()
            .filter(|(_, t)| *t < 50)
            .count(),
        1
    );
}

#[test]
fn low_watermarks_generate_from_the_minimum_high_watermark() {
    let mut config = base_config(DisorderPolicy::Drop { reorder_latency: 0 });
    config.low_watermark = LowWatermarkPolicy::Time { period: 10, lag: 5 };
    let (mut pipe, collected, _) = pipe_with(config);
    pipe.enable().unwrap();

    // Single partition: min high watermark 20, lag 5, snapped to 10.
    pipe.on_next(data("a", 20, 0)).unwrap();
    assert_eq!(pipe.low_watermark(), 10);
    // "b" joins behind "a"; the minimum is now b's 12, candidate 7 < 10.
    pipe.on_next(data("b", 12, 1)).unwrap();
    assert_eq!(pipe.low_watermark(), 10);
    // "a" running ahead changes nothing while "b" holds the minimum back.
    pipe.on_next(data("a", 60, 2)).unwrap();
    assert_eq!(pipe.low_watermark(), 10);
    assert_eq!(pipe.min_high_watermark(), Some(12));
    // "b" catches up: minimum 33, candidate 28, boundary 20.
    pipe.on_next(data("b", 33, 3)).unwrap();
    assert_eq!(pipe.low_watermark(), 20);
    pipe.on_completed().unwrap();

    let collected = collected.lock().unwrap();
    let low_watermarks: Vec<i64> = markers(&collected.batches)
        .into_iter()
        .filter(|(key, _)| key.is_none())
        .map(|(_, t)| t)
        .collect();
    assert_eq!(low_watermarks, vec![10, 20, INFINITY_SYNC_TIME]);
}

#[test]
fn flush_on_low_watermark_seals_batches() {
    let mut config = base_config(DisorderPolicy::Drop { reorder_latency: 0 });
    config.flush = FlushPolicy::OnLowWatermark;
    let (mut pipe, collected, _) = pipe_with(config);
    pipe.enable().unwrap();
    pipe.on_next(data("a", 10, 0)).unwrap();
    pipe.on_next(PartitionedStreamEvent::low_watermark(40)).unwrap();
    pipe.on_next(data("a", 60, 1)).unwrap();
    pipe.on_next(PartitionedStreamEvent::low_watermark(80)).unwrap();
    {
        let collected = collected.lock().unwrap();
        assert_eq!(collected.batches.len(), 2);
        assert!(collected.batches.iter().all(|batch| batch.is_sealed()));
    }
    pipe.on_completed().unwrap();
}

#[test]
fn partition_punctuation_is_scoped_to_its_key() {
    let mut config = base_config(DisorderPolicy::Drop { reorder_latency: 10 });
    config.flush = FlushPolicy::OnPunctuation;
    let (mut pipe, collected, _) = pipe_with(config);
    pipe.enable().unwrap();
    pipe.on_next(data("a", 10, 0)).unwrap();
    pipe.on_next(data("b", 10, 1)).unwrap();
    // Punctuation for "a" releases a's buffered event; b's stays put.
    pipe.on_next(PartitionedStreamEvent::punctuation("a", 15)).unwrap();
    {
        let collected = collected.lock().unwrap();
        assert_eq!(collected.batches.len(), 1);
        assert_eq!(keyed_rows(&collected.batches), vec![(Some("a"), 10)]);
        assert_eq!(markers(&collected.batches), vec![(Some("a"), 15)]);
    }
    assert_eq!(pipe.current_time(&"a"), Some(15));
    assert_eq!(pipe.current_time(&"b"), None);
    pipe.on_completed().unwrap();
}

#[test]
fn completion_flush_drains_to_the_maximum_current_time() {
    let mut config = base_config(DisorderPolicy::Adjust { reorder_latency: 50 });
    config.on_completed = OnCompletedPolicy::Flush;
    let (mut pipe, collected, _) = pipe_with(config);
    pipe.enable().unwrap();
    // a@160 drags a's drain frontier to 110, releasing a@100; b@55 and a@160
    // stay inside the latency window.
    pipe.on_next(data("a", 100, 0)).unwrap();
    pipe.on_next(data("a", 160, 1)).unwrap();
    pipe.on_next(data("b", 55, 2)).unwrap();
    assert_eq!(pipe.current_time(&"a"), Some(100));
    pipe.on_completed().unwrap();

    let collected = collected.lock().unwrap();
    // max(current times) = 100 releases b's 55 but never a's 160.
    assert_eq!(
        keyed_rows(&collected.batches),
        vec![(Some("a"), 100), (Some("b"), 55)]
    );
    assert!(collected.completed);
}

#[test]
fn lifecycle_checks_match_the_unpartitioned_pipe() {
    let (mut pipe, _, _) = pipe_with(base_config(DisorderPolicy::Throw));
    assert_eq!(
        pipe.on_next(data("a", 1, 0)),
        Err(IngressError::NotEnabled)
    );
    pipe.enable().unwrap();
    assert_eq!(pipe.enable(), Err(IngressError::AlreadyEnabled));
    pipe.on_next(data("a", 1, 0)).unwrap();
    pipe.dispose();
    pipe.dispose();
    assert_eq!(pipe.on_next(data("a", 2, 1)), Err(IngressError::Disposed));
    assert_eq!(pipe.pooled_leases(), 0);
}
