mod common;

use common::Workspace;
use logsift::chunk::chunk_count;
use logsift::pipeline::LogAnalyzer;

#[test]
fn no_chunk_is_lost_or_duplicated_for_any_worker_count() {
    let ws = Workspace::new();
    let sizes = [0usize, 1, 17, 64, 129];
    for (i, size) in sizes.iter().enumerate() {
        ws.write_numbered(&format!("f{i}.log"), *size);
    }
    let lines: usize = sizes.iter().sum();
    let chunks: u64 = sizes.iter().map(|s| chunk_count(*s as u64, 8)).sum();

    let mut baseline = None;
    for workers in 1..=8 {
        let outcome = LogAnalyzer::new(ws.config(workers, 8))
            .expect("analyzer")
            .analyze()
            .expect("analyze");
        let agg = outcome.aggregate;
        assert_eq!(outcome.producer.chunks_emitted, chunks, "workers={workers}");
        assert_eq!(agg.chunks_total, chunks, "workers={workers}");
        assert_eq!(agg.lines_total(), lines as u64, "workers={workers}");

        // aggregate is independent of scheduling
        let mut totals = agg.totals.clone();
        totals.errors.clear();
        match &baseline {
            None => baseline = Some(totals),
            Some(expected) => assert_eq!(&totals, expected, "workers={workers}"),
        }
    }
}

#[test]
fn more_workers_than_chunks() {
    let ws = Workspace::new();
    ws.write_numbered("tiny.log", 3);

    let outcome = LogAnalyzer::new(ws.config(8, 300))
        .expect("analyzer")
        .analyze()
        .expect("analyze");
    assert_eq!(outcome.aggregate.chunks_total, 1);
    assert_eq!(outcome.aggregate.lines_total(), 3);
}
