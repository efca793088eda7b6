mod common;

use common::Workspace;
use logsift::pipeline::LogAnalyzer;

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[test]
#[ignore = "large input; run with --ignored"]
fn many_files_many_workers() {
    let files = env_usize("LOGSIFT_STRESS_FILES", 40);
    let lines = env_usize("LOGSIFT_STRESS_LINES", 25_000);
    let workers = env_usize("LOGSIFT_STRESS_WORKERS", 16);

    let ws = Workspace::new();
    for i in 0..files {
        ws.write_numbered(&format!("part-{i:03}.log"), lines);
    }

    let outcome = LogAnalyzer::new(ws.config(workers, 300))
        .expect("analyzer")
        .analyze()
        .expect("analyze");
    assert_eq!(outcome.aggregate.lines_total(), (files * lines) as u64);
    assert_eq!(outcome.aggregate.chunks_failed, 0);
    assert_eq!(
        outcome.aggregate.chunks_total,
        outcome.producer.chunks_emitted
    );
}

#[test]
fn small_queue_under_long_file() {
    let ws = Workspace::new();
    ws.write_numbered("long.log", 10_000);

    let outcome = LogAnalyzer::new(ws.config(1, 1))
        .expect("analyzer")
        .analyze()
        .expect("analyze");
    assert_eq!(outcome.aggregate.chunks_total, 10_000);
    assert_eq!(outcome.aggregate.lines_total(), 10_000);
}
