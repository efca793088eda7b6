use std::fs::File;
use std::io::{BufWriter, Write};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use logsift::config::AnalyzerConfig;
use logsift::pipeline::LogAnalyzer;

fn write_log(path: &std::path::Path, lines: usize) {
    let mut out = BufWriter::new(File::create(path).expect("create log"));
    for i in 0..lines {
        let level = ["INFO", "WARNING", "ERROR"][i % 3];
        writeln!(
            out,
            "2025-06-{:02} 12:00:00 [{level}] 192.168.{}.{} request {i} served",
            i % 28 + 1,
            i % 7,
            i % 200
        )
        .expect("write line");
    }
    out.flush().expect("flush");
}

fn bench_workers(c: &mut Criterion) {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let logs = temp_dir.path().join("logs");
    std::fs::create_dir(&logs).expect("logs dir");
    for i in 0..4 {
        write_log(&logs.join(format!("app-{i}.log")), 50_000);
    }

    let mut group = c.benchmark_group("analyze");
    group.sample_size(10);
    for workers in [1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &n| {
            b.iter(|| {
                let mut cfg = AnalyzerConfig::for_dir(&logs);
                cfg.run_id = "bench".to_string();
                cfg.info_dir = temp_dir.path().join("info");
                cfg.workers = n;
                let outcome = LogAnalyzer::new(cfg)
                    .expect("analyzer")
                    .analyze()
                    .expect("analyze");
                assert_eq!(outcome.aggregate.lines_total(), 200_000);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_workers);
criterion_main!(benches);
