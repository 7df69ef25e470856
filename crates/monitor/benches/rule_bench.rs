//! 규칙 평가 벤치마크
//!
//! 단일 규칙 평가와 규칙 수에 따른 라인 처리량을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use logtally_core::config::StartPosition;
use logtally_monitor::{FileMonitor, Rule};

const ERROR_LINE: &str = "Jan 15 12:00:00 web-01 app[1234]: ERROR: connection refused by 10.0.0.5";
const INFO_LINE: &str = "Jan 15 12:00:00 web-01 app[1234]: INFO: request served in 12ms";

fn bench_single_rule(c: &mut Criterion) {
    let plain = Rule::new("ERROR", vec!["errors".to_owned()], vec![], false).unwrap();
    let captured = Rule::new(
        r"ERROR:\s*(.*) by (\S+)$",
        vec!["errors".to_owned()],
        vec!["errors".to_owned()],
        false,
    )
    .unwrap();

    let mut group = c.benchmark_group("rule_evaluate");
    group.throughput(Throughput::Elements(1));

    group.bench_function("plain_match", |b| {
        b.iter(|| plain.evaluate(black_box(ERROR_LINE)))
    });
    group.bench_function("plain_miss", |b| {
        b.iter(|| plain.evaluate(black_box(INFO_LINE)))
    });
    group.bench_function("capture_groups", |b| {
        b.iter(|| captured.evaluate(black_box(ERROR_LINE)))
    });

    group.finish();
}

fn bench_rule_scaling(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("line_read_scaling");

    for rule_count in [1usize, 10, 50] {
        let monitor = FileMonitor::new("bench", "/nonexistent.log", 8192, StartPosition::End)
            .unwrap();
        runtime.block_on(async {
            for i in 0..rule_count {
                let rule = Rule::new(
                    &format!(r"code={i}\b"),
                    vec![format!("c{i}")],
                    vec![],
                    false,
                )
                .unwrap();
                monitor.push_rule(rule).await;
            }
        });

        group.throughput(Throughput::Elements(100));
        group.bench_with_input(
            BenchmarkId::from_parameter(rule_count),
            &rule_count,
            |b, _| {
                b.iter(|| {
                    runtime.block_on(async {
                        for _ in 0..100 {
                            monitor.line_read(black_box("request code=0 served")).await;
                        }
                    })
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_single_rule, bench_rule_scaling);
criterion_main!(benches);
