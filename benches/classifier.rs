// Classifier and sanitizer throughput (Criterion)
//
// Every gateway call classifies its command and hashes it for logging,
// so both sit on the hot path.
//
// Usage:
//   cargo bench --bench classifier

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nodeconsole_gateway::safety::{PolicyMode, RemoteCommandClassifier};
use nodeconsole_gateway::sanitize::LogSanitizer;
use std::hint::black_box;

const COMMANDS: &[(&str, &str)] = &[
    ("read_only", "ps aux 2>&1 | grep java | head -20"),
    ("side_effect", "systemctl restart nginx && systemctl status nginx"),
    ("destructive", "cd /srv && sudo rm -rf ./releases/old"),
    ("kubectl", "kubectl -n prod get pods -o wide"),
];

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");

    for (name, command) in COMMANDS {
        group.bench_with_input(BenchmarkId::from_parameter(name), command, |b, command| {
            b.iter(|| RemoteCommandClassifier::classify(black_box(command), PolicyMode::Standard));
        });
    }

    let long = "cat /var/log/syslog | grep error; ".repeat(200);
    group.bench_function("long_pipeline", |b| {
        b.iter(|| RemoteCommandClassifier::level(black_box(&long)));
    });

    group.finish();
}

fn bench_command_summary(c: &mut Criterion) {
    c.bench_function("command_summary", |b| {
        b.iter(|| LogSanitizer::command_summary(black_box("journalctl -u nginx --since today")));
    });
}

criterion_group!(benches, bench_classify, bench_command_summary);
criterion_main!(benches);
