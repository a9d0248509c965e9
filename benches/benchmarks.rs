//! Performance benchmarks for Stepwise.
//!
//! This module contains benchmarks for:
//! - Engine navigation over workflows of increasing length
//! - Failure classification
//! - Definition parsing and registry construction
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use stepwise::recovery::{classify_report, ErrorClassifier, ErrorContext, FailureReport};
use stepwise::workflow::{
    parse_definition_str, step_data, StepDefinition, StepRegistry, WorkflowConfig, WorkflowEngine,
};
use tokio::runtime::Runtime;

// ============================================================================
// Fixtures
// ============================================================================

mod fixtures {
    use super::*;

    /// A linear workflow where each step depends on the one before it.
    pub fn generate_steps(count: usize) -> Vec<StepDefinition> {
        (0..count)
            .map(|i| {
                let step = StepDefinition::new(format!("step-{}", i), format!("Step {}", i))
                    .with_estimated_time(2);
                let step = if i > 0 { step.depends_on([format!("step-{}", i - 1)]) } else { step };
                if i % 4 == 3 {
                    step.skippable()
                } else {
                    step
                }
            })
            .collect()
    }

    pub fn generate_config(count: usize) -> WorkflowConfig {
        WorkflowConfig::new("bench", "Benchmark", generate_steps(count)).with_auto_save(false)
    }

    /// YAML definition with `count` steps.
    pub fn generate_definition(count: usize) -> String {
        let mut yaml = String::from("id: bench\nname: Benchmark\nsteps:\n");
        for i in 0..count {
            yaml.push_str(&format!("  - id: step-{}\n    title: Step {}\n", i, i));
            yaml.push_str("    required: [name]\n    warn_if_missing: [notes]\n");
            if i > 0 {
                yaml.push_str(&format!("    dependencies: [step-{}]\n", i - 1));
            }
        }
        yaml
    }

    pub fn reports() -> Vec<FailureReport> {
        vec![
            FailureReport::new("connection refused").with_code("ECONNREFUSED"),
            FailureReport::new("token expired").with_status(401),
            FailureReport::new("too many requests").with_status(429),
            FailureReport::new("email is malformed").with_status(422),
            FailureReport::new("model overloaded").with_status(503),
            FailureReport::new("bad gateway").with_status(502),
            FailureReport::new("something odd happened"),
        ]
    }
}

// ============================================================================
// Engine Benchmarks
// ============================================================================

fn bench_engine_navigation(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/navigation");
    let runtime = Runtime::new().expect("Failed to create runtime");

    for num_steps in [5, 20, 100].iter() {
        group.throughput(Throughput::Elements(*num_steps as u64));
        group.bench_with_input(BenchmarkId::new("walk_forward", num_steps), num_steps, |b, &n| {
            b.iter(|| {
                runtime.block_on(async {
                    let mut engine = WorkflowEngine::builder(fixtures::generate_config(n))
                        .build()
                        .await
                        .expect("Failed to build engine");
                    while engine.next_step() {}
                    black_box(engine.progress())
                })
            });
        });
    }

    let mut engine = runtime
        .block_on(WorkflowEngine::builder(fixtures::generate_config(20)).build())
        .expect("Failed to build engine");
    while engine.next_step() {}
    group.bench_function("go_to_step_back_and_forth", |b| {
        b.iter(|| {
            black_box(engine.go_to_step(black_box("step-2")));
            black_box(engine.go_to_step(black_box("step-19")));
        });
    });

    group.finish();
}

fn bench_engine_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/updates");
    let runtime = Runtime::new().expect("Failed to create runtime");

    let mut engine = runtime
        .block_on(WorkflowEngine::builder(fixtures::generate_config(20)).build())
        .expect("Failed to build engine");
    engine.add_listener(|event| {
        black_box(event.kind);
    });

    group.bench_function("update_step_data", |b| {
        b.iter(|| {
            let data = step_data([("name", json!("Ada")), ("tags", json!(["rust", "tokio"]))]);
            black_box(engine.update_step_data(black_box("step-0"), data))
        });
    });

    group.bench_function("state_snapshot", |b| {
        b.iter(|| black_box(engine.state()));
    });

    group.finish();
}

// ============================================================================
// Classification Benchmarks
// ============================================================================

fn bench_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery/classify");
    let reports = fixtures::reports();

    group.throughput(Throughput::Elements(reports.len() as u64));
    group.bench_function("classify_report", |b| {
        b.iter(|| {
            for report in &reports {
                black_box(classify_report(black_box(report)));
            }
        });
    });

    let classifier = ErrorClassifier::new();
    let context = ErrorContext::at_step("curriculum-generation");
    group.bench_function("classify_and_log", |b| {
        b.iter(|| {
            for report in &reports {
                let error = classifier.classify(black_box(report), &context);
                black_box(classifier.fallback_workflow(&error, &context).is_some());
            }
        });
    });

    group.finish();
}

// ============================================================================
// Parsing Benchmarks
// ============================================================================

fn bench_definition_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing/definition");

    for num_steps in [5, 50, 200].iter() {
        let yaml = fixtures::generate_definition(*num_steps);
        group.throughput(Throughput::Bytes(yaml.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse_yaml", num_steps), &yaml, |b, yaml| {
            b.iter(|| black_box(parse_definition_str(black_box(yaml))));
        });
    }

    group.finish();
}

fn bench_registry_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    for num_steps in [10, 100, 1000].iter() {
        let steps = fixtures::generate_steps(*num_steps);
        group.bench_with_input(BenchmarkId::new("new", num_steps), &steps, |b, steps| {
            b.iter(|| black_box(StepRegistry::new("bench", steps.clone())));
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Groups and Main
// ============================================================================

criterion_group!(engine_benches, bench_engine_navigation, bench_engine_updates,);

criterion_group!(recovery_benches, bench_classification,);

criterion_group!(parsing_benches, bench_definition_parsing, bench_registry_construction,);

criterion_main!(engine_benches, recovery_benches, parsing_benches,);
