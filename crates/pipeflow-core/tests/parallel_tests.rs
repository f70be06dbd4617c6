mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{tracked, Journal};
use pipeflow_core::{ArtifactStore, Engine, FailurePolicy, FingerprintCache, Pipeline, RunContext, RunOptions, RunStatus, SkipReason,
                    Step, StepExecutionError, StepInputs, StepOutputs, StepStatus};
use serde_json::json;

/// Step que mide cuántos steps corren a la vez.
fn gauged(name: &str, output: &str, current: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>, journal: &Journal) -> Step {
    let (current, peak, journal) = (current.clone(), peak.clone(), journal.clone());
    let (label, out) = (name.to_string(), output.to_string());
    Step::new(name, move |_: &StepInputs, _: &RunContext| -> Result<StepOutputs, StepExecutionError> {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(40));
        current.fetch_sub(1, Ordering::SeqCst);
        journal.push(&label);
        Ok(StepOutputs::new().with(out.clone(), json!(label)))
    }).inputs(["raw"])
      .outputs([output])
}

fn fan_in(journal: &Journal, current: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> Pipeline {
    let mut pipeline = Pipeline::new("fan").external_input("raw");
    for i in 0..4 {
        pipeline.add_step(gauged(&format!("leaf{i}"), &format!("L{i}"), current, peak, journal))
                .expect("leaf");
    }
    let (join, _) = tracked("join", &["L0", "L1", "L2", "L3"], &["J"], journal);
    pipeline.add_step(join).expect("join");
    pipeline
}

/// Hoja que tarda `delay_ms` y falla si `fails`.
fn timed_leaf(name: &str, output: &str, delay_ms: u64, fails: bool, journal: &Journal) -> Step {
    let (label, out, journal) = (name.to_string(), output.to_string(), journal.clone());
    Step::new(name, move |_: &StepInputs, _: &RunContext| -> Result<StepOutputs, StepExecutionError> {
        journal.push(&label);
        thread::sleep(Duration::from_millis(delay_ms));
        if fails {
            return Err(StepExecutionError::new(format!("{label} exploded")));
        }
        Ok(StepOutputs::new().with(out.clone(), json!(label)))
    }).inputs(["raw"])
      .outputs([output])
}

/// raw -> slow -> A -> after_slow
///     -> bad  -> B -> after_bad
///     -> late -> C -> after_late
fn fan_out(journal: &Journal) -> Pipeline {
    let mut pipeline = Pipeline::new("fan-out").external_input("raw");
    pipeline.add_step(timed_leaf("slow", "A", 150, false, journal)).expect("slow");
    pipeline.add_step(timed_leaf("bad", "B", 0, true, journal)).expect("bad");
    pipeline.add_step(timed_leaf("late", "C", 10, false, journal)).expect("late");
    for (name, input, output) in [("after_slow", "A", "A2"), ("after_bad", "B", "B2"), ("after_late", "C", "C2")] {
        let (step, _) = tracked(name, &[input], &[output], journal);
        pipeline.add_step(step).expect("dependent");
    }
    pipeline
}

#[test]
fn parallel_run_respects_limit_and_dependencies() {
    let journal = Journal::default();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let pipeline = fan_in(&journal, &current, &peak);
    let mut engine = Engine::in_memory();
    engine.artifacts().seed("raw", json!(1));

    let options = RunOptions::new(FailurePolicy::FailFast).max_parallel(2);
    let outcome = pipeline.run_with(&mut engine, &FingerprintCache, &options).expect("run");

    assert_eq!(outcome.status, RunStatus::AllSucceeded);
    assert!(peak.load(Ordering::SeqCst) <= 2, "peak={}", peak.load(Ordering::SeqCst));
    let order = journal.take();
    assert_eq!(order.len(), 5);
    assert_eq!(order.last().map(String::as_str), Some("join"));
    // El reporte sigue el orden topológico, no el de finalización.
    let reported: Vec<&str> = outcome.steps.iter().map(|r| r.step.as_str()).collect();
    assert_eq!(reported, vec!["leaf0", "leaf1", "leaf2", "leaf3", "join"]);
}

#[test]
fn parallel_rerun_uses_cache() {
    let journal = Journal::default();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let pipeline = fan_in(&journal, &current, &peak);
    let mut engine = Engine::in_memory();
    engine.artifacts().seed("raw", json!(1));
    let options = RunOptions::new(FailurePolicy::BestEffort).max_parallel(3);

    pipeline.run_with(&mut engine, &FingerprintCache, &options).expect("first");
    journal.take();
    let outcome = pipeline.run_with(&mut engine, &FingerprintCache, &options).expect("second");

    assert!(journal.take().is_empty());
    assert_eq!(outcome.status_of("join"), Some(StepStatus::Skipped(SkipReason::Cached)));
}

#[test]
fn parallel_and_sequential_produce_same_record() {
    let seq_journal = Journal::default();
    let par_journal = Journal::default();
    let gauge = || (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
    let (c1, p1) = gauge();
    let (c2, p2) = gauge();

    let mut seq = Engine::in_memory();
    seq.artifacts().seed("raw", json!(1));
    let a = fan_in(&seq_journal, &c1, &p1).run(&mut seq, &FingerprintCache, FailurePolicy::FailFast)
                                          .expect("sequential");

    let mut par = Engine::in_memory();
    par.artifacts().seed("raw", json!(1));
    let b = fan_in(&par_journal, &c2, &p2).run_with(&mut par,
                                                    &FingerprintCache,
                                                    &RunOptions::new(FailurePolicy::FailFast).max_parallel(4))
                                          .expect("parallel");

    for (name, rec) in &a.record.steps {
        let other = b.record.step(name).expect("step in parallel record");
        assert_eq!(rec.status, other.status);
        assert_eq!(rec.fingerprint, other.fingerprint);
        assert_eq!(rec.outputs, other.outputs);
    }
}

#[test]
fn parallel_fail_fast_drains_in_flight_and_starts_nothing_new() {
    let journal = Journal::default();
    let pipeline = fan_out(&journal);
    let mut engine = Engine::in_memory();
    engine.artifacts().seed("raw", json!(1));

    let options = RunOptions::new(FailurePolicy::FailFast).max_parallel(2);
    let outcome = pipeline.run_with(&mut engine, &FingerprintCache, &options).expect("run");

    let mut started = journal.take();
    started.sort();
    assert_eq!(started, vec!["bad", "slow"]);
    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.status_of("bad"), Some(StepStatus::Failed));
    // `slow` ya estaba en vuelo: termina y se registra.
    assert_eq!(outcome.status_of("slow"), Some(StepStatus::Succeeded));
    assert!(engine.artifacts().exists("A"));
    for step in ["late", "after_slow", "after_bad", "after_late"] {
        assert_eq!(outcome.status_of(step), Some(StepStatus::Pending), "{step}");
        assert!(engine.state().history_of("fan-out", step).is_empty(), "{step}");
    }
    assert_eq!(engine.state().history_of("fan-out", "slow"),
               vec![StepStatus::Running, StepStatus::Succeeded]);
    assert_eq!(engine.state().history_of("fan-out", "bad"),
               vec![StepStatus::Running, StepStatus::Failed]);
}

#[test]
fn parallel_best_effort_skips_dependents_while_siblings_run() {
    let journal = Journal::default();
    let pipeline = fan_out(&journal);
    let mut engine = Engine::in_memory();
    engine.artifacts().seed("raw", json!(1));

    let options = RunOptions::new(FailurePolicy::BestEffort).max_parallel(2);
    let outcome = pipeline.run_with(&mut engine, &FingerprintCache, &options).expect("run");

    let started = journal.take();
    assert!(!started.iter().any(|s| s == "after_bad"), "{started:?}");
    assert_eq!(started.len(), 5);
    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.status_of("after_bad"), Some(StepStatus::Skipped(SkipReason::DependencyFailed)));
    for step in ["slow", "late", "after_slow", "after_late"] {
        assert_eq!(outcome.status_of(step), Some(StepStatus::Succeeded), "{step}");
        assert_eq!(engine.state().history_of("fan-out", step),
                   vec![StepStatus::Running, StepStatus::Succeeded],
                   "{step}");
    }
    assert_eq!(engine.state().history_of("fan-out", "after_bad"),
               vec![StepStatus::Skipped(SkipReason::DependencyFailed)]);

    // El skip se escribe mientras `slow` sigue en vuelo.
    let history = engine.state().history("fan-out");
    let seq_of = |step: &str, status: StepStatus| {
        history.iter()
               .find(|e| e.step == step && e.status == status)
               .map(|e| e.seq)
               .expect("transition")
    };
    let skipped = seq_of("after_bad", StepStatus::Skipped(SkipReason::DependencyFailed));
    assert!(seq_of("slow", StepStatus::Running) < skipped);
    assert!(skipped < seq_of("slow", StepStatus::Succeeded));
}
