//! Bisect controller behaviour against a scripted runner.

use std::sync::Arc;

use fiddle_core::fakes::ScriptedRunner;
use fiddle_core::{
    max_steps, BisectController, BisectError, Branch, ChannelFilter, Fiddle, OutputEntry,
    RunResult, TemplateEntry, Version, VersionCatalog,
};
use tokio::sync::mpsc;

fn v(s: &str) -> Version {
    Version::remote(s).unwrap()
}

fn fiddle() -> Arc<Fiddle> {
    Arc::new(Fiddle::from_template(&TemplateEntry::bundled(), Branch::master()))
}

/// 10.0.0 ..= 10.9.0, 11.0.0 ..= 11.9.0, plus betas and nightlies of 12.
fn catalog() -> Arc<VersionCatalog> {
    let mut versions = Vec::new();
    for major in [10, 11] {
        for minor in 0..10 {
            versions.push(v(&format!("{major}.{minor}.0")));
        }
    }
    versions.push(v("12.0.0-beta.1"));
    versions.push(v("12.0.0-beta.2"));
    versions.push(v("12.0.0-nightly.20200101"));
    versions.push(v("12.0.0"));
    Arc::new(VersionCatalog::from_versions(versions))
}

fn drain(mut rx: mpsc::UnboundedReceiver<OutputEntry>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(entry) = rx.try_recv() {
        lines.push(entry.text);
    }
    lines
}

#[tokio::test]
async fn finds_adjacent_boundary_within_log_bound() {
    let runner = Arc::new(ScriptedRunner::failing_from(v("11.3.0")));
    let controller = BisectController::new(runner.clone(), catalog());
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = controller
        .bisect(v("10.0.0"), v("11.9.0"), fiddle(), &tx)
        .await
        .unwrap();

    assert_eq!(result.good, Some(v("11.2.0")));
    assert_eq!(result.bad, Some(v("11.3.0")));
    assert!(!result.swapped);
    assert!(result.steps <= max_steps(20));
    assert_eq!(result.steps, runner.calls());
}

#[tokio::test]
async fn every_boundary_is_found_within_log_bound() {
    let versions: Vec<Version> = (0..37).map(|i| v(&format!("1.{i}.0"))).collect();
    let bound = max_steps(versions.len());
    let catalog = Arc::new(VersionCatalog::from_versions(versions.clone()));

    for first_bad in 1..versions.len() {
        let runner = Arc::new(ScriptedRunner::failing_from(versions[first_bad].clone()));
        let controller = BisectController::new(runner.clone(), Arc::clone(&catalog));
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = controller
            .bisect_list(&versions, fiddle(), &tx)
            .await
            .unwrap();

        assert_eq!(result.good.as_ref(), Some(&versions[first_bad - 1]));
        assert_eq!(result.bad.as_ref(), Some(&versions[first_bad]));
        assert!(runner.calls() <= bound, "{} runs for boundary {first_bad}", runner.calls());
    }
}

#[tokio::test]
async fn reversed_bounds_are_swapped() {
    let runner = Arc::new(ScriptedRunner::failing_from(v("10.5.0")));
    let controller = BisectController::new(runner, catalog());
    let (tx, rx) = mpsc::unbounded_channel();

    let result = controller
        .bisect(v("11.2.0"), v("10.0.0"), fiddle(), &tx)
        .await
        .unwrap();
    drop(tx);

    assert!(result.swapped);
    assert_eq!(result.good, Some(v("10.4.0")));
    assert_eq!(result.bad, Some(v("10.5.0")));
    let lines = drain(rx);
    assert!(lines.iter().any(|l| l.contains("swapping")));
}

#[tokio::test]
async fn runner_error_is_fatal() {
    let runner = Arc::new(ScriptedRunner::unavailable());
    let controller = BisectController::new(runner.clone(), catalog());
    let (tx, _rx) = mpsc::unbounded_channel();

    let err = controller
        .bisect(v("10.0.0"), v("11.0.0"), fiddle(), &tx)
        .await
        .unwrap_err();

    assert!(matches!(err, BisectError::Runner { .. }));
    assert_eq!(runner.calls(), 1);
}

#[tokio::test]
async fn invalid_result_leaves_bisect_unresolved() {
    let runner = Arc::new(ScriptedRunner::new(|_| RunResult::Invalid));
    let controller = BisectController::new(runner.clone(), catalog());
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = controller
        .bisect(v("10.0.0"), v("11.0.0"), fiddle(), &tx)
        .await
        .unwrap();

    assert!(!result.is_resolved());
    assert_eq!(result.good, None);
    assert_eq!(result.bad, None);
    assert_eq!(result.steps, 1);
}

#[tokio::test]
async fn identical_bounds_resolve_without_runs() {
    let runner = Arc::new(ScriptedRunner::failing_from(v("10.0.0")));
    let controller = BisectController::new(runner.clone(), catalog());
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = controller
        .bisect(v("10.4.0"), v("10.4.0"), fiddle(), &tx)
        .await
        .unwrap();

    assert_eq!(result.good, Some(v("10.4.0")));
    assert_eq!(result.bad, Some(v("10.4.0")));
    assert_eq!(result.steps, 0);
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn adjacent_bounds_resolve_without_runs() {
    let runner = Arc::new(ScriptedRunner::failing_from(v("10.1.0")));
    let controller = BisectController::new(runner.clone(), catalog());
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = controller
        .bisect(v("10.0.0"), v("10.1.0"), fiddle(), &tx)
        .await
        .unwrap();

    assert_eq!(result.good, Some(v("10.0.0")));
    assert_eq!(result.bad, Some(v("10.1.0")));
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn channel_filter_controls_prereleases() {
    let catalog = catalog();
    let (tx, _rx) = mpsc::unbounded_channel();

    let runner = Arc::new(ScriptedRunner::failing_from(v("12.0.0")));
    let stable_only = BisectController::new(runner.clone(), Arc::clone(&catalog)).with_channels(
        ChannelFilter {
            betas: false,
            nightlies: false,
        },
    );
    stable_only
        .bisect(v("11.9.0"), v("12.0.0"), fiddle(), &tx)
        .await
        .unwrap();
    assert_eq!(runner.calls(), 0);

    let runner = Arc::new(ScriptedRunner::failing_from(v("12.0.0")));
    let everything = BisectController::new(runner.clone(), catalog)
        .with_channels(ChannelFilter::all());
    let result = everything
        .bisect(v("11.9.0"), v("12.0.0"), fiddle(), &tx)
        .await
        .unwrap();
    assert!(runner.calls() > 0);
    assert!(runner
        .versions_run()
        .iter()
        .all(|run| run.semver().pre.as_str() != ""));
    assert_eq!(result.bad, Some(v("12.0.0")));
}

#[tokio::test]
async fn run_output_is_forwarded() {
    let runner = Arc::new(ScriptedRunner::failing_from(v("10.5.0")));
    let controller = BisectController::new(runner, catalog());
    let (tx, rx) = mpsc::unbounded_channel();

    controller
        .bisect(v("10.0.0"), v("10.9.0"), fiddle(), &tx)
        .await
        .unwrap();
    drop(tx);

    let lines = drain(rx);
    assert!(lines.iter().any(|l| l.starts_with("Testing ")));
    assert!(lines.iter().any(|l| l.contains("-> failure")));
    assert!(lines.iter().any(|l| l.starts_with("Bisect complete")));
}
