//! Structured observability hooks for bisect, run and template events.
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`). For JSON
//! output pass `--json` to the CLI.

use tracing::info;

/// Span covering one bisect. Attach with `Instrument::instrument` so it
/// survives across awaits.
pub fn bisect_span(good: &str, bad: &str) -> tracing::Span {
    tracing::info_span!("fiddle.bisect", good = %good, bad = %bad)
}

/// Span covering one run of a fiddle.
pub fn run_span(run_id: &str, version: &str) -> tracing::Span {
    tracing::info_span!("fiddle.run", run_id = %run_id, version = %version)
}

/// Emit event: bisect started over `candidates` versions.
pub fn emit_bisect_started(good: &str, bad: &str, candidates: usize) {
    info!(event = "bisect.started", good = %good, bad = %bad, candidates = candidates);
}

/// Emit event: one bisect step finished.
pub fn emit_bisect_step(version: &str, step: usize, result: &str) {
    info!(event = "bisect.step", version = %version, step = step, result = %result);
}

/// Emit event: bisect finished.
pub fn emit_bisect_finished(steps: usize, resolved: bool) {
    info!(event = "bisect.finished", steps = steps, resolved = resolved);
}

/// Emit event: a run reached a terminal state.
pub fn emit_run_finished(run_id: &str, version: &str, duration_ms: u64, result: &str) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        version = %version,
        duration_ms = duration_ms,
        result = %result,
    );
}

/// Emit event: a branch template was resolved from `source`.
pub fn emit_template_resolved(branch: &str, source: &str) {
    info!(event = "template.resolved", branch = %branch, source = %source);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_create() {
        let _bisect = bisect_span("10.0.0", "11.0.0").entered();
        let _run = run_span("run-1", "10.5.0").entered();
    }
}
