//! Binary search over an ordered version range.
//!
//! The controller keeps two indices into the ordered version list, `left`
//! (known good) and `right` (known bad), runs the fiddle at the index midpoint
//! and moves one bound per run until the bounds are adjacent. Exactly one run
//! is in flight at any time.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};

use crate::catalog::VersionCatalog;
use crate::error::BisectError;
use crate::fiddle::Fiddle;
use crate::metrics::METRICS;
use crate::obs::{bisect_span, emit_bisect_finished, emit_bisect_started, emit_bisect_step};
use crate::runner::{emit_output, OutputSink, RunRequest, RunResult, RunnerBridge};
use crate::version::{ChannelFilter, Version};

/// Outcome of a bisect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BisectResult {
    /// Last version observed (or assumed) good.
    pub good: Option<Version>,
    /// First version observed (or assumed) bad.
    pub bad: Option<Version>,
    /// Runs performed.
    pub steps: usize,
    /// Whether the caller supplied the bounds in reverse order.
    pub swapped: bool,
}

impl BisectResult {
    fn unresolved(steps: usize, swapped: bool) -> Self {
        Self {
            good: None,
            bad: None,
            steps,
            swapped,
        }
    }

    /// Both ends of the boundary are known.
    pub fn is_resolved(&self) -> bool {
        self.good.is_some() && self.bad.is_some()
    }
}

/// Upper bound on runs needed to bisect `n` versions: `ceil(log2(n))`.
pub fn max_steps(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

/// Drives a [`RunnerBridge`] to find the good/bad boundary.
pub struct BisectController {
    runner: Arc<dyn RunnerBridge>,
    catalog: Arc<VersionCatalog>,
    channels: ChannelFilter,
}

impl BisectController {
    pub fn new(runner: Arc<dyn RunnerBridge>, catalog: Arc<VersionCatalog>) -> Self {
        Self {
            runner,
            catalog,
            channels: ChannelFilter::default(),
        }
    }

    /// Restrict the searched versions to the given channels.
    pub fn with_channels(mut self, channels: ChannelFilter) -> Self {
        self.channels = channels;
        self
    }

    /// Bisect between `good` and `bad`, swapping them if they are reversed.
    ///
    /// Output from every run is forwarded to `output` as it arrives. A runner
    /// error aborts the whole bisect.
    pub async fn bisect(
        &self,
        good: Version,
        bad: Version,
        fiddle: Arc<Fiddle>,
        output: &OutputSink,
    ) -> Result<BisectResult, BisectError> {
        let swapped = good > bad;
        let (good, bad) = if swapped {
            warn!(good = %good, bad = %bad, "bisect bounds out of order, swapping");
            emit_output(
                output,
                format!("Good version {good} is newer than bad version {bad}; swapping them"),
            );
            (bad, good)
        } else {
            (good, bad)
        };

        let versions = self.catalog.versions_between(&good, &bad, &self.channels);
        self.search(&versions, fiddle, output, swapped).await
    }

    /// Bisect over an explicit ascending list whose first entry is assumed
    /// good and last entry assumed bad.
    pub async fn bisect_list(
        &self,
        versions: &[Version],
        fiddle: Arc<Fiddle>,
        output: &OutputSink,
    ) -> Result<BisectResult, BisectError> {
        self.search(versions, fiddle, output, false).await
    }

    async fn search(
        &self,
        versions: &[Version],
        fiddle: Arc<Fiddle>,
        output: &OutputSink,
        swapped: bool,
    ) -> Result<BisectResult, BisectError> {
        let (first, last) = match (versions.first(), versions.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Ok(BisectResult::unresolved(0, swapped)),
        };

        let span = bisect_span(&first.to_string(), &last.to_string());
        self.narrow(versions, fiddle, output, swapped)
            .instrument(span)
            .await
    }

    async fn narrow(
        &self,
        versions: &[Version],
        fiddle: Arc<Fiddle>,
        output: &OutputSink,
        swapped: bool,
    ) -> Result<BisectResult, BisectError> {
        let first = &versions[0];
        let last = &versions[versions.len() - 1];
        emit_bisect_started(&first.to_string(), &last.to_string(), versions.len());
        emit_output(
            output,
            format!(
                "Bisecting {} versions between {first} and {last} (at most {} runs)",
                versions.len(),
                max_steps(versions.len())
            ),
        );

        let mut left = 0;
        let mut right = versions.len() - 1;
        let mut steps = 0;

        while right - left > 1 {
            let mid = left + (right - left) / 2;
            let version = &versions[mid];
            emit_output(output, format!("Testing {version}"));

            let request = RunRequest::new(version.clone(), Arc::clone(&fiddle));
            let result = match self.runner.run(request, output.clone()).await {
                Ok(result) => result,
                Err(source) => {
                    warn!(version = %version, error = %source, "runner failed, aborting bisect");
                    emit_bisect_finished(steps, false);
                    return Err(BisectError::Runner {
                        version: version.to_string(),
                        source,
                    });
                }
            };
            steps += 1;
            METRICS.inc_bisect_steps();
            emit_bisect_step(&version.to_string(), steps, &result.to_string());

            match result {
                RunResult::Success => left = mid,
                RunResult::Failure => right = mid,
                RunResult::Invalid => {
                    warn!(version = %version, "run was inconclusive, stopping bisect");
                    emit_output(
                        output,
                        format!("Run against {version} was inconclusive; bisect stopped"),
                    );
                    emit_bisect_finished(steps, false);
                    return Ok(BisectResult::unresolved(steps, swapped));
                }
            }
        }

        let good = versions[left].clone();
        let bad = versions[right].clone();
        info!(good = %good, bad = %bad, steps, "bisect finished");
        emit_output(
            output,
            format!("Bisect complete: {good} is the last good version, {bad} the first bad one"),
        );
        emit_bisect_finished(steps, true);

        Ok(BisectResult {
            good: Some(good),
            bad: Some(bad),
            steps,
            swapped,
        })
    }
}
