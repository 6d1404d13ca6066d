//! Runtime versions, release channels and template branches.
//!
//! A [`Version`] is a semantic version tagged with where it came from. The
//! origin never takes part in ordering or equality, so a locally defined
//! `12.0.0` and the published `12.0.0` are the same point in a bisect range.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VersionError;

/// Where a version became known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    /// Published release taken from the remote release list.
    Remote,
    /// Version defined on this machine (custom build, unreleased).
    Local,
}

/// A runtime version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    semver: semver::Version,
    source: VersionSource,
}

impl Version {
    /// Wrap an already-parsed semantic version.
    pub fn new(semver: semver::Version, source: VersionSource) -> Self {
        Self { semver, source }
    }

    /// Parse leniently (see [`normalize_version`]) and tag as remote.
    pub fn remote(input: &str) -> Result<Self, VersionError> {
        Ok(Self::new(normalize_version(input)?, VersionSource::Remote))
    }

    /// Parse leniently (see [`normalize_version`]) and tag as local.
    pub fn local(input: &str) -> Result<Self, VersionError> {
        Ok(Self::new(normalize_version(input)?, VersionSource::Local))
    }

    pub fn semver(&self) -> &semver::Version {
        &self.semver
    }

    pub fn source(&self) -> VersionSource {
        self.source
    }

    pub fn major(&self) -> u64 {
        self.semver.major
    }

    /// Release channel implied by the pre-release tag.
    pub fn channel(&self) -> ReleaseChannel {
        ReleaseChannel::of(&self.semver)
    }

    /// Template branch for this version.
    pub fn branch(&self) -> Branch {
        Branch::from_major(self.semver.major)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.semver == other.semver
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.semver.cmp(&other.semver)
    }
}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.semver.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.semver)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::remote(s)
    }
}

/// Leniently clean up a user-supplied version string and parse it.
///
/// Accepts surrounding whitespace, a leading `v`, and a missing minor or
/// patch component (`12` → `12.0.0`, `12.1-beta.2` → `12.1.0-beta.2`).
pub fn normalize_version(input: &str) -> Result<semver::Version, VersionError> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(VersionError::Empty);
    }

    if let Ok(parsed) = semver::Version::parse(trimmed) {
        return Ok(parsed);
    }

    let (core, rest) = match trimmed.find(['-', '+']) {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };
    let parts: Vec<&str> = core.split('.').collect();
    let numeric = parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if numeric && parts.len() < 3 {
        let mut padded = parts.join(".");
        for _ in parts.len()..3 {
            padded.push_str(".0");
        }
        padded.push_str(rest);
        if let Ok(parsed) = semver::Version::parse(&padded) {
            return Ok(parsed);
        }
    }

    semver::Version::parse(trimmed).map_err(|e| VersionError::Unparseable {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Category of runtime build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseChannel {
    Stable,
    Beta,
    Nightly,
}

impl ReleaseChannel {
    /// Channel of a parsed version, from its pre-release tag.
    pub fn of(version: &semver::Version) -> Self {
        let pre = version.pre.as_str();
        if pre.is_empty() {
            ReleaseChannel::Stable
        } else if pre.contains("nightly") {
            ReleaseChannel::Nightly
        } else {
            ReleaseChannel::Beta
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReleaseChannel::Stable => "stable",
            ReleaseChannel::Beta => "beta",
            ReleaseChannel::Nightly => "nightly",
        }
    }
}

impl fmt::Display for ReleaseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which release channels are visible in version listings.
///
/// Stable releases are always visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFilter {
    pub betas: bool,
    pub nightlies: bool,
}

impl Default for ChannelFilter {
    fn default() -> Self {
        Self {
            betas: true,
            nightlies: false,
        }
    }
}

impl ChannelFilter {
    /// Filter that shows every channel.
    pub fn all() -> Self {
        Self {
            betas: true,
            nightlies: true,
        }
    }

    pub fn allows(&self, channel: ReleaseChannel) -> bool {
        match channel {
            ReleaseChannel::Stable => true,
            ReleaseChannel::Beta => self.betas,
            ReleaseChannel::Nightly => self.nightlies,
        }
    }

    pub fn show(&mut self, channels: &[ReleaseChannel]) {
        self.set(channels, true);
    }

    pub fn hide(&mut self, channels: &[ReleaseChannel]) {
        self.set(channels, false);
    }

    fn set(&mut self, channels: &[ReleaseChannel], visible: bool) {
        for channel in channels {
            match channel {
                ReleaseChannel::Stable => {}
                ReleaseChannel::Beta => self.betas = visible,
                ReleaseChannel::Nightly => self.nightlies = visible,
            }
        }
    }
}

/// Template branch identifier: `"{major}-x-y"` or `"master"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Branch(String);

impl Branch {
    pub const MASTER: &'static str = "master";

    pub fn master() -> Self {
        Branch(Self::MASTER.to_string())
    }

    /// Branch for a major version. Major 0 has no release branch.
    pub fn from_major(major: u64) -> Self {
        if major == 0 {
            Self::master()
        } else {
            Branch(format!("{major}-x-y"))
        }
    }

    /// Branch for an optional, possibly unparseable, version string.
    pub fn for_version(version: Option<&str>) -> Self {
        version
            .and_then(|v| normalize_version(v).ok())
            .map(|v| Self::from_major(v.major))
            .unwrap_or_else(Self::master)
    }

    /// Major component this branch is scoped to, if any.
    pub fn major(&self) -> Option<u64> {
        self.0.strip_suffix("-x-y").and_then(|m| m.parse().ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
