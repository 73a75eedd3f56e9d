use std::cmp::Ordering;

use log::info;

/// Dotted numeric version. A leading `v` and any `-suffix` are ignored.
/// Missing trailing parts count as zero, so `1.2 == 1.2.0`.
#[derive(Debug, Clone)]
pub struct Version(Vec<u64>);

impl Version {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        let core = s.split(['-', '+']).next()?;
        if core.is_empty() {
            return None;
        }
        core.split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()
            .map(Version)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
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
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| {
                let a = self.0.get(i).copied().unwrap_or(0);
                let b = other.0.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// Tracks whether a published release is newer than the running daemon.
///
/// Only a known release can raise the flag. It is re-evaluated on a new
/// daemon version or a newer release; the same version reported again
/// changes nothing. The latest release never goes down, so a daemon
/// downgrade keeps the flag set.
#[derive(Debug, Default)]
pub struct UpdateNotifier {
    latest: Option<Version>,
    daemon_version: Option<String>,
    available: bool,
}

impl UpdateNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Records the daemon's version and returns the resulting flag.
    pub fn observe_daemon_version(&mut self, version: &str) -> bool {
        if self.daemon_version.as_deref() == Some(version) {
            return self.available;
        }
        self.daemon_version = Some(version.to_string());
        self.available = self.evaluate();
        if self.available {
            info!("Update available for daemon version {}", version);
        }
        self.available
    }

    /// Learns about a published release. Returns true only when this flips
    /// the flag on.
    pub fn set_latest_release(&mut self, version: &str) -> bool {
        let Some(parsed) = Version::parse(version) else {
            return false;
        };
        if self.latest.as_ref().is_some_and(|l| *l >= parsed) {
            return false;
        }
        self.latest = Some(parsed);
        let was = self.available;
        self.available = self.evaluate();
        !was && self.available
    }

    fn evaluate(&self) -> bool {
        let (Some(latest), Some(daemon)) = (
            &self.latest,
            self.daemon_version.as_deref().and_then(Version::parse),
        ) else {
            return false;
        };
        *latest > daemon
    }
}
