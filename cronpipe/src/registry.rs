//! Static cadence and lock-key registry.
//!
//! Maps every scheduled job to the cron expression the external scheduler
//! fires it on, the lock resource it runs under, and the lock TTL. TTLs
//! upper-bound each job's worst-case duration because locks are never
//! renewed. The table is immutable; it is also served read-only to
//! monitoring through `GET /schedule`.

use serde::{Serialize, Serializer};
use std::fmt;

use crate::core::StageName;

/// A job the external scheduler can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// One stage run standalone.
    Stage(StageName),
    /// All six stages in order under one lock.
    FullPipeline,
    /// Bulk topic-merge proposal job.
    TopicMerges,
    /// Incremental on-chain sync.
    OnchainSync,
    /// Historical on-chain backfill.
    OnchainBackfill,
}

impl JobKind {
    /// Every job, stages first in pipeline order.
    pub const ALL: [Self; 10] = [
        Self::Stage(StageName::Ingest),
        Self::Stage(StageName::Enrich),
        Self::Stage(StageName::Analyze),
        Self::Stage(StageName::Aggregate),
        Self::Stage(StageName::Coordination),
        Self::Stage(StageName::Briefing),
        Self::FullPipeline,
        Self::TopicMerges,
        Self::OnchainSync,
        Self::OnchainBackfill,
    ];

    /// Stable job name, identical to its lock resource.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stage(stage) => stage.as_str(),
            Self::FullPipeline => "pipeline",
            Self::TopicMerges => "topic-merges",
            Self::OnchainSync => "onchain-sync",
            Self::OnchainBackfill => "onchain-backfill",
        }
    }

    /// Registry entry for this job.
    #[must_use]
    pub const fn schedule(self) -> JobSchedule {
        let (cron, ttl_secs) = match self {
            Self::Stage(StageName::Ingest) => ("*/15 * * * *", 120),
            Self::Stage(StageName::Enrich) => ("5-59/15 * * * *", 300),
            Self::Stage(StageName::Analyze) => ("10 * * * *", 300),
            Self::Stage(StageName::Aggregate) => ("20 * * * *", 300),
            Self::Stage(StageName::Coordination) => ("30 */2 * * *", 300),
            Self::Stage(StageName::Briefing) => ("0 6,18 * * *", 120),
            Self::FullPipeline => ("0 */6 * * *", 900),
            Self::TopicMerges => ("0 3 * * *", 900),
            Self::OnchainSync => ("*/10 * * * *", 300),
            Self::OnchainBackfill => ("45 2 * * *", 300),
        };

        JobSchedule {
            kind: self,
            cron,
            lock_resource: self.as_str(),
            ttl_secs,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Cadence, lock resource and TTL of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSchedule {
    /// The job.
    #[serde(rename = "job")]
    pub kind: JobKind,
    /// Cron expression the external scheduler fires on (UTC).
    pub cron: &'static str,
    /// Resource name; the lock key is `lock:<resource>`.
    pub lock_resource: &'static str,
    /// Lock TTL in seconds.
    pub ttl_secs: u64,
}

/// The full registry, in [`JobKind::ALL`] order.
#[must_use]
pub fn schedules() -> Vec<JobSchedule> {
    JobKind::ALL.into_iter().map(JobKind::schedule).collect()
}
