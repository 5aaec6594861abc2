//! Publish Scheduler: daily quota, per-group sub-quotas, minimum spacing
//! with a priority-category bypass, and the terminal `PublishableItem`
//! entity. Counter updates are a single read-modify-write guarded by the
//! caller holding `&mut` — only one admission decision runs at a time.

pub mod store;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::CategoryAssignment;
use crate::config::PublishingConfig;
use crate::feeds::Candidate;
use crate::images::ImageResult;
use crate::rewrite::RewriteResult;

pub const DEFAULT_AUTHOR: &str = "Global Travel Report Editorial Team";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Queued,
    Published,
    Failed,
}

/// The pipeline's terminal entity; persisted to the content store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishableItem {
    /// Content fingerprint; the identity for idempotent upserts.
    pub fingerprint: String,
    pub slug: String,
    pub candidate: Candidate,
    pub rewrite: RewriteResult,
    pub category: CategoryAssignment,
    pub image: ImageResult,
    pub author: String,
    pub status: PublishStatus,
    pub scheduled_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Process-wide schedule state for the current publishing period. The
/// Publish Scheduler is its only mutator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSchedule {
    pub date: NaiveDate,
    pub total_published_today: u32,
    pub per_group_published: HashMap<String, u32>,
    /// Admissions into the general pool (outside any reserved group quota).
    pub general_published: u32,
    pub last_publish_at: Option<DateTime<Utc>>,
}

impl PublishSchedule {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            date: today,
            total_published_today: 0,
            per_group_published: HashMap::new(),
            general_published: 0,
            last_publish_at: None,
        }
    }

    /// Reset at the start of each publishing period.
    pub fn rollover(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.date != today {
            debug!(old = %self.date, new = %today, "publish schedule period reset");
            *self = Self::new(today);
        }
    }

    pub fn load(dir: &Path, now: DateTime<Utc>) -> Self {
        let path = dir.join("publish_schedule.json");
        let mut schedule: Self = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_else(|| Self::new(now.date_naive()));
        schedule.rollover(now);
        schedule
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("publish_schedule.json");
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, &path).context("persisting publish schedule")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Accepting,
    QuotaReached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    DailyLimit,
    GroupQuota { group: String },
    MinSpacing,
}

/// Quota rejection is an expected scheduling outcome, not an error; the
/// item surfaces again on a later cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Queued { scheduled_at: DateTime<Utc> },
    Rejected(RejectReason),
}

pub struct PublishScheduler {
    cfg: PublishingConfig,
    schedule: PublishSchedule,
    state_dir: Option<PathBuf>,
}

impl PublishScheduler {
    pub fn new(cfg: PublishingConfig, schedule: PublishSchedule) -> Self {
        Self {
            cfg,
            schedule,
            state_dir: None,
        }
    }

    pub fn load(cfg: PublishingConfig, state_dir: &Path, now: DateTime<Utc>) -> Self {
        Self {
            cfg,
            schedule: PublishSchedule::load(state_dir, now),
            state_dir: Some(state_dir.to_path_buf()),
        }
    }

    pub fn schedule(&self) -> &PublishSchedule {
        &self.schedule
    }

    pub fn state(&self) -> SchedulerState {
        if self.schedule.total_published_today >= self.cfg.daily_limit {
            SchedulerState::QuotaReached
        } else if self.schedule.total_published_today == 0 {
            SchedulerState::Idle
        } else {
            SchedulerState::Accepting
        }
    }

    fn is_priority(&self, category: &str) -> bool {
        self.cfg
            .priority_categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(category))
    }

    /// Order a batch so priority categories drain first; within a band,
    /// higher-priority sources then earlier publication dates go first.
    pub fn drain_order(&self, items: &mut [PublishableItem]) {
        items.sort_by(|a, b| {
            let pa = self.is_priority(&a.category.canonical_category);
            let pb = self.is_priority(&b.category.canonical_category);
            pb.cmp(&pa)
                .then(a.candidate.source_priority.cmp(&b.candidate.source_priority))
                .then(a.candidate.published_at.cmp(&b.candidate.published_at))
        });
    }

    /// Single admission decision: daily limit, then group sub-quota (with
    /// optional overflow into the general pool), then minimum spacing.
    /// Counters update atomically with the decision.
    pub fn admit(&mut self, category: &str, now: DateTime<Utc>) -> Admission {
        self.schedule.rollover(now);

        // (1) overall daily limit
        if self.schedule.total_published_today >= self.cfg.daily_limit {
            counter!("pipeline_publish_rejected_quota_total").increment(1);
            return Admission::Rejected(RejectReason::DailyLimit);
        }

        let reserved: u32 = self.cfg.groups.iter().map(|g| g.quota).sum();
        let general_capacity = self.cfg.daily_limit.saturating_sub(reserved);

        // (2) group sub-quota, overflow to general pool if configured
        enum Pool {
            Group(String),
            General,
        }
        let pool = match self.cfg.group_for(category) {
            Some(group) => {
                let used = self
                    .schedule
                    .per_group_published
                    .get(&group.name)
                    .copied()
                    .unwrap_or(0);
                if used < group.quota {
                    Pool::Group(group.name.clone())
                } else if self.cfg.overflow_to_general
                    && self.schedule.general_published < general_capacity
                {
                    Pool::General
                } else {
                    counter!("pipeline_publish_rejected_quota_total").increment(1);
                    return Admission::Rejected(RejectReason::GroupQuota {
                        group: group.name.clone(),
                    });
                }
            }
            None => {
                if self.schedule.general_published < general_capacity {
                    Pool::General
                } else {
                    counter!("pipeline_publish_rejected_quota_total").increment(1);
                    return Admission::Rejected(RejectReason::DailyLimit);
                }
            }
        };

        // (3) minimum spacing; priority categories bypass the gate
        if let Some(last) = self.schedule.last_publish_at {
            let elapsed = now - last;
            if elapsed < chrono::Duration::minutes(self.cfg.interval_minutes)
                && !self.is_priority(category)
            {
                counter!("pipeline_publish_rejected_spacing_total").increment(1);
                return Admission::Rejected(RejectReason::MinSpacing);
            }
        }

        match pool {
            Pool::Group(name) => {
                *self.schedule.per_group_published.entry(name).or_insert(0) += 1;
            }
            Pool::General => self.schedule.general_published += 1,
        }
        self.schedule.total_published_today += 1;
        self.schedule.last_publish_at = Some(now);
        counter!("pipeline_publish_admitted_total").increment(1);
        info!(
            category,
            total = self.schedule.total_published_today,
            "admitted for publication"
        );
        Admission::Queued { scheduled_at: now }
    }

    /// Persist schedule state if this scheduler was loaded from disk.
    pub fn persist(&self) -> Result<()> {
        match &self.state_dir {
            Some(dir) => self.schedule.save(dir),
            None => Ok(()),
        }
    }
}
