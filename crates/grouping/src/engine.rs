use crate::config::GroupingConfig;
use crate::similarity::similarity;
use chrono::{DateTime, Utc};
use error_collector_normalizer::canonical_message;
use error_collector_protocol::{ErrorGroup, ErrorRecord, GroupStatus};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Outcome of [`GroupingEngine::assign`].
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub group_id: u64,
    pub created: bool,
    /// Similarity to the representative at assignment time (1.0 for a new group).
    pub score: f64,
    /// Groups whose persisted form changed (the target group plus any that
    /// closed by age along the way).
    pub changed: Vec<ErrorGroup>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retune {
    pub deprecated: Vec<ErrorGroup>,
    pub created: Vec<ErrorGroup>,
}

/// In-memory grouping state. Rebuilt from persisted groups on start
/// ([`GroupingEngine::restore`]); every mutation returns the groups to persist.
#[derive(Debug, Clone)]
pub struct GroupingEngine {
    config: GroupingConfig,
    groups: BTreeMap<u64, ErrorGroup>,
    member_of: HashMap<String, u64>,
    next_group_id: u64,
}

impl GroupingEngine {
    pub fn new(config: GroupingConfig) -> Self {
        Self {
            config,
            groups: BTreeMap::new(),
            member_of: HashMap::new(),
            next_group_id: 1,
        }
    }

    /// Rebuilds from persisted groups; deprecated groups only advance the id counter.
    pub fn restore(config: GroupingConfig, persisted: impl IntoIterator<Item = ErrorGroup>) -> Self {
        let mut engine = Self::new(config);
        for group in persisted {
            engine.next_group_id = engine.next_group_id.max(group.group_id + 1);
            if !group.is_active() {
                continue;
            }
            for id in &group.member_ids {
                engine.member_of.insert(id.clone(), group.group_id);
            }
            engine.groups.insert(group.group_id, group);
        }
        engine
    }

    pub fn config(&self) -> &GroupingConfig {
        &self.config
    }

    pub fn next_group_id(&self) -> u64 {
        self.next_group_id
    }

    /// Never hand out ids below `next_group_id`, so that ids of purged groups
    /// (still named by old summaries) are not reused.
    pub fn reserve_group_ids(&mut self, next_group_id: u64) {
        self.next_group_id = self.next_group_id.max(next_group_id);
    }

    pub fn group(&self, group_id: u64) -> Option<&ErrorGroup> {
        self.groups.get(&group_id)
    }

    pub fn group_of(&self, error_id: &str) -> Option<&ErrorGroup> {
        self.member_of
            .get(error_id)
            .and_then(|gid| self.groups.get(gid))
    }

    /// Active (open or closed) groups, ordered by id.
    pub fn groups(&self) -> impl Iterator<Item = &ErrorGroup> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Closes open groups older than the configured maximum age.
    pub fn close_expired(&mut self, now: DateTime<Utc>) -> Vec<ErrorGroup> {
        let max_age = self.config.max_group_age();
        let mut closed = Vec::new();
        for group in self.groups.values_mut() {
            if group.is_open() && now - group.opened_at > max_age {
                group.status = GroupStatus::Closed;
                log::debug!("group {} closed by age", group.group_id);
                closed.push(group.clone());
            }
        }
        closed
    }

    /// Places `record` in the best-matching open group, or opens a new one.
    ///
    /// Candidates must share source and category. The highest score at or
    /// above the threshold wins; exact ties go to the lowest group id.
    pub fn assign(&mut self, record: &ErrorRecord, now: DateTime<Utc>) -> Assignment {
        let mut changed = self.close_expired(now);

        if let Some(existing) = self.group_of(&record.id) {
            return Assignment {
                group_id: existing.group_id,
                created: false,
                score: 1.0,
                changed,
            };
        }

        let canonical = canonical_message(&record.message);
        let best = self
            .groups
            .values()
            .filter(|g| g.is_open() && g.source == record.source && g.category == record.category)
            .map(|g| (g.group_id, similarity(&canonical, &g.representative_message)))
            .filter(|(_, score)| *score >= self.config.similarity_threshold)
            // BTreeMap iteration is ascending by id, so keeping the first
            // maximum resolves ties towards the lowest id.
            .fold(None::<(u64, f64)>, |best, (gid, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((gid, score)),
            });

        let max_size = self.config.max_group_size.max(1);
        let target = best.and_then(|(gid, score)| self.groups.get_mut(&gid).map(|g| (g, score)));
        let (group_id, score, created) = match target {
            Some((group, score)) => {
                let group_id = group.group_id;
                group.member_ids.insert(record.id.clone());
                if record.severity > group.representative_severity {
                    group.representative_id = record.id.clone();
                    group.representative_severity = record.severity;
                    group.representative_message = canonical;
                }
                if group.member_ids.len() >= max_size {
                    group.status = GroupStatus::Closed;
                    log::debug!("group {group_id} closed at size {}", group.member_ids.len());
                }
                (group_id, score, false)
            }
            None => {
                let group_id = self.next_group_id;
                self.next_group_id += 1;
                let status = if self.config.max_group_size <= 1 {
                    GroupStatus::Closed
                } else {
                    GroupStatus::Open
                };
                self.groups.insert(
                    group_id,
                    ErrorGroup {
                        group_id,
                        member_ids: BTreeSet::from([record.id.clone()]),
                        representative_id: record.id.clone(),
                        representative_severity: record.severity,
                        representative_message: canonical,
                        source: record.source,
                        category: record.category,
                        similarity_threshold_used: self.config.similarity_threshold,
                        opened_at: now,
                        status,
                    },
                );
                (group_id, 1.0, true)
            }
        };

        self.member_of.insert(record.id.clone(), group_id);
        changed.retain(|g| g.group_id != group_id);
        if let Some(group) = self.groups.get(&group_id) {
            changed.push(group.clone());
        }
        Assignment {
            group_id,
            created,
            score,
            changed,
        }
    }

    /// Regroups `records` under a new threshold. Every active group is
    /// deprecated and replaced; groups are never merged in place.
    pub fn retune(
        &mut self,
        similarity_threshold: f64,
        records: &[ErrorRecord],
        now: DateTime<Utc>,
    ) -> Retune {
        let deprecated: Vec<ErrorGroup> = std::mem::take(&mut self.groups)
            .into_values()
            .map(|mut g| {
                g.status = GroupStatus::Deprecated;
                g
            })
            .collect();
        self.member_of.clear();
        self.config.similarity_threshold = similarity_threshold;

        let mut ordered: Vec<&ErrorRecord> = records.iter().collect();
        ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        for record in ordered {
            self.assign(record, now);
        }
        log::info!(
            "retuned to threshold {similarity_threshold}: {} groups deprecated, {} created",
            deprecated.len(),
            self.groups.len()
        );
        Retune {
            deprecated,
            created: self.groups.values().cloned().collect(),
        }
    }

    /// One-off clustering of `records` without touching any live state.
    /// Used to fold query results; size and age limits do not apply.
    pub fn cluster(records: &[ErrorRecord], similarity_threshold: f64) -> Vec<ErrorGroup> {
        let mut engine = Self::new(GroupingConfig {
            similarity_threshold,
            max_group_size: usize::MAX,
            max_group_age_secs: u64::MAX,
        });
        let now = records
            .iter()
            .map(|r| r.timestamp)
            .max()
            .unwrap_or_else(Utc::now);
        let mut ordered: Vec<&ErrorRecord> = records.iter().collect();
        ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        for record in ordered {
            engine.assign(record, now);
        }
        engine.groups.into_values().collect()
    }
}
