use crate::adapters::store::CoordinateStore;
use crate::config::toml_config::ResolutionConfig;
use crate::core::dedup::dedupe;
use crate::core::normalizer::normalize;
use crate::domain::model::{
    BatchWeapon, Coordinate, CycleOutcome, CycleStats, Place, PlaceKey, PlaceKind, PutOutcome,
    RegionBatch, RegionResolution, ResolvedTarget, ResolvedVia, WeaponReport,
};
use crate::domain::ports::CoordinateService;
use crate::utils::error::{AiServiceError, EngineError, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Turns weapon reports into validated, deduplicated targets, using the
/// coordinate store first and the AI service for whatever it lacks.
pub struct Resolver<A: CoordinateService> {
    store: Arc<CoordinateStore>,
    ai: A,
    workers: usize,
    cycle_deadline: Duration,
    dedup_window: chrono::Duration,
}

/// All reports of one normalized region, in input order.
struct RegionGroup {
    region: PlaceKey,
    reports: Vec<(PlaceKey, WeaponReport)>,
}

impl RegionGroup {
    fn city_place(&self, city: &PlaceKey) -> Place {
        Place::City {
            region: self.region.clone(),
            city: city.clone(),
        }
    }

    /// Distinct city keys in first-seen order.
    fn distinct_cities(&self) -> Vec<&PlaceKey> {
        let mut seen = Vec::new();
        for (city, _) in &self.reports {
            if !seen.contains(&city) {
                seen.push(city);
            }
        }
        seen
    }

    fn batch(&self) -> RegionBatch {
        RegionBatch {
            region: self.region.to_string(),
            weapons: self
                .reports
                .iter()
                .map(|(_, report)| BatchWeapon {
                    weapon_type: report.weapon_type.label().to_string(),
                    count: report.count,
                    target_city: report.city.clone(),
                })
                .collect(),
        }
    }
}

struct GroupOutcome {
    targets: Vec<ResolvedTarget>,
    stats: CycleStats,
}

/// Where a city's coordinate came from within one group.
struct Resolved {
    coordinate: Coordinate,
    via: ResolvedVia,
    source: String,
}

impl<A: CoordinateService> Resolver<A> {
    pub fn new(store: Arc<CoordinateStore>, ai: A, config: &ResolutionConfig) -> Self {
        Self {
            store,
            ai,
            workers: config.workers.max(1),
            cycle_deadline: config.cycle_deadline(),
            dedup_window: config.dedup_window(),
        }
    }

    pub fn store(&self) -> &CoordinateStore {
        &self.store
    }

    /// Resolves one cycle. Region groups run concurrently, at most `workers`
    /// at a time, and come back in first-appearance order. AI and validation
    /// failures only drop the affected weapons; an unreachable store aborts
    /// the cycle.
    pub async fn resolve_batch(&self, reports: Vec<WeaponReport>) -> Result<CycleOutcome> {
        let deadline = Instant::now() + self.cycle_deadline;
        let groups = group_by_region(reports);
        tracing::info!("🔄 Resolving {} region groups with {} workers", groups.len(), self.workers);

        let outcomes: Vec<GroupOutcome> = stream::iter(groups)
            .map(|group| async move { self.resolve_group_isolated(&group, deadline).await })
            .buffered(self.workers)
            .try_collect()
            .await?;

        let mut stats = CycleStats::default();
        let mut targets = Vec::new();
        for outcome in outcomes {
            merge_stats(&mut stats, &outcome.stats);
            targets.extend(outcome.targets);
        }

        let (targets, removed) = dedupe(targets, self.dedup_window);
        stats.deduplicated_count = removed;
        stats.resolved_count = targets.len();

        tracing::info!(
            "✅ Resolved {} targets ({} from cache, {} AI calls, {} dropped, {} duplicates)",
            stats.resolved_count,
            stats.cache_hit_count,
            stats.ai_call_count,
            stats.dropped_count,
            stats.deduplicated_count
        );

        Ok(CycleOutcome { targets, stats })
    }

    /// A pool timeout costs only this group.
    async fn resolve_group_isolated(&self, group: &RegionGroup, deadline: Instant) -> Result<GroupOutcome> {
        match self.resolve_group(group, deadline).await {
            Err(EngineError::PoolTimeout { operation }) => {
                tracing::warn!(
                    "⚠️ Dropping {} directions in {}: no storage connection for {}",
                    group.reports.len(),
                    group.region,
                    operation
                );
                let mut stats = CycleStats::default();
                stats.dropped.storage = group.reports.len();
                stats.dropped_count = group.reports.len();
                Ok(GroupOutcome {
                    targets: Vec::new(),
                    stats,
                })
            }
            other => other,
        }
    }

    async fn resolve_group(&self, group: &RegionGroup, deadline: Instant) -> Result<GroupOutcome> {
        let mut stats = CycleStats::default();
        let region_place = Place::Region(group.region.clone());
        let region_cached = self.store.lookup(&region_place).await?;

        let mut resolved: HashMap<PlaceKey, Resolved> = HashMap::new();
        let mut misses: Vec<PlaceKey> = Vec::new();
        for city in group.distinct_cities() {
            let place = group.city_place(city);
            match self.store.lookup(&place).await? {
                Some(coordinate) => {
                    let source = self
                        .store
                        .entry(&place)
                        .map(|entry| format!("database_{}", entry.source))
                        .unwrap_or_else(|| "database".to_string());
                    resolved.insert(
                        city.clone(),
                        Resolved {
                            coordinate,
                            via: ResolvedVia::Cache,
                            source,
                        },
                    );
                }
                None => misses.push(city.clone()),
            }
        }

        let mut ai_failed = false;
        if !misses.is_empty() || region_cached.is_none() {
            stats.ai_call_count += 1;
            match self.call_ai(group, deadline).await {
                Ok(resolution) => {
                    self.absorb_resolution(group, &misses, region_cached.is_none(), resolution, &mut resolved)
                        .await?;
                }
                Err(e) => {
                    tracing::error!("❌ AI resolution failed for {}: {}", group.region, e);
                    ai_failed = true;
                }
            }
        } else {
            tracing::debug!("All of {} served from cache", group.region);
        }

        let mut targets = Vec::with_capacity(group.reports.len());
        for (city, report) in &group.reports {
            match resolved.get(city) {
                Some(hit) => {
                    if hit.via == ResolvedVia::Cache {
                        stats.cache_hit_count += 1;
                    }
                    targets.push(ResolvedTarget {
                        region: group.region.clone(),
                        city: city.clone(),
                        weapon_type: report.weapon_type,
                        count: report.count,
                        coordinate: hit.coordinate,
                        resolved_via: hit.via,
                        source: hit.source.clone(),
                        observed_at: report.observed_at,
                    });
                }
                None => {
                    stats.dropped_count += 1;
                    if ai_failed {
                        stats.dropped.ai_failure += 1;
                    } else {
                        stats.dropped.validation += 1;
                    }
                }
            }
        }

        Ok(GroupOutcome { targets, stats })
    }

    async fn call_ai(
        &self,
        group: &RegionGroup,
        deadline: Instant,
    ) -> std::result::Result<RegionResolution, AiServiceError> {
        let batch = group.batch();
        match tokio::time::timeout_at(deadline, self.ai.resolve(&batch)).await {
            Ok(result) => result,
            Err(_) => Err(AiServiceError::DeadlineExceeded),
        }
    }

    /// Stores what the AI answered for cities that missed, and the region if
    /// it had no coordinate yet. Cached cities keep their stored values.
    async fn absorb_resolution(
        &self,
        group: &RegionGroup,
        misses: &[PlaceKey],
        region_missing: bool,
        resolution: RegionResolution,
        resolved: &mut HashMap<PlaceKey, Resolved>,
    ) -> Result<()> {
        if region_missing {
            if let Ok(coordinate) = resolution.region {
                let place = Place::Region(group.region.clone());
                self.store_coordinate(&place, coordinate, &resolution.source)
                    .await?;
            }
        }

        for ((city, _), target) in group.reports.iter().zip(resolution.targets) {
            if !misses.contains(city) || resolved.contains_key(city) {
                continue;
            }
            let Ok(coordinate) = target.coordinate else {
                continue;
            };
            if self
                .store_coordinate(&group.city_place(city), coordinate, &target.source)
                .await?
            {
                resolved.insert(
                    city.clone(),
                    Resolved {
                        coordinate,
                        via: ResolvedVia::Ai,
                        source: target.source,
                    },
                );
            }
        }
        Ok(())
    }

    /// Returns whether the coordinate is usable. A pool timeout on the write
    /// leaves the coordinate usable for this cycle but uncached.
    async fn store_coordinate(&self, place: &Place, coordinate: Coordinate, source: &str) -> Result<bool> {
        match self.store.put(place, coordinate, source).await {
            Ok(PutOutcome::Stored) => Ok(true),
            Ok(PutOutcome::Rejected(_)) => Ok(false),
            Err(EngineError::PoolTimeout { operation }) => {
                tracing::warn!("⚠️ Could not cache {} ({} timed out)", place, operation);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }
}

fn group_by_region(reports: Vec<WeaponReport>) -> Vec<RegionGroup> {
    let mut groups: Vec<RegionGroup> = Vec::new();
    let mut index: HashMap<PlaceKey, usize> = HashMap::new();

    for report in reports {
        let region = normalize(&report.region, PlaceKind::Region);
        let city = normalize(&report.city, PlaceKind::City);
        let slot = *index.entry(region.clone()).or_insert_with(|| {
            groups.push(RegionGroup {
                region,
                reports: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].reports.push((city, report));
    }
    groups
}

fn merge_stats(total: &mut CycleStats, group: &CycleStats) {
    total.ai_call_count += group.ai_call_count;
    total.cache_hit_count += group.cache_hit_count;
    total.dropped_count += group.dropped_count;
    total.dropped.ai_failure += group.dropped.ai_failure;
    total.dropped.validation += group.dropped.validation;
    total.dropped.storage += group.dropped.storage;
}
