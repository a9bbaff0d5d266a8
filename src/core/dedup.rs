use crate::domain::model::{PlaceKey, ResolvedTarget, WeaponType};
use chrono::Duration;

/// Collapses repeated reports of one place and weapon type seen within
/// `window` of each other. The larger count wins (a later, equal count breaks
/// ties); counts are never summed. Survivors keep the slot of the first
/// report of their group. Returns the kept targets and how many were removed.
pub fn dedupe(targets: Vec<ResolvedTarget>, window: Duration) -> (Vec<ResolvedTarget>, usize) {
    let original = targets.len();
    let mut kept: Vec<ResolvedTarget> = Vec::with_capacity(original);

    for target in targets {
        let duplicate = kept.iter_mut().find(|existing| {
            same_identity(existing, &target)
                && (existing.observed_at - target.observed_at).abs() <= window
        });

        match duplicate {
            Some(existing) => {
                let supersedes = target.count > existing.count
                    || (target.count == existing.count && target.observed_at > existing.observed_at);
                if supersedes {
                    *existing = target;
                }
            }
            None => kept.push(target),
        }
    }

    let removed = original - kept.len();
    if removed > 0 {
        tracing::debug!("🔄 Deduplicated {} -> {} targets", original, kept.len());
    }
    (kept, removed)
}

fn identity(target: &ResolvedTarget) -> (&PlaceKey, &PlaceKey, WeaponType) {
    (&target.region, &target.city, target.weapon_type)
}

fn same_identity(a: &ResolvedTarget, b: &ResolvedTarget) -> bool {
    identity(a) == identity(b)
}
