use crate::core::normalizer::normalize;
use crate::domain::model::{PlaceKey, PlaceKind, WeaponReport, WeaponType};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Bulletins that summarise a whole night or launch wave rather than report
/// live directions.
const SUMMARY_MARKERS: [&str; 3] = [
    "Ситуація станом на 00:00",
    "Зафіксовано пуски ударних",
    "Пуски КАБ",
];

/// Missiles per reported cruise-missile group.
const MISSILES_PER_GROUP: u32 = 2;

static GROUP_KR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:([0-9]+)\s*[хx]?\s+)?груп[аи]?\s+кр\s+курсом\s+на\s+(.+)")
        .unwrap()
});

static DIRECTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:([0-9]+)\s*[хx]?\s+)?(\S+)\s+курсом\s+на\s+(.+)")
        .unwrap()
});

/// One message as exported from the alert channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub message_id: i64,
    #[serde(default)]
    pub text: String,
    pub date: DateTime<Utc>,
}

/// Direction lines under one region header, taken from a single message.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionBlock {
    pub region: String,
    pub lines: Vec<String>,
    pub observed_at: DateTime<Utc>,
}

pub fn filter_recent(messages: Vec<RawMessage>, now: DateTime<Utc>, window: Duration) -> Vec<RawMessage> {
    let total = messages.len();
    let kept: Vec<RawMessage> = messages
        .into_iter()
        .filter(|m| !m.text.trim().is_empty())
        .filter(|m| now - m.date <= window)
        .filter(|m| !SUMMARY_MARKERS.iter().any(|marker| m.text.contains(marker)))
        .collect();
    tracing::debug!("Kept {} of {} messages as recent", kept.len(), total);
    kept
}

/// Splits every message into region blocks and keeps, per region, the block
/// from the newest message. Regions are keyed by their normalized name so
/// differently spelled headers merge; output is ordered by that key.
pub fn merge_latest_by_region(messages: &[RawMessage]) -> Vec<RegionBlock> {
    let mut latest: BTreeMap<PlaceKey, RegionBlock> = BTreeMap::new();

    for message in messages {
        for block in split_blocks(message) {
            let key = normalize(&block.region, PlaceKind::Region);
            let newer = latest
                .get(&key)
                .map_or(true, |existing| block.observed_at > existing.observed_at);
            if newer {
                latest.insert(key, block);
            }
        }
    }

    latest.into_values().collect()
}

fn split_blocks(message: &RawMessage) -> Vec<RegionBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<RegionBlock> = None;

    for line in message.text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(header) = line.strip_suffix(':') {
            if let Some(block) = current.take().filter(|b| !b.lines.is_empty()) {
                blocks.push(block);
            }
            current = Some(RegionBlock {
                region: header.trim().to_string(),
                lines: Vec::new(),
                observed_at: message.date,
            });
        } else if let Some(block) = current.as_mut() {
            block.lines.push(line.to_string());
        }
    }

    if let Some(block) = current.filter(|b| !b.lines.is_empty()) {
        blocks.push(block);
    }
    blocks
}

pub fn parse_reports(blocks: &[RegionBlock]) -> Vec<WeaponReport> {
    let mut reports = Vec::new();

    for block in blocks {
        for line in &block.lines {
            match parse_direction(line) {
                Some((weapon_type, count, city)) => reports.push(WeaponReport::new(
                    block.region.clone(),
                    city,
                    weapon_type,
                    count,
                    block.observed_at,
                )),
                None => tracing::debug!("Skipping line without a direction: {}", line),
            }
        }
    }

    tracing::info!("📋 Parsed {} directions from {} regions", reports.len(), blocks.len());
    reports
}

fn parse_direction(line: &str) -> Option<(WeaponType, u32, String)> {
    if let Some(caps) = GROUP_KR_LINE.captures(line) {
        let groups = parse_count(caps.get(1).map(|m| m.as_str()));
        let city = caps.get(2)?.as_str().trim().to_string();
        return Some((
            WeaponType::CruiseMissile,
            groups.saturating_mul(MISSILES_PER_GROUP),
            city,
        ));
    }

    let caps = DIRECTION_LINE.captures(line)?;
    let count = parse_count(caps.get(1).map(|m| m.as_str()));
    let weapon_type = WeaponType::from_label(caps.get(2)?.as_str());
    let city = caps.get(3)?.as_str().trim().to_string();
    if city.is_empty() {
        return None;
    }
    Some((weapon_type, count, city))
}

/// A missing count means one weapon. Digit runs too large for `u32`
/// saturate instead of being read as one.
fn parse_count(raw: Option<&str>) -> u32 {
    match raw {
        None => 1,
        Some(digits) => digits.parse().unwrap_or_else(|_| {
            tracing::debug!("Count {} does not fit, saturating to {}", digits, u32::MAX);
            u32::MAX
        }),
    }
}
