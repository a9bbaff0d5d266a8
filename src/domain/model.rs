use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Normalized place name used as a store key. Only the normalizer builds these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceKey(String);

impl PlaceKey {
    pub(crate) fn from_normalized(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaceKind {
    Region,
    City,
}

/// Store address of a place. Cities are scoped by region so that equally
/// named settlements in different regions stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Place {
    Region(PlaceKey),
    City { region: PlaceKey, city: PlaceKey },
}

impl Place {
    pub fn kind(&self) -> PlaceKind {
        match self {
            Place::Region(_) => PlaceKind::Region,
            Place::City { .. } => PlaceKind::City,
        }
    }

    pub fn key(&self) -> &PlaceKey {
        match self {
            Place::Region(key) => key,
            Place::City { city, .. } => city,
        }
    }

    pub fn region_key(&self) -> &PlaceKey {
        match self {
            Place::Region(key) => key,
            Place::City { region, .. } => region,
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Region(key) => write!(f, "{}", key),
            Place::City { region, city } => write!(f, "{} / {}", region, city),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub confidence: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64, confidence: f64) -> Self {
        Self {
            latitude,
            longitude,
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub key: PlaceKey,
    pub kind: PlaceKind,
    pub region_key: Option<PlaceKey>,
    pub coordinate: Coordinate,
    pub source: String,
    pub hit_count: u64,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponType {
    #[serde(rename = "UAV")]
    Uav,
    CruiseMissile,
    Ballistic,
}

impl WeaponType {
    /// Canonical type for a free-text weapon label. Unrecognised labels are
    /// treated as drones, by far the most common report.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "x101" | "х101" | "кр" | "крилата ракета" | "крилата" | "крилатая ракета"
            | "cruise" | "cruise_missile" | "cruisemissile" | "калібр" => {
                WeaponType::CruiseMissile
            }
            "balistic" | "ballistic" | "балістика" | "баллистика" | "кинжал" | "kinzhal"
            | "іскандер" => WeaponType::Ballistic,
            _ => WeaponType::Uav,
        }
    }

    /// Label sent to the AI service, in the wording the alert channels use.
    pub fn label(&self) -> &'static str {
        match self {
            WeaponType::Uav => "БпЛА",
            WeaponType::CruiseMissile => "Х101",
            WeaponType::Ballistic => "Балістика",
        }
    }
}

/// One direction line of an alert: `count` weapons of a type heading for a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponReport {
    pub region: String,
    pub city: String,
    pub weapon_type: WeaponType,
    pub count: u32,
    pub observed_at: DateTime<Utc>,
}

impl WeaponReport {
    /// Counts below one are clamped; a direction line always means at least
    /// one weapon.
    pub fn new(
        region: impl Into<String>,
        city: impl Into<String>,
        weapon_type: WeaponType,
        count: u32,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            region: region.into(),
            city: city.into(),
            weapon_type,
            count: count.max(1),
            observed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedVia {
    Cache,
    #[serde(rename = "AI")]
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub region: PlaceKey,
    pub city: PlaceKey,
    pub weapon_type: WeaponType,
    pub count: u32,
    pub coordinate: Coordinate,
    pub resolved_via: ResolvedVia,
    pub source: String,
    pub observed_at: DateTime<Utc>,
}

/// Input to one AI call: every weapon of a region-batch, hits included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionBatch {
    pub region: String,
    pub weapons: Vec<BatchWeapon>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchWeapon {
    pub weapon_type: String,
    pub count: u32,
    pub target_city: String,
}

/// Outcome of a validated AI answer. `targets` lines up index for index with
/// the batch's `weapons`; each item carries its own validation result.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionResolution {
    pub region: Result<Coordinate, Rejection>,
    pub source: String,
    pub targets: Vec<TargetResolution>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetResolution {
    pub city: String,
    pub coordinate: Result<Coordinate, Rejection>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Rejection {
    OutOfBounds { latitude: f64, longitude: f64 },
    LowConfidence { confidence: f64, floor: f64 },
    MalformedValue(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::OutOfBounds {
                latitude,
                longitude,
            } => write!(f, "({}, {}) is outside the bounding box", latitude, longitude),
            Rejection::LowConfidence { confidence, floor } => {
                write!(f, "confidence {} is below {}", confidence, floor)
            }
            Rejection::MalformedValue(reason) => write!(f, "malformed value: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    Stored,
    Rejected(Rejection),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub region_count: u64,
    pub city_count: u64,
    pub total_hits: u64,
    pub city_sources: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropReasons {
    pub ai_failure: usize,
    pub validation: usize,
    pub storage: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub resolved_count: usize,
    pub ai_call_count: usize,
    pub cache_hit_count: usize,
    pub dropped_count: usize,
    pub deduplicated_count: usize,
    pub dropped: DropReasons,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub targets: Vec<ResolvedTarget>,
    pub stats: CycleStats,
}

/// What the rendering collaborator receives for one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    pub generated_at: DateTime<Utc>,
    pub targets: Vec<ResolvedTarget>,
    pub stats: CycleStats,
    pub store: StoreStats,
    pub total_weapons_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weapon_type_from_label() {
        assert_eq!(WeaponType::from_label("БпЛА"), WeaponType::Uav);
        assert_eq!(WeaponType::from_label("шахед"), WeaponType::Uav);
        assert_eq!(WeaponType::from_label("КР"), WeaponType::CruiseMissile);
        assert_eq!(WeaponType::from_label(" Х101 "), WeaponType::CruiseMissile);
        assert_eq!(WeaponType::from_label("Кинжал"), WeaponType::Ballistic);
        assert_eq!(WeaponType::from_label("ballistic"), WeaponType::Ballistic);
        assert_eq!(WeaponType::from_label("щось"), WeaponType::Uav);
    }

    #[test]
    fn test_weapon_type_serde_names() {
        assert_eq!(serde_json::to_string(&WeaponType::Uav).unwrap(), "\"UAV\"");
        assert_eq!(
            serde_json::to_string(&WeaponType::CruiseMissile).unwrap(),
            "\"CruiseMissile\""
        );
        assert_eq!(serde_json::to_string(&ResolvedVia::Ai).unwrap(), "\"AI\"");
    }

    #[test]
    fn test_report_count_is_at_least_one() {
        let report = WeaponReport::new("Сумщина", "Суми", WeaponType::Uav, 0, Utc::now());
        assert_eq!(report.count, 1);
    }

    #[test]
    fn test_place_accessors() {
        let region = PlaceKey::from_normalized("Харківщина".into());
        let city = PlaceKey::from_normalized("Харків".into());
        let place = Place::City {
            region: region.clone(),
            city: city.clone(),
        };
        assert_eq!(place.kind(), PlaceKind::City);
        assert_eq!(place.key(), &city);
        assert_eq!(place.region_key(), &region);
        assert_eq!(place.to_string(), "Харківщина / Харків");
    }
}
