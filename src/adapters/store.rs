use crate::config::toml_config::StoreConfig;
use crate::core::geo_validator::GeoValidator;
use crate::domain::model::{CacheEntry, Coordinate, Place, PutOutcome, StoreStats};
use crate::utils::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Sqlite;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Persistent coordinate cache for regions and cities.
///
/// Reads go to an in-process map first and fall back to SQLite. Writes are
/// validated, upserted, then mirrored into the map while holding a lock
/// scoped to that one place, so writers on different places never wait on
/// each other and same-place writers leave exactly one of their values behind.
pub struct CoordinateStore {
    pool: SqlitePool,
    validator: GeoValidator,
    memory: RwLock<HashMap<Place, CachedCoordinate>>,
    write_locks: Mutex<HashMap<Place, Arc<tokio::sync::Mutex<()>>>>,
}

struct CachedCoordinate {
    coordinate: Coordinate,
    source: String,
    hits: AtomicU64,
    /// Unix millis of the last hit, 0 when never read.
    last_used_ms: AtomicI64,
}

impl CachedCoordinate {
    fn new(coordinate: Coordinate, source: String) -> Self {
        Self {
            coordinate,
            source,
            hits: AtomicU64::new(0),
            last_used_ms: AtomicI64::new(0),
        }
    }

    fn touch(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.last_used_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn last_used(&self) -> Option<DateTime<Utc>> {
        match self.last_used_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CoordinateRow {
    latitude: f64,
    longitude: f64,
    confidence: f64,
    source: String,
}

impl CoordinateStore {
    pub async fn open(config: &StoreConfig, validator: GeoValidator) -> Result<Self> {
        if let Some(path) = database_file_path(&config.database_url) {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(EngineError::StorageUnavailable)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.acquire_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.acquire_timeout())
            .connect_with(options)
            .await
            .map_err(EngineError::StorageUnavailable)?;

        sqlx::raw_sql(include_str!("../../sql/schema.sql"))
            .execute(&pool)
            .await
            .map_err(EngineError::StorageUnavailable)?;

        tracing::info!(
            "🗄️ Coordinate store ready: {} (pool size {})",
            config.database_url,
            config.pool_size
        );

        Ok(Self {
            pool,
            validator,
            memory: RwLock::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
        })
    }

    pub async fn lookup(&self, place: &Place) -> Result<Option<Coordinate>> {
        if let Some(cached) = self.read_memory().get(place) {
            cached.touch();
            return Ok(Some(cached.coordinate));
        }

        let row = {
            let mut conn = self.acquire("lookup").await?;
            fetch_row(&mut conn, place).await?
        };
        let Some(row) = row else {
            return Ok(None);
        };

        let coordinate = Coordinate::new(row.latitude, row.longitude, row.confidence);
        if let Err(rejection) = self.validator.validate(&coordinate) {
            tracing::warn!("⚠️ Ignoring stored coordinate for {}: {}", place, rejection);
            return Ok(None);
        }

        tracing::debug!("Found in DB: {}", place);
        let mut memory = self.write_memory();
        // A put that landed while we were reading wins over the older row.
        let cached = memory
            .entry(place.clone())
            .or_insert_with(|| CachedCoordinate::new(coordinate, row.source));
        cached.touch();
        Ok(Some(cached.coordinate))
    }

    /// Copy of the in-process entry for `place`, if it has been loaded or
    /// written during this run.
    pub fn entry(&self, place: &Place) -> Option<CacheEntry> {
        self.read_memory().get(place).map(|cached| CacheEntry {
            key: place.key().clone(),
            kind: place.kind(),
            region_key: match place {
                Place::Region(_) => None,
                Place::City { region, .. } => Some(region.clone()),
            },
            coordinate: cached.coordinate,
            source: cached.source.clone(),
            hit_count: cached.hits.load(Ordering::Relaxed),
            last_used: cached.last_used(),
        })
    }

    pub async fn put(&self, place: &Place, coordinate: Coordinate, source: &str) -> Result<PutOutcome> {
        if let Err(rejection) = self.validator.validate(&coordinate) {
            tracing::warn!("⚠️ Not storing {}: {}", place, rejection);
            return Ok(PutOutcome::Rejected(rejection));
        }

        let key_lock = self.write_lock(place);
        let _guard = key_lock.lock().await;

        {
            let mut conn = self.acquire("put").await?;
            upsert_row(&mut conn, place, &coordinate, source).await?;
        }

        let mut memory = self.write_memory();
        match memory.get_mut(place) {
            Some(cached) => {
                cached.coordinate = coordinate;
                cached.source = source.to_string();
            }
            None => {
                memory.insert(
                    place.clone(),
                    CachedCoordinate::new(coordinate, source.to_string()),
                );
            }
        }

        tracing::info!(
            "💾 Saved {} -> {:.4}, {:.4} ({})",
            place,
            coordinate.latitude,
            coordinate.longitude,
            source
        );
        Ok(PutOutcome::Stored)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let (region_count, city_count, sources) = {
            let mut conn = self.acquire("stats").await?;
            let region_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM regions")
                .fetch_one(&mut *conn)
                .await?;
            let city_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cities")
                .fetch_one(&mut *conn)
                .await?;
            let sources: Vec<(String, i64)> =
                sqlx::query_as("SELECT source, COUNT(*) FROM cities GROUP BY source")
                    .fetch_all(&mut *conn)
                    .await?;
            (region_count, city_count, sources)
        };

        let total_hits = self
            .read_memory()
            .values()
            .map(|cached| cached.hits.load(Ordering::Relaxed))
            .sum();

        Ok(StoreStats {
            region_count: region_count.max(0) as u64,
            city_count: city_count.max(0) as u64,
            total_hits,
            city_sources: sources
                .into_iter()
                .map(|(source, count)| (source, count.max(0) as u64))
                .collect(),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// One pooled connection for the duration of a single operation. It goes
    /// back to the pool when the guard drops, whatever path the caller takes.
    async fn acquire(&self, operation: &str) -> Result<PoolConnection<Sqlite>> {
        self.pool.acquire().await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => EngineError::PoolTimeout {
                operation: operation.to_string(),
            },
            other => EngineError::StorageUnavailable(other),
        })
    }

    fn write_lock(&self, place: &Place) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(place.clone()).or_default().clone()
    }

    fn read_memory(&self) -> RwLockReadGuard<'_, HashMap<Place, CachedCoordinate>> {
        self.memory.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_memory(&self) -> RwLockWriteGuard<'_, HashMap<Place, CachedCoordinate>> {
        self.memory.write().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn fetch_row(
    conn: &mut PoolConnection<Sqlite>,
    place: &Place,
) -> Result<Option<CoordinateRow>> {
    let row = match place {
        Place::Region(key) => {
            sqlx::query_as::<_, CoordinateRow>(
                "SELECT latitude, longitude, confidence, source FROM regions WHERE key = ?1",
            )
            .bind(key.as_str())
            .fetch_optional(&mut **conn)
            .await?
        }
        Place::City { region, city } => {
            sqlx::query_as::<_, CoordinateRow>(
                "SELECT latitude, longitude, confidence, source FROM cities
                 WHERE region_key = ?1 AND key = ?2",
            )
            .bind(region.as_str())
            .bind(city.as_str())
            .fetch_optional(&mut **conn)
            .await?
        }
    };
    Ok(row)
}

async fn upsert_row(
    conn: &mut PoolConnection<Sqlite>,
    place: &Place,
    coordinate: &Coordinate,
    source: &str,
) -> Result<()> {
    let now = Utc::now();
    match place {
        Place::Region(key) => {
            sqlx::query(
                "INSERT INTO regions (key, latitude, longitude, confidence, source, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (key) DO UPDATE SET
                     latitude = excluded.latitude,
                     longitude = excluded.longitude,
                     confidence = excluded.confidence,
                     source = excluded.source,
                     updated_at = excluded.updated_at",
            )
            .bind(key.as_str())
            .bind(coordinate.latitude)
            .bind(coordinate.longitude)
            .bind(coordinate.confidence)
            .bind(source)
            .bind(now)
            .execute(&mut **conn)
            .await?;
        }
        Place::City { region, city } => {
            sqlx::query(
                "INSERT INTO cities (key, region_key, latitude, longitude, confidence, source, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (region_key, key) DO UPDATE SET
                     latitude = excluded.latitude,
                     longitude = excluded.longitude,
                     confidence = excluded.confidence,
                     source = excluded.source,
                     updated_at = excluded.updated_at",
            )
            .bind(city.as_str())
            .bind(region.as_str())
            .bind(coordinate.latitude)
            .bind(coordinate.longitude)
            .bind(coordinate.confidence)
            .bind(source)
            .bind(now)
            .execute(&mut **conn)
            .await?;
        }
    }
    Ok(())
}

/// Filesystem path behind a `sqlite:` URL, `None` for in-memory databases.
fn database_file_path(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::normalizer::normalize;
    use crate::domain::model::PlaceKind;
    use tempfile::TempDir;

    fn config(dir: &TempDir, pool_size: u32) -> StoreConfig {
        StoreConfig {
            database_url: format!("sqlite://{}", dir.path().join("coords.db").display()),
            pool_size,
            acquire_timeout_seconds: 1,
        }
    }

    fn kharkiv() -> Place {
        Place::City {
            region: normalize("Харківщина", PlaceKind::Region),
            city: normalize("Харків", PlaceKind::City),
        }
    }

    #[test]
    fn test_database_file_path() {
        assert_eq!(
            database_file_path("sqlite://db/coords.db"),
            Some(PathBuf::from("db/coords.db"))
        );
        assert_eq!(
            database_file_path("sqlite:coords.db?mode=rwc"),
            Some(PathBuf::from("coords.db"))
        );
        assert_eq!(database_file_path("sqlite::memory:"), None);
        assert_eq!(database_file_path("postgres://x"), None);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_fails_only_the_waiting_operation() {
        let dir = TempDir::new().unwrap();
        let store = CoordinateStore::open(&config(&dir, 1), GeoValidator::default())
            .await
            .unwrap();
        store
            .put(&kharkiv(), Coordinate::new(49.99, 36.23, 0.95), "Gemini")
            .await
            .unwrap();

        let _held = store.pool.acquire().await.unwrap();

        // Served from memory, no connection needed.
        assert!(store.lookup(&kharkiv()).await.unwrap().is_some());

        let uncached = Place::Region(normalize("Сумщина", PlaceKind::Region));
        let err = store.lookup(&uncached).await.unwrap_err();
        assert!(matches!(err, EngineError::PoolTimeout { ref operation } if operation == "lookup"));
    }

    #[tokio::test]
    async fn test_entry_tracks_hits() {
        let dir = TempDir::new().unwrap();
        let store = CoordinateStore::open(&config(&dir, 2), GeoValidator::default())
            .await
            .unwrap();
        store
            .put(&kharkiv(), Coordinate::new(49.99, 36.23, 0.95), "Gemini")
            .await
            .unwrap();

        let entry = store.entry(&kharkiv()).unwrap();
        assert_eq!(entry.hit_count, 0);
        assert!(entry.last_used.is_none());
        assert_eq!(entry.region_key.as_ref().unwrap().as_str(), "Харківщина");

        store.lookup(&kharkiv()).await.unwrap();
        store.lookup(&kharkiv()).await.unwrap();

        let entry = store.entry(&kharkiv()).unwrap();
        assert_eq!(entry.hit_count, 2);
        assert!(entry.last_used.is_some());
        assert_eq!(entry.source, "Gemini");
    }
}
