//! Freshness-aware result cache.
//!
//! Derived artifacts are cached under deterministic keys of the form
//! `prefix:query:date_from_iso:date_to_iso`. Their lifetime depends on how
//! recent the queried window is, not on how often they are read: a window
//! that is still open keeps growing and expires quickly, a closed one is
//! stable and is kept for days.
//!
//! # Architecture
//!
//! - [`CacheStore`]: raw string storage with per-entry expiry
//! - [`MemoryStore`], [`FileStore`]: the two stores, selected at runtime through [`Store`]
//! - [`ResultCache`]: typed access on top of a store; never fails the caller

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::error::{NewsError, Result};
use crate::fetcher::secs_f64;
use crate::utils::{date_from_to_str, date_to_to_str, end_of_day, truncate_for_log};

/// Join key parts with `:`.
pub fn key(parts: &[&str]) -> String {
    parts.join(":")
}

/// Cache key for an artifact derived from a query over a date window.
pub fn key_query(prefix: &str, query: &str, date_from: NaiveDate, date_to: NaiveDate) -> String {
    key(&[
        prefix,
        query,
        &date_from_to_str(date_from),
        &date_to_to_str(date_to),
    ])
}

/// Lifetimes assigned to cached artifacts.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TtlPolicy {
    /// Lifetime for windows ending within `freshness_threshold` of now.
    #[serde(with = "secs_f64")]
    pub fresh_ttl: Duration,
    /// Lifetime for windows that closed earlier.
    #[serde(with = "secs_f64")]
    pub old_ttl: Duration,
    #[serde(with = "secs_f64")]
    pub freshness_threshold: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            fresh_ttl: Duration::from_secs(3600 * 3),
            old_ttl: Duration::from_secs(3600 * 24 * 7),
            freshness_threshold: Duration::from_secs(3600 * 24 * 2),
        }
    }
}

impl TtlPolicy {
    /// TTL for artifacts of a window ending on `date_to`.
    pub fn calc_ttl(&self, date_to: NaiveDate) -> Duration {
        self.calc_ttl_at(end_of_day(date_to), Utc::now().naive_utc())
    }

    /// TTL for a window ending at `date_to`, evaluated at `now`.
    pub fn calc_ttl_at(&self, date_to: NaiveDateTime, now: NaiveDateTime) -> Duration {
        let age = (now - date_to).to_std().unwrap_or(Duration::ZERO);
        if age < self.freshness_threshold {
            self.fresh_ttl
        } else {
            self.old_ttl
        }
    }
}

/// Raw string storage with per-entry expiry.
pub trait CacheStore {
    async fn exists(&self, key: &str) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Remaining lifetime of a live entry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;
}

/// In-process store. Entries vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn live(&self, key: &str) -> Option<(String, Instant)> {
        let mut entries = self.entries.lock().await;
        let expired = entries
            .get(key)
            .is_some_and(|(_, deadline)| *deadline <= Instant::now());
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).cloned()
    }
}

impl CacheStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live(key).await.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live(key).await.map(|(value, _)| value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let deadline = Instant::now() + ttl;
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value, deadline));
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self
            .live(key)
            .await
            .map(|(_, deadline)| deadline.saturating_duration_since(Instant::now())))
    }
}

/// Longest file stem written by [`FileStore`], well under `NAME_MAX` (255).
const MAX_FILE_STEM: usize = 200;

/// FNV-1a, 64 bit. Stable across runs and toolchains.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn file_stem(key: &str) -> String {
    let encoded = urlencoding::encode(key);
    if encoded.len() <= MAX_FILE_STEM {
        return encoded.into_owned();
    }
    // 16 hex digits plus the separator
    let keep = MAX_FILE_STEM - 17;
    format!("{}-{:016x}", &encoded[..keep], fnv1a(key.as_bytes()))
}

#[derive(Debug, Deserialize, Serialize)]
struct FileEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Store keeping one JSON file per key under a directory.
///
/// File names are the URL-encoded keys. Keys longer than [`MAX_FILE_STEM`]
/// are cut and suffixed with a hash of the full key. Expired files are
/// removed when read.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a cache directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    async fn live(&self, key: &str) -> Result<Option<FileEntry>> {
        let path = self.path(key);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(NewsError::Cache(format!("{}: {e}", path.display()))),
        };
        let entry: FileEntry = serde_json::from_str(&raw)
            .map_err(|e| NewsError::Cache(format!("{}: {e}", path.display())))?;
        if entry.expires_at <= Utc::now() {
            debug!(key, "Removing expired cache file");
            let _ = fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(entry))
    }
}

impl CacheStore for FileStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live(key).await?.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live(key).await?.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| NewsError::Cache(format!("ttl out of range: {e}")))?;
        let entry = FileEntry {
            value,
            expires_at: Utc::now() + ttl,
        };
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&entry)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self
            .live(key)
            .await?
            .and_then(|e| (e.expires_at - Utc::now()).to_std().ok()))
    }
}

/// Store selected at startup.
#[derive(Debug)]
pub enum Store {
    Memory(MemoryStore),
    File(FileStore),
}

impl CacheStore for Store {
    async fn exists(&self, key: &str) -> Result<bool> {
        match self {
            Store::Memory(s) => s.exists(key).await,
            Store::File(s) => s.exists(key).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            Store::Memory(s) => s.get(key).await,
            Store::File(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        match self {
            Store::Memory(s) => s.set(key, value, ttl).await,
            Store::File(s) => s.set(key, value, ttl).await,
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        match self {
            Store::Memory(s) => s.ttl(key).await,
            Store::File(s) => s.ttl(key).await,
        }
    }
}

/// Best-effort decoding of a stored value: integer, float, JSON, else string.
pub fn coerce(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        return Value::Number(n);
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Scalars and strings are stored as plain text, everything else as JSON.
fn encode(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Typed cache access that never fails the caller.
///
/// Store errors are logged: reads degrade to misses and writes are dropped.
#[derive(Debug)]
pub struct ResultCache<S> {
    store: S,
    ttl_policy: TtlPolicy,
}

impl<S> ResultCache<S>
where
    S: CacheStore,
{
    pub fn new(store: S, ttl_policy: TtlPolicy) -> Self {
        Self { store, ttl_policy }
    }

    pub fn calc_ttl(&self, date_to: NaiveDate) -> Duration {
        self.ttl_policy.calc_ttl(date_to)
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.store.exists(key).await.unwrap_or_else(|e| {
            warn!(key, error = %e, "Cache lookup failed");
            false
        })
    }

    /// Whether `prefix:query:from:to` is cached for every prefix.
    pub async fn all_exist(
        &self,
        prefixes: &[&str],
        query: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> bool {
        for prefix in prefixes {
            if !self.exists(&key_query(prefix, query, date_from, date_to)).await {
                return false;
            }
        }
        true
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        self.store.get(key).await.unwrap_or_else(|e| {
            warn!(key, error = %e, "Cache read failed");
            None
        })
    }

    /// Read a value with best-effort type coercion.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_raw(key).await.map(|raw| coerce(&raw))
    }

    /// Read a value into `T`.
    ///
    /// Falls back to the raw string when coercion picked the wrong shape,
    /// e.g. a cached text that happens to look like a number.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        serde_json::from_value(coerce(&raw))
            .or_else(|_| serde_json::from_value(Value::String(raw)))
            .map_err(|e| warn!(key, error = %e, "Cached value has unexpected shape"))
            .ok()
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let encoded = match serde_json::to_value(value) {
            Ok(v) => encode(&v),
            Err(e) => {
                warn!(key, error = %e, "Cannot serialize value for cache");
                return;
            }
        };
        debug!(key, ttl_secs = ttl.as_secs(), value = %truncate_for_log(&encoded, 100), "Caching");
        if let Err(e) = self.store.set(key, encoded, ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    /// Remaining lifetime of `key`, if it is cached.
    pub async fn get_ttl(&self, key: &str) -> Option<Duration> {
        self.store.ttl(key).await.unwrap_or_else(|e| {
            warn!(key, error = %e, "Cache TTL lookup failed");
            None
        })
    }

    /// Return the cached value for `key`, or compute, cache and return it.
    ///
    /// Errors from `compute` are returned and nothing is cached.
    #[instrument(level = "debug", skip(self, compute))]
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get_as(key).await {
            debug!("Cache hit");
            return Ok(value);
        }
        let value = compute().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn memory_cache() -> ResultCache<Store> {
        ResultCache::new(Store::Memory(MemoryStore::new()), TtlPolicy::default())
    }

    /// Store whose every operation fails.
    struct BrokenStore;

    impl CacheStore for BrokenStore {
        async fn exists(&self, _: &str) -> Result<bool> {
            Err(NewsError::Cache("down".into()))
        }
        async fn get(&self, _: &str) -> Result<Option<String>> {
            Err(NewsError::Cache("down".into()))
        }
        async fn set(&self, _: &str, _: String, _: Duration) -> Result<()> {
            Err(NewsError::Cache("down".into()))
        }
        async fn ttl(&self, _: &str) -> Result<Option<Duration>> {
            Err(NewsError::Cache("down".into()))
        }
    }

    #[test]
    fn test_key_query_is_deterministic() {
        let a = key_query("news_count", "climate", d(2023, 4, 3), d(2023, 4, 9));
        let b = key_query("news_count", "climate", d(2023, 4, 3), d(2023, 4, 9));
        assert_eq!(a, b);
        assert_eq!(a, "news_count:climate:2023-04-03T00:00:00:2023-04-09T23:59:59");
        assert_ne!(a, key_query("news_count", "climate", d(2023, 4, 3), d(2023, 4, 10)));
        assert_eq!(key(&["top_news_item", "abc"]), "top_news_item:abc");
    }

    #[test]
    fn test_calc_ttl_fresh_and_stale() {
        let policy = TtlPolicy::default();
        let now = Utc::now().naive_utc();
        assert_eq!(
            policy.calc_ttl_at(now - chrono::Duration::hours(2), now),
            Duration::from_secs(10800)
        );
        assert_eq!(policy.calc_ttl(d(2023, 4, 9)), Duration::from_secs(604800));
        assert_eq!(policy.calc_ttl(Utc::now().date_naive()), Duration::from_secs(10800));
    }

    #[test]
    fn test_calc_ttl_is_monotone_in_date_to() {
        let policy = TtlPolicy::default();
        let now = d(2024, 1, 10).and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        let ttls: Vec<Duration> = (0..10)
            .map(|days| policy.calc_ttl_at(end_of_day(d(2024, 1, 10) - chrono::Days::new(days)), now))
            .collect();
        // older windows never get a shorter TTL than newer ones
        assert!(ttls.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ttls[0], policy.fresh_ttl);
        assert_eq!(ttls[9], policy.old_ttl);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(coerce("42"), json!(42));
        assert_eq!(coerce("4.5"), json!(4.5));
        assert_eq!(coerce(r#"{"a":[1]}"#), json!({"a": [1]}));
        assert_eq!(coerce("plain text"), json!("plain text"));
        assert_eq!(coerce(""), json!(""));
    }

    #[tokio::test]
    async fn test_set_get_roundtrip_values() {
        let cache = memory_cache();
        let ttl = Duration::from_secs(60);
        cache.set("count", &150u64, ttl).await;
        cache.set("text", &"Some summary.", ttl).await;
        cache.set("list", &vec!["a", "b"], ttl).await;

        assert_eq!(cache.get("count").await, Some(json!(150)));
        assert_eq!(cache.get("text").await, Some(json!("Some summary.")));
        assert_eq!(cache.get_as::<Vec<String>>("list").await, Some(vec!["a".into(), "b".into()]));
        assert_eq!(cache.get("missing").await, None);
        assert!(cache.exists("count").await);
        assert!(!cache.exists("missing").await);
    }

    #[tokio::test]
    async fn test_get_as_keeps_numeric_looking_strings() {
        let cache = memory_cache();
        cache.set("s", &"2024", Duration::from_secs(60)).await;
        assert_eq!(cache.get_as::<String>("s").await, Some("2024".to_string()));
        assert_eq!(cache.get_as::<u64>("s").await, Some(2024));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_entries_expire() {
        let cache = memory_cache();
        cache.set("k", &1, Duration::from_secs(10)).await;
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.get_ttl("k").await, Some(Duration::from_secs(6)));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!cache.exists("k").await);
        assert_eq!(cache.get_ttl("k").await, None);
    }

    #[tokio::test]
    async fn test_all_exist() {
        let cache = memory_cache();
        let (from, to) = (d(2023, 4, 3), d(2023, 4, 9));
        let ttl = Duration::from_secs(60);
        cache.set(&key_query("news_count", "q1", from, to), &3, ttl).await;
        assert!(!cache.all_exist(&["news_count", "important_news"], "q1", from, to).await);
        cache.set(&key_query("important_news", "q1", from, to), &json!([]), ttl).await;
        assert!(cache.all_exist(&["news_count", "important_news"], "q1", from, to).await);
        assert!(!cache.all_exist(&["news_count"], "q2", from, to).await);
    }

    #[tokio::test]
    async fn test_get_or_compute_caches_on_miss_only() {
        let cache = memory_cache();
        let ttl = Duration::from_secs(60);
        let mut calls = 0;
        let first: String = cache
            .get_or_compute("summary_input", ttl, || {
                calls += 1;
                async { Ok("computed".to_string()) }
            })
            .await
            .unwrap();
        let second: String = cache
            .get_or_compute("summary_input", ttl, || {
                calls += 1;
                async { Ok("recomputed".to_string()) }
            })
            .await
            .unwrap();
        assert_eq!(first, "computed");
        assert_eq!(second, "computed");
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_does_not_cache_errors() {
        let cache = memory_cache();
        let ttl = Duration::from_secs(60);
        let err = cache
            .get_or_compute::<String, _, _>("k", ttl, || async {
                Err(NewsError::RequestFailed("down".into()))
            })
            .await;
        assert!(err.is_err());
        assert!(!cache.exists("k").await);
    }

    #[tokio::test]
    async fn test_broken_store_degrades_to_compute() {
        let cache = ResultCache::new(BrokenStore, TtlPolicy::default());
        assert!(!cache.exists("k").await);
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.get_ttl("k").await, None);
        cache.set("k", &1, Duration::from_secs(1)).await;
        let value: u64 = cache
            .get_or_compute("k", Duration::from_secs(1), || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_file_store_roundtrip_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("cache")).await.unwrap();
        let cache = ResultCache::new(Store::File(store.clone()), TtlPolicy::default());

        let k = key_query("important_news", "q/with:odd chars", d(2023, 4, 3), d(2023, 4, 9));
        cache.set(&k, &json!([{"x": 1}]), Duration::from_secs(3600)).await;
        assert_eq!(cache.get(&k).await, Some(json!([{"x": 1}])));
        let ttl = cache.get_ttl(&k).await.unwrap();
        assert!(ttl > Duration::from_secs(3500) && ttl <= Duration::from_secs(3600));

        store.set("gone", "1".into(), Duration::ZERO).await.unwrap();
        assert!(!store.exists("gone").await.unwrap());
        assert!(!store.path("gone").exists());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        tokio::fs::write(store.path("bad"), b"not json").await.unwrap();
        assert!(store.get("bad").await.is_err());

        let cache = ResultCache::new(Store::File(store), TtlPolicy::default());
        assert_eq!(cache.get("bad").await, None);
    }

    #[tokio::test]
    async fn test_file_store_long_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let cache = ResultCache::new(Store::File(store.clone()), TtlPolicy::default());

        let long = "central bank interest rates ".repeat(11);
        let a = key_query("news", &format!("{long}inflation"), d(2023, 4, 3), d(2023, 4, 9));
        let b = key_query("news", &format!("{long}mortgages"), d(2023, 4, 3), d(2023, 4, 9));
        assert!(a.len() > 300);

        cache.set(&a, &json!("a"), Duration::from_secs(60)).await;
        cache.set(&b, &json!("b"), Duration::from_secs(60)).await;
        assert_eq!(cache.get(&a).await, Some(json!("a")));
        assert_eq!(cache.get(&b).await, Some(json!("b")));

        let (pa, pb) = (store.path(&a), store.path(&b));
        assert_ne!(pa, pb);
        for p in [&pa, &pb] {
            let name = p.file_name().unwrap().to_str().unwrap();
            assert!(name.len() <= 255, "{name}");
            assert!(p.exists());
        }

        // short keys keep their readable name
        assert!(store.path("short:key").ends_with("short%3Akey.json"));
    }
}
