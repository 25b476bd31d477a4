//! Per-company memo of stage results.
//!
//! Entries are keyed by normalized company identity and bounded by a maximum
//! number of companies; the least recently accessed company is evicted first.
//! Concurrent runs for the same company may both miss and both produce: the
//! cache guarantees at-most-duplicated work, never a torn entry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use outreach_shared::{Contact, StageKind, StageResult};

/// Normalized company identity: lower-cased name, plus the site host when known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompanyKey(String);

impl CompanyKey {
    pub fn for_contact(contact: &Contact) -> Self {
        let name = contact
            .company
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let host = contact
            .website
            .as_ref()
            .and_then(|u| u.host_str())
            .map(|h| h.trim_start_matches("www.").to_lowercase());
        match host {
            Some(host) => Self(format!("{name}|{host}")),
            None => Self(name),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Last result per stage for one company.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub results: HashMap<StageKind, StageResult>,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    tick: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CompanyKey, CacheEntry>,
    /// Monotonic access counter; timestamps alone can tie.
    clock: u64,
}

impl CacheState {
    fn touch(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

pub struct StageCache {
    state: Mutex<CacheState>,
    max_companies: usize,
}

impl StageCache {
    pub fn new(max_companies: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_companies: max_companies.max(1),
        }
    }

    pub async fn get(&self, key: &CompanyKey, stage: StageKind) -> Option<StageResult> {
        let mut state = self.state.lock().await;
        let tick = state.touch();
        let entry = state.entries.get_mut(key)?;
        let result = entry.results.get(&stage)?.clone();
        entry.tick = tick;
        entry.last_access = Utc::now();
        Some(result)
    }

    /// Every cached result for a company.
    pub async fn get_all(&self, key: &CompanyKey) -> HashMap<StageKind, StageResult> {
        let mut state = self.state.lock().await;
        let tick = state.touch();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.tick = tick;
                entry.last_access = Utc::now();
                entry.results.clone()
            }
            None => HashMap::new(),
        }
    }

    /// Store a result, replacing the previous one for that stage.
    pub async fn put(&self, key: &CompanyKey, result: StageResult) {
        let mut state = self.state.lock().await;
        let tick = state.touch();

        if !state.entries.contains_key(key) && state.entries.len() >= self.max_companies {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.tick)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!(evicted = oldest.as_str(), "cache full, evicting least recently used");
                state.entries.remove(&oldest);
            }
        }

        let now = Utc::now();
        let entry = state.entries.entry(key.clone()).or_insert_with(|| CacheEntry {
            results: HashMap::new(),
            created_at: now,
            last_access: now,
            tick,
        });
        entry.results.insert(result.stage(), result);
        entry.tick = tick;
        entry.last_access = now;
    }

    /// Number of companies cached.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use url::Url;

    use super::*;

    fn contact(company: &str, site: Option<&str>) -> Contact {
        Contact {
            company: company.into(),
            website: site.map(|s| Url::parse(s).expect("url")),
            industry: "logistics".into(),
            recipient_name: None,
        }
    }

    #[test]
    fn key_normalizes_name_and_host() {
        let a = CompanyKey::for_contact(&contact("  Northwind   Logistics ", None));
        assert_eq!(a.as_str(), "northwind logistics");

        let b = CompanyKey::for_contact(&contact(
            "Northwind Logistics",
            Some("https://www.Northwind.example.com/about"),
        ));
        assert_eq!(b.as_str(), "northwind logistics|northwind.example.com");
    }

    #[tokio::test]
    async fn put_then_get_returns_same_result() {
        let cache = StageCache::new(10);
        let key = CompanyKey::for_contact(&contact("Northwind", None));
        let result = StageResult::inferred(StageKind::Role, "Head of Operations");

        assert!(cache.get(&key, StageKind::Role).await.is_none());
        cache.put(&key, result.clone()).await;
        assert_eq!(cache.get(&key, StageKind::Role).await, Some(result));
        assert!(cache.get(&key, StageKind::Signal).await.is_none());
    }

    #[tokio::test]
    async fn evicts_least_recently_accessed_company() {
        let cache = StageCache::new(2);
        let a = CompanyKey::for_contact(&contact("A", None));
        let b = CompanyKey::for_contact(&contact("B", None));
        let c = CompanyKey::for_contact(&contact("C", None));

        cache.put(&a, StageResult::generic(StageKind::Role, "x")).await;
        cache.put(&b, StageResult::generic(StageKind::Role, "y")).await;
        // Touch A so B becomes the eviction candidate.
        assert!(cache.get(&a, StageKind::Role).await.is_some());
        cache.put(&c, StageResult::generic(StageKind::Role, "z")).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&a, StageKind::Role).await.is_some());
        assert!(cache.get(&b, StageKind::Role).await.is_none());
        assert!(cache.get(&c, StageKind::Role).await.is_some());
    }

    #[tokio::test]
    async fn concurrent_puts_keep_one_entry_per_company() {
        let cache = Arc::new(StageCache::new(4));
        let key = CompanyKey::for_contact(&contact("Northwind", None));

        let mut handles = Vec::new();
        for kind in StageKind::ALL {
            let cache = cache.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache.put(&key, StageResult::generic(kind, kind.as_str())).await;
            }));
        }
        for h in handles {
            h.await.expect("join");
        }

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get_all(&key).await.len(), 6);
    }
}
