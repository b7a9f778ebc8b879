//! Legal-entity lookup by tax id.
//!
//! [`EntityLookupService`] resolves a name and tax regime through a chain
//! of [`EntityRegistry`] collaborators. Each normalized id is resolved at
//! most once per process, even under concurrent batches, and failures are
//! cached as absent so they are not retried on every call.

pub mod sources;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, MemoryStore};
use crate::error::RegistryError;
use crate::fiscal::TaxRegime;
use crate::invoice::rules::TaxId;
use crate::models::config::LookupConfig;

pub use sources::RegistryRecord;
#[cfg(feature = "registry")]
pub use sources::{build_registries, HttpRegistry};

/// External registries the lookup can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrySource {
    /// brasilapi.com.br
    BrasilApi,
    /// publica.cnpj.ws
    CnpjWs,
    /// receitaws.com.br
    ReceitaWs,
    /// Test doubles and caller-provided registries.
    Custom,
}

impl RegistrySource {
    pub fn name(&self) -> &'static str {
        match self {
            RegistrySource::BrasilApi => "BrasilAPI",
            RegistrySource::CnpjWs => "CNPJ.ws",
            RegistrySource::ReceitaWs => "ReceitaWS",
            RegistrySource::Custom => "custom",
        }
    }
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An external legal-entity registry.
pub trait EntityRegistry: Send + Sync {
    fn source(&self) -> RegistrySource;

    fn resolve(&self, id: &TaxId) -> Result<RegistryRecord, RegistryError>;
}

/// What is known about a legal entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub regime: TaxRegime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_registration_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_registration_exempt: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<RegistrySource>,
}

impl EntityInfo {
    pub fn unknown() -> Self {
        Self {
            name: None,
            regime: TaxRegime::Unknown,
            state_registration_active: None,
            state_registration_exempt: None,
            source: None,
        }
    }

    pub fn from_record(record: RegistryRecord, source: RegistrySource) -> Self {
        Self {
            regime: record.regime(),
            name: record.name,
            state_registration_active: record.state_registration_active,
            state_registration_exempt: record.state_registration_exempt,
            source: Some(source),
        }
    }

    pub fn is_known(&self) -> bool {
        self.source.is_some()
    }
}

/// Cached outcome of resolving one id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "entity", rename_all = "snake_case")]
pub enum LookupOutcome {
    Found(EntityInfo),
    /// Every registry failed; not retried.
    Absent,
}

impl LookupOutcome {
    fn into_info(self) -> EntityInfo {
        match self {
            LookupOutcome::Found(info) => info,
            LookupOutcome::Absent => EntityInfo::unknown(),
        }
    }
}

/// Resolves entity names and regimes with at most one outbound resolution
/// per normalized id.
pub struct EntityLookupService {
    registries: Vec<Box<dyn EntityRegistry>>,
    cache: Arc<dyn CacheStore<LookupOutcome>>,
    cells: Mutex<HashMap<String, Arc<OnceLock<LookupOutcome>>>>,
    pause: Duration,
    use_root_establishment: bool,
    outbound_calls: AtomicUsize,
}

impl EntityLookupService {
    pub fn new(registries: Vec<Box<dyn EntityRegistry>>) -> Self {
        Self {
            registries,
            cache: Arc::new(MemoryStore::new()),
            cells: Mutex::new(HashMap::new()),
            pause: Duration::ZERO,
            use_root_establishment: true,
            outbound_calls: AtomicUsize::new(0),
        }
    }

    /// Build a service from configuration with the HTTP registries.
    #[cfg(feature = "registry")]
    pub fn from_config(config: &LookupConfig) -> crate::Result<Self> {
        let registries = build_registries(config)?;
        Ok(Self::new(registries).with_config(config))
    }

    /// Apply pause and normalization settings.
    pub fn with_config(mut self, config: &LookupConfig) -> Self {
        self.pause = Duration::from_millis(config.pause_ms);
        self.use_root_establishment = config.use_root_establishment;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore<LookupOutcome>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Number of registry calls made so far.
    pub fn outbound_calls(&self) -> usize {
        self.outbound_calls.load(Ordering::Relaxed)
    }

    /// Key an id is cached under.
    pub fn cache_key(&self, id: &TaxId) -> String {
        if self.use_root_establishment {
            if let Some(root) = id.root_establishment() {
                return root.digits().to_string();
            }
        }
        id.digits().to_string()
    }

    /// Resolve name and regime for `id`.
    ///
    /// Individuals (CPF) are never sent to a registry. Failures produce
    /// [`EntityInfo::unknown`].
    pub fn lookup(&self, id: &TaxId) -> EntityInfo {
        if !id.is_cnpj() {
            debug!("Skipping registry lookup for individual tax id");
            return EntityInfo::unknown();
        }

        let key = self.cache_key(id);
        let cell = match self.cells.lock() {
            Ok(mut cells) => Arc::clone(cells.entry(key.clone()).or_default()),
            Err(_) => {
                warn!("Lookup cell map poisoned; skipping lookup for {}", key);
                return EntityInfo::unknown();
            }
        };

        cell.get_or_init(|| {
            if let Some(hit) = self.cache.get(&key) {
                debug!("Lookup cache hit for {}", key);
                return hit;
            }

            let query = TaxId::parse(&key).unwrap_or_else(|| id.clone());
            let outcome = self.resolve_chain(&query);
            if let Err(e) = self.cache.put(&key, outcome.clone()) {
                warn!("Failed to persist lookup for {}: {}", key, e);
            }
            outcome
        })
        .clone()
        .into_info()
    }

    fn resolve_chain(&self, id: &TaxId) -> LookupOutcome {
        for (i, registry) in self.registries.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                std::thread::sleep(self.pause);
            }

            self.outbound_calls.fetch_add(1, Ordering::Relaxed);
            match registry.resolve(id) {
                Ok(record) => {
                    info!("Resolved {} via {}", id, registry.source());
                    return LookupOutcome::Found(EntityInfo::from_record(record, registry.source()));
                }
                Err(e) => {
                    warn!("{} lookup for {} failed: {}", registry.source(), id, e);
                }
            }
        }

        LookupOutcome::Absent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::JsonDirStore;
    use crate::fiscal::NormalRegime;

    struct CountingRegistry {
        calls: Arc<AtomicUsize>,
        result: Result<RegistryRecord, RegistryError>,
    }

    impl EntityRegistry for CountingRegistry {
        fn source(&self) -> RegistrySource {
            RegistrySource::Custom
        }

        fn resolve(&self, _id: &TaxId) -> Result<RegistryRecord, RegistryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.result.clone()
        }
    }

    fn record(name: &str, simplified: bool) -> RegistryRecord {
        RegistryRecord {
            name: Some(name.to_string()),
            simplified_option: Some(simplified),
            ..Default::default()
        }
    }

    fn counting(result: Result<RegistryRecord, RegistryError>) -> (Box<dyn EntityRegistry>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = CountingRegistry {
            calls: Arc::clone(&calls),
            result,
        };
        (Box::new(registry), calls)
    }

    #[test]
    fn test_lookup_resolves_and_caches() {
        let (registry, calls) = counting(Ok(record("ACME LTDA", true)));
        let service = EntityLookupService::new(vec![registry]);
        let id = TaxId::parse("11.222.333/0001-81").unwrap();

        let info = service.lookup(&id);
        assert_eq!(info.name.as_deref(), Some("ACME LTDA"));
        assert_eq!(info.regime, TaxRegime::Simplified);
        assert_eq!(service.lookup(&id), info);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_branches_share_the_head_office_entry() {
        let (registry, calls) = counting(Ok(record("ACME LTDA", false)));
        let service = EntityLookupService::new(vec![registry]);

        let head_office = TaxId::parse("11.222.333/0001-81").unwrap();
        let branch = TaxId::parse("11.222.333/0002-62").unwrap();
        assert_eq!(service.cache_key(&branch), "11222333000181");

        service.lookup(&head_office);
        let info = service.lookup(&branch);
        assert_eq!(info.regime, TaxRegime::Normal(NormalRegime::Unspecified));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fallback_chain_and_absent_caching() {
        let (first, first_calls) = counting(Err(RegistryError::RateLimited("first".into())));
        let (second, second_calls) = counting(Err(RegistryError::NotFound("second".into())));
        let service = EntityLookupService::new(vec![first, second]);
        let id = TaxId::parse("11.222.333/0001-81").unwrap();

        assert_eq!(service.lookup(&id), EntityInfo::unknown());
        assert_eq!(service.lookup(&id), EntityInfo::unknown());
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.outbound_calls(), 2);
    }

    #[test]
    fn test_falls_through_to_next_registry() {
        let (first, _) = counting(Err(RegistryError::Network("timeout".into())));
        let (second, _) = counting(Ok(record("BETA SA", false)));
        let service = EntityLookupService::new(vec![first, second]);

        let info = service.lookup(&TaxId::parse("11.222.333/0001-81").unwrap());
        assert_eq!(info.name.as_deref(), Some("BETA SA"));
        assert_eq!(info.source, Some(RegistrySource::Custom));
    }

    #[test]
    fn test_individuals_are_never_sent() {
        let (registry, calls) = counting(Ok(record("X", false)));
        let service = EntityLookupService::new(vec![registry]);
        let cpf = TaxId::parse("529.982.247-25").unwrap();

        assert_eq!(service.lookup(&cpf), EntityInfo::unknown());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_concurrent_lookups_resolve_once() {
        let (registry, calls) = counting(Ok(record("ACME LTDA", false)));
        let service = Arc::new(EntityLookupService::new(vec![registry]));
        let id = TaxId::parse("11.222.333/0001-81").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let id = id.clone();
                std::thread::spawn(move || service.lookup(&id))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().name.as_deref(), Some("ACME LTDA"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_persistent_cache_skips_registry() {
        let dir = tempfile::tempdir().unwrap();
        let id = TaxId::parse("11.222.333/0001-81").unwrap();

        {
            let (registry, _) = counting(Ok(record("ACME LTDA", true)));
            let cache = Arc::new(JsonDirStore::<LookupOutcome>::open(dir.path()).unwrap());
            EntityLookupService::new(vec![registry]).with_cache(cache).lookup(&id);
        }

        let (registry, calls) = counting(Ok(record("OTHER", false)));
        let cache = Arc::new(JsonDirStore::<LookupOutcome>::open(dir.path()).unwrap());
        let service = EntityLookupService::new(vec![registry]).with_cache(cache);
        assert_eq!(service.lookup(&id).name.as_deref(), Some("ACME LTDA"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
