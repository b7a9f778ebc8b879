//! End-to-end document processing.
//!
//! bytes → content hash → (cached) acquisition + parsing + semantic
//! enrichment → registry enrichment → credit determination.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::acquisition::{Acquisition, TextAcquirer};
use crate::cache::{CacheStore, JsonDirStore, MemoryStore};
use crate::fiscal::{CreditDetermination, CreditEngine, TaxRegime};
use crate::invoice::{DanfeParser, InvoiceParser};
use crate::lookup::{EntityLookupService, LookupOutcome};
use crate::models::{DanfeConfig, InvoiceRecord, Party};
use crate::semantic::SemanticExtractor;

/// Everything produced for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub record: InvoiceRecord,

    /// Present when credit analysis was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub determination: Option<CreditDetermination>,

    /// Pipeline-level soft failures (lookup, cache, collaborator).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,

    /// Extraction was served from the content-hash cache.
    #[serde(default)]
    pub cached: bool,

    #[serde(default)]
    pub processing_time_ms: u64,
}

/// Hex blake3 digest used as the extraction cache key.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Document processing pipeline.
pub struct Pipeline {
    acquirer: TextAcquirer,
    parser: DanfeParser,
    engine: CreditEngine,
    extraction_cache: Arc<dyn CacheStore<InvoiceRecord>>,
    lookup: Option<Arc<EntityLookupService>>,
    semantic: Option<Arc<dyn SemanticExtractor>>,
    analyze: bool,
    recipient_regime: Option<TaxRegime>,
    issuer_regime: Option<TaxRegime>,
    workers: usize,
}

impl Pipeline {
    /// Pipeline without registry lookups, semantic collaborator or
    /// persistent caches.
    pub fn new(config: &DanfeConfig) -> Self {
        Self {
            acquirer: TextAcquirer::from_config(config),
            parser: DanfeParser::from_config(&config.extraction),
            engine: CreditEngine::new(config.fiscal.clone()),
            extraction_cache: Arc::new(MemoryStore::new()),
            lookup: None,
            semantic: None,
            analyze: false,
            recipient_regime: None,
            issuer_regime: None,
            workers: config.batch.workers,
        }
    }

    /// Pipeline with everything the configuration enables: persistent
    /// caches under `cache.directory` and, with the `registry` feature, the
    /// HTTP registries.
    pub fn from_config(config: &DanfeConfig) -> crate::Result<Self> {
        let mut pipeline = Self::new(config);

        let lookup_cache: Arc<dyn CacheStore<LookupOutcome>> = match &config.cache.directory {
            Some(dir) => {
                pipeline.extraction_cache = Arc::new(JsonDirStore::open(dir.join("extractions"))?);
                Arc::new(JsonDirStore::open(dir.join("lookups"))?)
            }
            None => Arc::new(MemoryStore::new()),
        };

        if config.lookup.enabled {
            #[cfg(feature = "registry")]
            {
                let service = EntityLookupService::from_config(&config.lookup)?.with_cache(lookup_cache);
                pipeline.lookup = Some(Arc::new(service));
            }
            #[cfg(not(feature = "registry"))]
            {
                drop(lookup_cache);
                warn!("Registry lookups enabled but built without the `registry` feature");
            }
        }

        Ok(pipeline)
    }

    pub fn with_acquirer(mut self, acquirer: TextAcquirer) -> Self {
        self.acquirer = acquirer;
        self
    }

    pub fn with_parser(mut self, parser: DanfeParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_extraction_cache(mut self, cache: Arc<dyn CacheStore<InvoiceRecord>>) -> Self {
        self.extraction_cache = cache;
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<EntityLookupService>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn without_lookup(mut self) -> Self {
        self.lookup = None;
        self
    }

    pub fn with_semantic(mut self, semantic: Arc<dyn SemanticExtractor>) -> Self {
        self.semantic = Some(semantic);
        self
    }

    /// Attach a credit determination to every document.
    pub fn with_analysis(mut self, analyze: bool) -> Self {
        self.analyze = analyze;
        self
    }

    /// Regime used for the recipient instead of the registry's answer.
    pub fn with_recipient_regime(mut self, regime: TaxRegime) -> Self {
        self.recipient_regime = Some(regime);
        self
    }

    pub fn with_issuer_regime(mut self, regime: TaxRegime) -> Self {
        self.issuer_regime = Some(regime);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn engine(&self) -> &CreditEngine {
        &self.engine
    }

    /// Process one document.
    ///
    /// Never fails: every problem ends up in the record's or the document's
    /// warnings.
    pub fn process_bytes(&self, source: &str, bytes: &[u8]) -> ProcessedDocument {
        let start = Instant::now();
        let mut warnings = Vec::new();
        let hash = content_hash(bytes);

        let (mut record, cached) = match self.extraction_cache.get(&hash) {
            Some(mut record) => {
                debug!("Extraction cache hit for {} ({})", source, &hash[..12]);
                record.source = source.to_string();
                (record, true)
            }
            None => {
                let record = self.extract(source, bytes, &hash, &mut warnings);
                if record.has_data() {
                    if let Err(e) = self.extraction_cache.put(&hash, record.clone()) {
                        warn!("Failed to cache extraction for {}: {}", source, e);
                        warnings.push(format!("extraction cache: {}", e));
                    }
                }
                (record, false)
            }
        };

        self.enrich_parties(&mut record, &mut warnings);

        let determination = self.analyze.then(|| self.engine.evaluate_record(&record));

        let processing_time_ms = start.elapsed().as_millis() as u64;
        info!(
            "Processed {} in {}ms (method {}, {} warnings)",
            source,
            processing_time_ms,
            record.method,
            record.warnings.len() + warnings.len()
        );

        ProcessedDocument {
            record,
            determination,
            warnings,
            cached,
            processing_time_ms,
        }
    }

    /// Read and process a file; the file name is the source id.
    pub fn process_file(&self, path: &Path) -> crate::Result<ProcessedDocument> {
        let bytes = std::fs::read(path)?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(self.process_bytes(&source, &bytes))
    }

    /// Process files in parallel, preserving input order.
    ///
    /// Unreadable files yield an empty record carrying the I/O error.
    pub fn process_batch(&self, paths: &[PathBuf]) -> Vec<ProcessedDocument> {
        let run = || {
            paths
                .par_iter()
                .map(|path| {
                    self.process_file(path).unwrap_or_else(|e| {
                        warn!("Failed to read {}: {}", path.display(), e);
                        ProcessedDocument {
                            record: InvoiceRecord::without_text(
                                path.display().to_string(),
                                vec![format!("read: {}", e)],
                            ),
                            determination: None,
                            warnings: Vec::new(),
                            cached: false,
                            processing_time_ms: 0,
                        }
                    })
                })
                .collect()
        };

        if self.workers == 0 {
            return run();
        }

        match rayon::ThreadPoolBuilder::new().num_threads(self.workers).build() {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!("Could not build a {}-thread pool ({}); using the global pool", self.workers, e);
                run()
            }
        }
    }

    fn extract(
        &self,
        source: &str,
        bytes: &[u8],
        hash: &str,
        warnings: &mut Vec<String>,
    ) -> InvoiceRecord {
        let (text, method) = match self.acquirer.acquire(bytes) {
            Acquisition::Text { text, method } => (text, method),
            Acquisition::NoText { attempts } => {
                warn!("No text acquired from {}", source);
                return InvoiceRecord::without_text(source, attempts).with_content_hash(hash);
            }
        };

        let mut record = self.parser.parse(source, &text).record.with_content_hash(hash);
        record.method = method;

        if let Some(semantic) = &self.semantic {
            match semantic.extract(&text) {
                Ok(payload) => record = payload.validated().enrich(record),
                Err(e) => {
                    warn!("Semantic extraction failed for {}: {}", source, e);
                    warnings.push(format!("semantic extraction: {}", e));
                }
            }
        }

        record
    }

    fn enrich_parties(&self, record: &mut InvoiceRecord, warnings: &mut Vec<String>) {
        if let Some(lookup) = &self.lookup {
            enrich_party(lookup, "issuer", &mut record.issuer, warnings);
            enrich_party(lookup, "recipient", &mut record.recipient, warnings);
        }

        if let Some(regime) = self.issuer_regime {
            record.issuer.regime = Some(regime);
        }
        if let Some(regime) = self.recipient_regime {
            record.recipient.regime = Some(regime);
        }
    }
}

fn enrich_party(
    lookup: &EntityLookupService,
    role: &str,
    party: &mut Party,
    warnings: &mut Vec<String>,
) {
    let Some(id) = &party.tax_id else {
        return;
    };
    if !id.is_cnpj() {
        return;
    }

    let info = lookup.lookup(id);
    if !info.is_known() {
        warnings.push(format!("{} {}: registry lookup failed, regime unknown", role, id));
        return;
    }

    party.regime = Some(info.regime);
    if party.name.is_none() {
        party.name = info.name;
    }
    if info.state_registration_exempt.is_some() {
        party.state_registration_exempt = info.state_registration_exempt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SemanticError;
    use crate::semantic::SemanticPayload;
    use rust_decimal_macros::dec;

    const DANFE: &str = "\
DANFE
DOCUMENTO AUXILIAR DA NOTA FISCAL ELETRÔNICA
NF-e Nº 000.004.512 SÉRIE 1
IDENTIFICAÇÃO DO EMITENTE
COMERCIAL ALFA LTDA
CNPJ 11.222.333/0001-81
DESTINATÁRIO / REMETENTE
NOME / RAZÃO SOCIAL CNPJ / CPF DATA DA EMISSÃO
MERCADO BETA LTDA 11.444.777/0001-61 15/03/2024
CÁLCULO DO IMPOSTO
VALOR TOTAL DA NOTA
1.250,00
";

    struct FailingSemantic;

    impl SemanticExtractor for FailingSemantic {
        fn extract(&self, _text: &str) -> Result<SemanticPayload, SemanticError> {
            Err(SemanticError::Unavailable("offline".to_string()))
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(&DanfeConfig::default())
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
        assert_eq!(content_hash(b"abc").len(), 64);
    }

    #[test]
    fn test_process_plain_text() {
        let doc = pipeline().process_bytes("nota.txt", DANFE.as_bytes());
        let record = &doc.record;

        assert_eq!(record.number.as_deref(), Some("4512"));
        assert_eq!(record.total, Some(dec!(1250.00)));
        assert_eq!(record.method, crate::models::ExtractionMethod::PlainText);
        assert_eq!(record.content_hash.as_deref(), Some(content_hash(DANFE.as_bytes()).as_str()));
        assert!(!doc.cached);
        assert!(doc.determination.is_none());
    }

    #[test]
    fn test_second_pass_hits_cache() {
        let pipeline = pipeline();
        let first = pipeline.process_bytes("a.txt", DANFE.as_bytes());
        let second = pipeline.process_bytes("b.txt", DANFE.as_bytes());

        assert!(second.cached);
        assert_eq!(second.record.source, "b.txt");
        assert_eq!(second.record.number, first.record.number);
    }

    #[test]
    fn test_identical_input_yields_identical_record() {
        let pipeline = pipeline().with_analysis(true);
        let first = pipeline.process_bytes("a.txt", DANFE.as_bytes());
        let second = pipeline.process_bytes("a.txt", DANFE.as_bytes());

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.record, second.record);
        assert_eq!(first.determination, second.determination);
    }

    #[test]
    fn test_no_text_is_not_cached() {
        let pipeline = pipeline();
        let first = pipeline.process_bytes("blank.txt", b"   ");
        assert!(!first.record.has_data());
        assert_eq!(first.record.method, crate::models::ExtractionMethod::None);

        let second = pipeline.process_bytes("blank.txt", b"   ");
        assert!(!second.cached);
    }

    #[test]
    fn test_regime_overrides_feed_analysis() {
        let doc = pipeline()
            .with_analysis(true)
            .with_recipient_regime(TaxRegime::Simplified)
            .process_bytes("nota.txt", DANFE.as_bytes());

        assert_eq!(doc.record.recipient.regime, Some(TaxRegime::Simplified));
        let determination = doc.determination.unwrap();
        assert!(!determination.icms.admitted);
    }

    #[test]
    fn test_semantic_failure_is_a_warning() {
        let doc = pipeline()
            .with_semantic(Arc::new(FailingSemantic))
            .process_bytes("nota.txt", DANFE.as_bytes());

        assert_eq!(doc.record.number.as_deref(), Some("4512"));
        assert_eq!(doc.warnings.len(), 1);
        assert!(doc.warnings[0].contains("offline"));
    }

    #[test]
    fn test_batch_preserves_order_and_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("1.txt");
        std::fs::write(&first, DANFE).unwrap();
        let missing = dir.path().join("missing.txt");

        let docs = pipeline()
            .with_workers(2)
            .process_batch(&[first, missing]);

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].record.source, "1.txt");
        assert!(docs[0].record.has_data());
        assert!(!docs[1].record.has_data());
        assert!(docs[1].record.warnings.iter().any(|w| w.starts_with("read:")));
    }
}
