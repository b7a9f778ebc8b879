//! End-to-end runs over a text DANFE with an in-process registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use danfe_core::error::RegistryError;
use danfe_core::fiscal::NormalRegime;
use danfe_core::invoice::rules::TaxId;
use danfe_core::lookup::{LookupOutcome, RegistryRecord};
use danfe_core::{
    DanfeConfig, EntityLookupService, EntityRegistry, InvoiceRecord, JsonDirStore, Pipeline,
    RegistrySource, TaxRegime,
};
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
DADOS DOS PRODUTOS / SERVIÇOS
001 PARAFUSO SEXTAVADO 73181500 00 1102 UN 100 12,50 1.250,00
CÁLCULO DO IMPOSTO
VALOR TOTAL DA NOTA
1.250,00
";

struct DirectoryRegistry {
    calls: Arc<AtomicUsize>,
}

impl EntityRegistry for DirectoryRegistry {
    fn source(&self) -> RegistrySource {
        RegistrySource::Custom
    }

    fn resolve(&self, id: &TaxId) -> Result<RegistryRecord, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (name, regime) = match id.digits() {
            "11222333000181" => ("COMERCIAL ALFA LTDA", "LUCRO PRESUMIDO"),
            "11444777000161" => ("MERCADO BETA LTDA", "LUCRO REAL"),
            other => return Err(RegistryError::NotFound(other.to_string())),
        };
        Ok(RegistryRecord {
            name: Some(name.to_string()),
            simplified_option: Some(false),
            regime_text: Some(regime.to_string()),
            ..Default::default()
        })
    }
}

fn lookup_service(calls: &Arc<AtomicUsize>, dir: &std::path::Path) -> EntityLookupService {
    let registry = DirectoryRegistry {
        calls: Arc::clone(calls),
    };
    let cache = JsonDirStore::<LookupOutcome>::open(dir.join("lookups")).unwrap();
    EntityLookupService::new(vec![Box::new(registry)]).with_cache(Arc::new(cache))
}

fn pipeline(calls: &Arc<AtomicUsize>, dir: &std::path::Path) -> Pipeline {
    let extractions = JsonDirStore::<InvoiceRecord>::open(dir.join("extractions")).unwrap();
    Pipeline::new(&DanfeConfig::default())
        .with_extraction_cache(Arc::new(extractions))
        .with_lookup(Arc::new(lookup_service(calls, dir)))
        .with_analysis(true)
}

#[test]
fn test_text_danfe_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let doc = pipeline(&calls, dir.path()).process_bytes("nota.txt", DANFE.as_bytes());
    let record = &doc.record;

    assert_eq!(record.number.as_deref(), Some("4512"));
    assert_eq!(record.series.as_deref(), Some("1"));
    assert_eq!(record.issuer.tax_id_display(), "11.222.333/0001-81");
    assert_eq!(record.recipient.name.as_deref(), Some("MERCADO BETA LTDA"));
    assert_eq!(record.total, Some(dec!(1250.00)));

    assert_eq!(record.items.len(), 1);
    assert_eq!(record.items[0].cfop.as_deref(), Some("1102"));
    assert_eq!(record.items[0].total, dec!(1250.00));

    assert_eq!(
        record.issuer.regime,
        Some(TaxRegime::Normal(NormalRegime::PresumedProfit))
    );
    assert_eq!(
        record.recipient.regime,
        Some(TaxRegime::Normal(NormalRegime::RealProfit))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let determination = doc.determination.unwrap();
    assert!(determination.icms.admitted);
    assert!(determination.pis.admitted);
    assert!(determination.cofins.admitted);
    assert!(determination.impact.is_some());
    assert!(determination.accounting.is_balanced());
}

#[test]
fn test_persistent_caches_survive_a_new_pipeline() {
    let dir = tempfile::tempdir().unwrap();

    let first_calls = Arc::new(AtomicUsize::new(0));
    let first = pipeline(&first_calls, dir.path()).process_bytes("nota.txt", DANFE.as_bytes());
    assert!(!first.cached);
    assert_eq!(first_calls.load(Ordering::SeqCst), 2);

    let second_calls = Arc::new(AtomicUsize::new(0));
    let second = pipeline(&second_calls, dir.path()).process_bytes("copia.txt", DANFE.as_bytes());
    assert!(second.cached);
    assert_eq!(second.record.source, "copia.txt");
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    assert_eq!(second.record.recipient.regime, first.record.recipient.regime);
}

#[test]
fn test_identical_record_through_disk_caches() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let first = pipeline(&calls, dir.path()).process_bytes("nota.txt", DANFE.as_bytes());
    let second = pipeline(&calls, dir.path()).process_bytes("nota.txt", DANFE.as_bytes());

    assert!(second.cached);
    assert_eq!(first.record, second.record);
    assert_eq!(first.determination, second.determination);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unknown_entities_resolved_once() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let service = lookup_service(&calls, dir.path());

    let id = TaxId::parse("11.444.777/0002-42").unwrap();
    let stranger = TaxId::parse("45.997.418/0001-53").unwrap();

    // Branch resolves through its head office
    assert_eq!(service.lookup(&id).name.as_deref(), Some("MERCADO BETA LTDA"));
    assert!(!service.lookup(&stranger).is_known());
    assert!(!service.lookup(&stranger).is_known());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
