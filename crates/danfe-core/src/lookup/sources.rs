//! Public CNPJ registries: response decoding and the HTTP client.

use serde::Deserialize;
use serde_json::Value;

use crate::error::RegistryError;
use crate::fiscal::TaxRegime;

use super::RegistrySource;

/// Registry answer, before regime normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryRecord {
    pub name: Option<String>,
    /// Simples Nacional option as reported.
    pub simplified_option: Option<bool>,
    /// Free-form taxation method ("LUCRO PRESUMIDO", ...).
    pub regime_text: Option<String>,
    pub state_registration_active: Option<bool>,
    pub state_registration_exempt: Option<bool>,
}

impl RegistryRecord {
    /// Regime implied by the record; `Unknown` when nothing was reported.
    pub fn regime(&self) -> TaxRegime {
        if self.simplified_option == Some(true) {
            return TaxRegime::Simplified;
        }
        if let Some(text) = self.regime_text.as_deref() {
            return TaxRegime::normalize(Some(text)).regime;
        }
        match self.simplified_option {
            Some(false) => TaxRegime::normalize(Some("normal")).regime,
            _ => TaxRegime::Unknown,
        }
    }
}

/// Decode the body returned by `source`.
pub fn parse_response(source: RegistrySource, body: &str) -> Result<RegistryRecord, RegistryError> {
    match source {
        RegistrySource::BrasilApi => parse_brasilapi(body),
        RegistrySource::CnpjWs => parse_cnpjws(body),
        RegistrySource::ReceitaWs => parse_receitaws(body),
        RegistrySource::Custom => Err(RegistryError::Unsupported(
            "custom registries decode their own responses".to_string(),
        )),
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Interpret `true`, `"Sim"`, `"S"` and friends.
fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => {
            let lower = s.trim().to_lowercase();
            match lower.as_str() {
                "" => None,
                "sim" | "s" | "true" | "yes" => Some(true),
                _ if lower.starts_with("sim") => Some(true),
                _ => Some(false),
            }
        }
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct BrasilApiResponse {
    razao_social: Option<String>,
    nome_fantasia: Option<String>,
    #[serde(default)]
    opcao_pelo_simples: Value,
    #[serde(default)]
    regime_tributario: Vec<BrasilApiRegime>,
}

#[derive(Debug, Deserialize)]
struct BrasilApiRegime {
    ano: Option<i32>,
    forma_de_tributacao: Option<String>,
}

fn parse_brasilapi(body: &str) -> Result<RegistryRecord, RegistryError> {
    let resp: BrasilApiResponse =
        serde_json::from_str(body).map_err(|e| RegistryError::Parse(e.to_string()))?;

    let regime_text = resp
        .regime_tributario
        .into_iter()
        .filter(|r| r.forma_de_tributacao.is_some())
        .max_by_key(|r| r.ano.unwrap_or(0))
        .and_then(|r| r.forma_de_tributacao);

    Ok(RegistryRecord {
        name: non_empty(resp.razao_social).or_else(|| non_empty(resp.nome_fantasia)),
        simplified_option: truthy(&resp.opcao_pelo_simples),
        regime_text: non_empty(regime_text),
        state_registration_active: None,
        state_registration_exempt: None,
    })
}

#[derive(Debug, Deserialize)]
struct CnpjWsResponse {
    razao_social: Option<String>,
    simples: Option<CnpjWsSimples>,
    estabelecimento: Option<CnpjWsEstablishment>,
}

#[derive(Debug, Deserialize)]
struct CnpjWsSimples {
    #[serde(default)]
    simples: Value,
}

#[derive(Debug, Deserialize)]
struct CnpjWsEstablishment {
    nome_fantasia: Option<String>,
    #[serde(default)]
    inscricoes_estaduais: Vec<CnpjWsStateRegistration>,
}

#[derive(Debug, Deserialize)]
struct CnpjWsStateRegistration {
    #[serde(default)]
    ativo: Value,
}

fn parse_cnpjws(body: &str) -> Result<RegistryRecord, RegistryError> {
    let resp: CnpjWsResponse =
        serde_json::from_str(body).map_err(|e| RegistryError::Parse(e.to_string()))?;

    let (fantasy, registrations) = match resp.estabelecimento {
        Some(e) => (e.nome_fantasia, e.inscricoes_estaduais),
        None => (None, Vec::new()),
    };
    let state_registration_active = if registrations.is_empty() {
        None
    } else {
        Some(registrations.iter().any(|r| truthy(&r.ativo) == Some(true)))
    };

    Ok(RegistryRecord {
        name: non_empty(resp.razao_social).or_else(|| non_empty(fantasy)),
        // A null "simples" block means the company never opted in.
        simplified_option: Some(resp.simples.and_then(|s| truthy(&s.simples)).unwrap_or(false)),
        regime_text: None,
        state_registration_active,
        state_registration_exempt: None,
    })
}

#[derive(Debug, Deserialize)]
struct ReceitaWsResponse {
    status: Option<String>,
    message: Option<String>,
    nome: Option<String>,
    fantasia: Option<String>,
    situacao: Option<String>,
    situacao_especial: Option<String>,
    #[serde(default)]
    opcao_pelo_simples: Value,
    simples: Option<ReceitaWsSimples>,
}

#[derive(Debug, Deserialize)]
struct ReceitaWsSimples {
    #[serde(default)]
    optante: Value,
}

fn parse_receitaws(body: &str) -> Result<RegistryRecord, RegistryError> {
    let resp: ReceitaWsResponse =
        serde_json::from_str(body).map_err(|e| RegistryError::Parse(e.to_string()))?;

    if resp.status.as_deref() != Some("OK") {
        let message = resp.message.unwrap_or_else(|| "status is not OK".to_string());
        return Err(if message.to_lowercase().contains("inválido") {
            RegistryError::NotFound(message)
        } else {
            RegistryError::Api(message)
        });
    }

    let special_simplified = resp
        .situacao_especial
        .as_deref()
        .is_some_and(|s| s.to_uppercase().contains("SIMPLES"));
    let simplified_option = truthy(&resp.opcao_pelo_simples)
        .or_else(|| resp.simples.as_ref().and_then(|s| truthy(&s.optante)))
        .map(|opted| opted || special_simplified)
        .or(special_simplified.then_some(true));

    let situation = resp.situacao.as_deref().map(str::to_lowercase);

    Ok(RegistryRecord {
        name: non_empty(resp.nome).or_else(|| non_empty(resp.fantasia)),
        simplified_option,
        regime_text: None,
        state_registration_active: situation
            .as_deref()
            .map(|s| s.contains("ativa") && !s.contains("inativa")),
        state_registration_exempt: situation.as_deref().map(|s| s.contains("isent")),
    })
}

#[cfg(feature = "registry")]
mod http {
    use std::time::Duration;

    use reqwest::header::ACCEPT;
    use reqwest::StatusCode;
    use tracing::{debug, warn};

    use super::{parse_response, RegistryRecord};
    use crate::error::RegistryError;
    use crate::invoice::rules::TaxId;
    use crate::lookup::{EntityRegistry, RegistrySource};
    use crate::models::config::LookupConfig;

    /// A public registry reached over HTTPS.
    pub struct HttpRegistry {
        source: RegistrySource,
        client: reqwest::blocking::Client,
    }

    impl HttpRegistry {
        pub fn new(source: RegistrySource, config: &LookupConfig) -> Result<Self, RegistryError> {
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .user_agent(config.user_agent.clone())
                .build()
                .map_err(|e| RegistryError::Network(e.to_string()))?;

            Ok(Self { source, client })
        }

        fn url(&self, digits: &str) -> Option<String> {
            match self.source {
                RegistrySource::BrasilApi => {
                    Some(format!("https://brasilapi.com.br/api/cnpj/v1/{}", digits))
                }
                RegistrySource::CnpjWs => Some(format!("https://publica.cnpj.ws/cnpj/{}", digits)),
                RegistrySource::ReceitaWs => {
                    Some(format!("https://receitaws.com.br/v1/cnpj/{}", digits))
                }
                RegistrySource::Custom => None,
            }
        }
    }

    impl EntityRegistry for HttpRegistry {
        fn source(&self) -> RegistrySource {
            self.source
        }

        fn resolve(&self, id: &TaxId) -> Result<RegistryRecord, RegistryError> {
            if !id.is_cnpj() {
                return Err(RegistryError::Unsupported("individual tax id".to_string()));
            }
            let url = self
                .url(id.digits())
                .ok_or_else(|| RegistryError::Unsupported(self.source.to_string()))?;

            debug!("GET {}", url);
            let response = self
                .client
                .get(&url)
                .header(ACCEPT, "application/json")
                .send()
                .map_err(|e| RegistryError::Network(e.to_string()))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(RegistryError::RateLimited(self.source.to_string()));
            }
            if status == StatusCode::NOT_FOUND {
                return Err(RegistryError::NotFound(id.formatted()));
            }

            let body = response
                .text()
                .map_err(|e| RegistryError::Network(e.to_string()))?;

            if !status.is_success() {
                let snippet: String = body.chars().take(200).collect();
                return Err(RegistryError::Api(format!("HTTP {}: {}", status, snippet)));
            }

            parse_response(self.source, &body)
        }
    }

    /// HTTP registries in configured order.
    pub fn build_registries(
        config: &LookupConfig,
    ) -> Result<Vec<Box<dyn EntityRegistry>>, RegistryError> {
        let mut registries: Vec<Box<dyn EntityRegistry>> = Vec::new();
        for &source in &config.sources {
            if source == RegistrySource::Custom {
                warn!("Ignoring custom registry source in configuration");
                continue;
            }
            registries.push(Box::new(HttpRegistry::new(source, config)?));
        }
        Ok(registries)
    }
}

#[cfg(feature = "registry")]
pub use http::{build_registries, HttpRegistry};
