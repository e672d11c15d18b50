//! Configuração do cvmatch carregada a partir de `cvmatch.toml`.
//!
//! A struct [`MatchConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis; cada ponto de
//! chamada em lote (parsing, must-have, nice-have, re-ranking) tem seus
//! próprios defaults, sobrescritos campo a campo pelas seções do arquivo.
//! A variável de ambiente `ANTHROPIC_API_KEY` tem precedência sobre o arquivo.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::BatchSettings;
use crate::error::MatchError;
use crate::llm::DEFAULT_API_URL;
use crate::scoring::DEFAULT_MALUS_FACTOR;

/// Nome do arquivo procurado no diretório atual quando `--config` não é usado.
pub const CONFIG_FILE: &str = "cvmatch.toml";
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Configuração de nível superior carregada de `cvmatch.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Chave da API Anthropic.
    #[serde(default)]
    pub api_key: String,

    /// Modelo usado em todas as chamadas.
    #[serde(default = "default_model")]
    pub model: String,

    /// Endpoint de mensagens (sobrescrito em testes).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Parâmetros de pontuação.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Sobrescritas do lote de parsing de CVs.
    #[serde(default)]
    pub cv_parsing: BatchOverrides,

    /// Sobrescritas do lote de filtragem must-have.
    #[serde(default)]
    pub must_have: BatchOverrides,

    /// Sobrescritas do lote de detecção nice-have.
    #[serde(default)]
    pub nice_have: BatchOverrides,

    /// Sobrescritas do re-ranking final.
    #[serde(default)]
    pub rerank: BatchOverrides,
}

/// Parâmetros da pontuação determinística.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Multiplicador aplicado por nice-have ausente.
    #[serde(default = "default_malus_factor")]
    pub malus_factor: f64,

    /// Quantos candidatos (os melhores) passam pelo re-ranking.
    #[serde(default = "default_top_rerank")]
    pub top_rerank: usize,
}

/// Sobrescrita parcial de [`BatchSettings`]; campos ausentes mantêm o default do ponto de chamada.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_ceiling: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_malformed: Option<bool>,
}

// Valor padrão para o modelo: o mais rápido da família.
fn default_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_base_url() -> String {
    DEFAULT_API_URL.to_string()
}

// Valor padrão para o malus: 0.95 por critério ausente.
fn default_malus_factor() -> f64 {
    DEFAULT_MALUS_FACTOR
}

// Valor padrão para o re-ranking: os 10 melhores.
fn default_top_rerank() -> usize {
    10
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            malus_factor: default_malus_factor(),
            top_rerank: default_top_rerank(),
        }
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            base_url: default_base_url(),
            scoring: ScoringConfig::default(),
            cv_parsing: BatchOverrides::default(),
            must_have: BatchOverrides::default(),
            nice_have: BatchOverrides::default(),
            rerank: BatchOverrides::default(),
        }
    }
}

impl BatchOverrides {
    /// Aplica os campos presentes sobre `base`.
    pub fn apply(&self, base: BatchSettings) -> BatchSettings {
        BatchSettings {
            concurrency: self.concurrency.unwrap_or(base.concurrency),
            qps: self.qps.unwrap_or(base.qps),
            timeout_seconds: self.timeout_seconds.unwrap_or(base.timeout_seconds),
            retries: self.retries.unwrap_or(base.retries),
            backoff_seconds: self.backoff_seconds.unwrap_or(base.backoff_seconds),
            worker_ceiling: self.worker_ceiling.unwrap_or(base.worker_ceiling),
            retry_malformed: self.retry_malformed.unwrap_or(base.retry_malformed),
        }
    }
}

impl MatchConfig {
    /// Carrega a configuração de `path`, ou de `cvmatch.toml` no diretório atual.
    ///
    /// Um caminho explícito precisa existir; o arquivo padrão é opcional e,
    /// se ausente, os valores padrão são usados.
    pub fn load(path: Option<&Path>) -> Result<Self, MatchError> {
        let config = match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => {
                let default = Path::new(CONFIG_FILE);
                if default.exists() {
                    Self::from_toml_str(&std::fs::read_to_string(default)?)?
                } else {
                    Self::default()
                }
            }
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração para a chave API.
        let config = config.with_env_api_key(std::env::var(API_KEY_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, MatchError> {
        Ok(toml::from_str::<MatchConfig>(contents)?)
    }

    /// Substitui a chave do arquivo por `key` quando esta não é vazia.
    pub fn with_env_api_key(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.api_key = key;
        }
        self
    }

    /// Rejeita parâmetros com os quais nenhum lote pode rodar.
    pub fn validate(&self) -> Result<(), MatchError> {
        let malus = self.scoring.malus_factor;
        if !(malus.is_finite() && malus > 0.0 && malus <= 1.0) {
            return Err(MatchError::Config(format!(
                "scoring.malus_factor must be in (0, 1], got {malus}"
            )));
        }
        for (section, settings) in [
            ("cv_parsing", self.cv_parsing_settings()),
            ("must_have", self.must_have_settings()),
            ("nice_have", self.nice_have_settings()),
            ("rerank", self.rerank_settings()),
        ] {
            settings
                .validate()
                .map_err(|e| MatchError::Config(format!("[{section}] {e}")))?;
        }
        Ok(())
    }

    /// Chave da API, ou erro fatal antes de qualquer lote começar.
    pub fn require_api_key(&self) -> Result<&str, MatchError> {
        if self.api_key.trim().is_empty() {
            return Err(MatchError::MissingCredentials(format!(
                "set {API_KEY_ENV} or api_key in {CONFIG_FILE}"
            )));
        }
        Ok(&self.api_key)
    }

    pub fn cv_parsing_settings(&self) -> BatchSettings {
        self.cv_parsing.apply(BatchSettings::cv_parsing())
    }

    pub fn must_have_settings(&self) -> BatchSettings {
        self.must_have.apply(BatchSettings::must_have())
    }

    pub fn nice_have_settings(&self) -> BatchSettings {
        self.nice_have.apply(BatchSettings::nice_have())
    }

    pub fn rerank_settings(&self) -> BatchSettings {
        self.rerank.apply(BatchSettings::rerank())
    }

    /// Cópia segura para exibição, com a chave mascarada.
    pub fn redacted(&self) -> Self {
        let api_key = if self.api_key.is_empty() {
            String::new()
        } else {
            let visible: String = self.api_key.chars().take(7).collect();
            format!("{visible}…")
        };
        Self {
            api_key,
            ..self.clone()
        }
    }
}
