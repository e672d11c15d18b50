//! Tipos de erro para o cliente da API de mensagens do modelo.
//!
//! Define [`LlmError`] com variantes para rate limiting, erros da API,
//! erros de rede, timeout e respostas que não seguem o formato esperado.
//! A classificação para retentativas fica em [`crate::error::ItemError`].

use thiserror::Error;

/// Erros que podem ocorrer ao interagir com a API do modelo.
///
/// - [`RateLimited`](LlmError::RateLimited): o servidor retornou HTTP 429
/// - [`ApiError`](LlmError::ApiError): qualquer outro erro HTTP (4xx/5xx)
/// - [`NetworkError`](LlmError::NetworkError): falha na camada de rede
/// - [`Timeout`](LlmError::Timeout): a requisição excedeu o prazo do transporte
/// - [`ParseError`](LlmError::ParseError): corpo ou conteúdo fora do formato esperado
#[derive(Debug, Error)]
pub enum LlmError {
    /// O servidor retornou HTTP 429 (rate limit).
    /// O campo `retry_after_ms` indica quantos milissegundos esperar antes de retentar.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro retornado pela API (ex.: 401 chave inválida, 500 erro interno).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// A requisição HTTP excedeu o timeout do cliente.
    #[error("request timed out")]
    Timeout,

    /// A resposta chegou, mas não pôde ser interpretada.
    #[error("failed to parse model reply: {0}")]
    ParseError(String),
}

impl LlmError {
    /// Converte um erro do `reqwest`, separando timeouts das demais falhas de rede.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_decode() {
            LlmError::ParseError(err.to_string())
        } else {
            LlmError::NetworkError(err)
        }
    }
}
