//! Client for the regional court case API.
//!
//! Every call goes through a client carrying the headers and cookies of an
//! authenticated browser session, so the API sees the same user.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::record::RecordError;

#[derive(Debug, Error)]
pub enum CaseApiError {
    #[error("No case found for {0}")]
    NotFound(String),

    #[error("Case API returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Case API request failed: {0}")]
    Http(String),

    #[error("Failed to parse case API response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for CaseApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CaseApiError::Http(format!("timed out: {}", e))
        } else if e.is_connect() {
            CaseApiError::Http(format!("connection failed: {}", e))
        } else {
            CaseApiError::Http(e.to_string())
        }
    }
}

impl From<CaseApiError> for RecordError {
    fn from(e: CaseApiError) -> Self {
        match e {
            CaseApiError::NotFound(number) => RecordError::NotFound(number),
            other => RecordError::Remote(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Described {
    #[serde(default)]
    pub descricao: Option<String>,
    #[serde(default)]
    pub sigla: Option<String>,
}

/// Case details as served by `processos/id/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseDetails {
    pub id: i64,
    pub numero: String,
    #[serde(default)]
    pub classe_judicial: Described,
    #[serde(default)]
    pub orgao_julgador: Described,
    #[serde(default)]
    pub distribuido_em: Option<String>,
    #[serde(default)]
    pub label_status_processo: Option<String>,
    #[serde(default)]
    pub segredo_de_justica: Option<bool>,
    #[serde(default)]
    pub valor_da_causa: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub nome: String,
    #[serde(default)]
    pub documento: Option<String>,
    #[serde(default)]
    pub tipo_documento: Option<String>,
    #[serde(default)]
    pub polo: Option<String>,
    #[serde(default)]
    pub tipo_pessoa: Option<String>,
    #[serde(default)]
    pub principal: Option<bool>,
    #[serde(default)]
    pub representantes: Vec<Representative>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Representative {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub nome: String,
    #[serde(default)]
    pub documento: Option<String>,
    #[serde(default)]
    pub tipo_documento: Option<String>,
    #[serde(default)]
    pub polo: Option<String>,
    #[serde(default)]
    pub tipo_pessoa: Option<String>,
    #[serde(default)]
    pub numero_oab: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub ddd_celular: Option<String>,
    #[serde(default)]
    pub numero_celular: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub assunto: SubjectText,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectText {
    #[serde(default)]
    pub assunto_completo: Option<String>,
    #[serde(default)]
    pub assunto_resumido: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hearing {
    pub id: i64,
    pub tipo: HearingKind,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data_inicio: Option<String>,
    #[serde(default)]
    pub data_fim: Option<String>,
    #[serde(default)]
    pub data_marcacao: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HearingKind {
    #[serde(default)]
    pub descricao: Option<String>,
    #[serde(default)]
    pub is_virtual: bool,
}

/// Parties grouped by side, as served by `processos/id/{id}/partes`.
pub type PartiesBySide = BTreeMap<String, Vec<Party>>;

/// Case API of one region.
pub struct CaseApi {
    client: Client,
    base_url: String,
}

impl CaseApi {
    /// `base_url` ends with `/`.
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a process number to its internal id and fetch its details.
    pub async fn find_case(&self, number: &str) -> Result<CaseDetails, CaseApiError> {
        let url = format!("{}api/processos/dadosbasicos/{}", self.base_url, number);
        debug!(number = %number, "Looking up case");

        let response = self.client.get(&url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(CaseApiError::NotFound(number.to_string()));
        }
        let basic: Value = response
            .json()
            .await
            .map_err(|e| CaseApiError::Parse(format!("basic data of {}: {}", number, e)))?;
        let id = case_id(&basic).ok_or_else(|| CaseApiError::NotFound(number.to_string()))?;

        let url = format!("{}api/processos/id/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(CaseApiError::NotFound(number.to_string()));
        }
        response
            .json()
            .await
            .map_err(|e| CaseApiError::Parse(format!("details of {}: {}", number, e)))
    }

    pub async fn parties(&self, case_id: i64) -> Result<PartiesBySide, CaseApiError> {
        self.get_json(&format!("api/processos/id/{}/partes", case_id))
            .await
    }

    pub async fn subjects(&self, case_id: i64) -> Result<Vec<Subject>, CaseApiError> {
        self.get_json(&format!("api/processos/id/{}/assuntos", case_id))
            .await
    }

    pub async fn hearings(&self, case_id: i64) -> Result<Vec<Hearing>, CaseApiError> {
        self.get_json(&format!("api/processos/id/{}/audiencias", case_id))
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CaseApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaseApiError::Status {
                status: status.as_u16(),
                url,
            });
        }
        response
            .json()
            .await
            .map_err(|e| CaseApiError::Parse(format!("{}: {}", path, e)))
    }
}

/// The basic-data endpoint answers with an object or a list of them; the
/// id may be a number or a numeric string.
fn case_id(basic: &Value) -> Option<i64> {
    let entry = match basic {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match entry.get("id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_id_shapes() {
        assert_eq!(case_id(&json!([{"id": 42}])), Some(42));
        assert_eq!(case_id(&json!({"id": "17"})), Some(17));
        assert_eq!(case_id(&json!([])), None);
        assert_eq!(case_id(&json!({"id": ""})), None);
        assert_eq!(case_id(&json!({"numero": "x"})), None);
    }

    #[test]
    fn test_not_found_maps_to_record_not_found() {
        let err: RecordError = CaseApiError::NotFound("0010045-12.2023.5.15.0001".into()).into();
        assert!(matches!(err, RecordError::NotFound(_)));

        let err: RecordError = CaseApiError::Status {
            status: 500,
            url: "u".into(),
        }
        .into();
        assert!(matches!(err, RecordError::Remote(_)));
    }
}
