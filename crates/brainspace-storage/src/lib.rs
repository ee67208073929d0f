//! Hosted-store client for the `vc_partners` table.
//!
//! The store speaks the PostgREST dialect: rows live under `/rest/v1/<table>` and
//! stored procedures under `/rest/v1/rpc/<function>`.

use std::time::Duration;

use async_trait::async_trait;
use brainspace_core::{InvestorRecord, ReasoningFields, PARTNERS_TABLE};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "brainspace-storage";

/// Stored procedure that runs a parameterized statement server-side.
pub const EXECUTE_SQL_FUNCTION: &str = "execute_sql";

/// Full overwrite of the six reasoning columns; `$7` is the matched name.
pub const REASONING_UPDATE_SQL: &str = "UPDATE vc_partners SET \
partner_reasoning = $1, \
series_reasoning = $2, \
neurotech_reasoning = $3, \
exits_reasoning = $4, \
location_reasoning = $5, \
role_reasoning = $6 \
WHERE name = $7";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}: {message}")]
    HttpStatus {
        status: u16,
        url: String,
        message: String,
    },
    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl StoreError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Request(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Parameterized statement sent to [`EXECUTE_SQL_FUNCTION`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlStatement {
    pub query: String,
    pub params: Vec<Option<String>>,
}

impl SqlStatement {
    /// Seven positional parameters: the six reasoning values, then `name`.
    pub fn reasoning_update(name: &str, fields: &ReasoningFields) -> Self {
        let mut params: Vec<Option<String>> = fields
            .ordered()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect();
        params.push(Some(name.to_string()));
        Self {
            query: REASONING_UPDATE_SQL.to_string(),
            params,
        }
    }
}

/// Operations the sync routine and the browse commands need from the hosted table.
#[async_trait]
pub trait PartnerTable: Send + Sync {
    /// Primary update route: run `statement` through the `execute_sql` procedure.
    async fn execute_sql(&self, statement: &SqlStatement) -> Result<(), StoreError>;

    /// Overwrite the reasoning columns of every row whose `name` equals `name`.
    /// Returns the number of rows the store reports as updated.
    async fn update_reasoning(
        &self,
        name: &str,
        fields: &ReasoningFields,
    ) -> Result<usize, StoreError>;

    /// All rows ordered by `name`.
    async fn list_partners(&self) -> Result<Vec<InvestorRecord>, StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpClientConfig {
    /// `None` leaves requests without a deadline.
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SupabaseTable {
    client: reqwest::Client,
    base_url: String,
    table: String,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

impl SupabaseTable {
    /// Client for [`PARTNERS_TABLE`].
    pub fn new(
        base_url: impl Into<String>,
        api_key: &str,
        config: HttpClientConfig,
    ) -> Result<Self, StoreError> {
        Self::for_table(base_url, api_key, PARTNERS_TABLE, config)
    }

    pub fn for_table(
        base_url: impl Into<String>,
        api_key: &str,
        table: impl Into<String>,
        config: HttpClientConfig,
    ) -> Result<Self, StoreError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(StoreError::Config("empty base url".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key_value = HeaderValue::from_str(api_key)
            .map_err(|_| StoreError::Config("api key is not a valid header value".into()))?;
        key_value.set_sensitive(true);
        headers.insert("apikey", key_value);
        let mut auth_value = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| StoreError::Config("api key is not a valid header value".into()))?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .gzip(true)
            .brotli(true);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| StoreError::Config(format!("building http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            table: table.into(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, function)
    }

    async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let url = resp.url().to_string();
        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::HttpStatus {
            status: status.as_u16(),
            url,
            message: error_message(status, &body),
        })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, StoreError> {
        let url = resp.url().to_string();
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode { url, source })
    }
}

/// Prefers the PostgREST `message` (plus details/hint) over the raw body.
fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<PostgrestError>(body) {
        Ok(PostgrestError {
            message: Some(message),
            details,
            hint,
        }) => {
            let mut out = message;
            if let Some(details) = details.filter(|d| !d.is_empty()) {
                out.push_str(&format!(" ({details})"));
            }
            if let Some(hint) = hint.filter(|h| !h.is_empty()) {
                out.push_str(&format!(" hint: {hint}"));
            }
            out
        }
        _ if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        _ => body.trim().to_string(),
    }
}

#[async_trait]
impl PartnerTable for SupabaseTable {
    async fn execute_sql(&self, statement: &SqlStatement) -> Result<(), StoreError> {
        let url = self.rpc_url(EXECUTE_SQL_FUNCTION);
        debug!(%url, params = statement.params.len(), "calling execute_sql");
        let resp = self.client.post(&url).json(statement).send().await?;
        Self::ensure_success(resp).await?;
        Ok(())
    }

    async fn update_reasoning(
        &self,
        name: &str,
        fields: &ReasoningFields,
    ) -> Result<usize, StoreError> {
        let url = self.table_url();
        debug!(%url, name, "patching reasoning columns");
        let resp = self
            .client
            .patch(&url)
            .query(&[("name", format!("eq.{name}"))])
            .header("Prefer", "return=representation")
            .json(fields)
            .send()
            .await?;
        let resp = Self::ensure_success(resp).await?;
        let rows: Vec<serde_json::Value> = Self::read_json(resp).await?;
        Ok(rows.len())
    }

    async fn list_partners(&self) -> Result<Vec<InvestorRecord>, StoreError> {
        let url = self.table_url();
        debug!(%url, "listing partners");
        let resp = self
            .client
            .get(&url)
            .query(&[("select", "*"), ("order", "name")])
            .send()
            .await?;
        let resp = Self::ensure_success(resp).await?;
        Self::read_json(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasoning_statement_orders_params_with_name_last() {
        let fields = ReasoningFields {
            series_reasoning: Some("Led 3 Series A rounds".into()),
            role_reasoning: Some("Managing Partner since 2019".into()),
            ..ReasoningFields::default()
        };
        let stmt = SqlStatement::reasoning_update("Jane Doe", &fields);

        assert_eq!(stmt.params.len(), 7);
        assert_eq!(stmt.params[0], None);
        assert_eq!(stmt.params[1].as_deref(), Some("Led 3 Series A rounds"));
        assert_eq!(stmt.params[5].as_deref(), Some("Managing Partner since 2019"));
        assert_eq!(stmt.params[6].as_deref(), Some("Jane Doe"));
        assert!(stmt.query.contains("WHERE name = $7"));
    }

    #[test]
    fn error_message_prefers_postgrest_message() {
        let body = r#"{"code":"PGRST202","message":"Could not find the function public.execute_sql","details":"","hint":"Perhaps you meant exec"}"#;
        let msg = error_message(StatusCode::NOT_FOUND, body);
        assert_eq!(
            msg,
            "Could not find the function public.execute_sql hint: Perhaps you meant exec"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
        assert_eq!(error_message(StatusCode::BAD_REQUEST, "nope\n"), "nope");
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let err = SupabaseTable::new("/", "anon", HttpClientConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn urls_drop_trailing_slash() {
        let table =
            SupabaseTable::new("https://abc.supabase.co/", "anon", HttpClientConfig::default())
                .expect("client");
        assert_eq!(table.table_url(), "https://abc.supabase.co/rest/v1/vc_partners");
        assert_eq!(
            table.rpc_url(EXECUTE_SQL_FUNCTION),
            "https://abc.supabase.co/rest/v1/rpc/execute_sql"
        );
    }
}
