//! Reasoning-field synchronization from the local Record Source into `vc_partners`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use brainspace_core::SourceRecord;
use brainspace_storage::{HttpClientConfig, PartnerTable, SqlStatement, StoreError, SupabaseTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::fs;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "brainspace-sync";

pub const DEFAULT_DATA_PATH: &str = "vc_partners_data.json";
pub const DEFAULT_USER_AGENT: &str = "brainspace-sync/0.1";

const URL_VARS: [&str; 2] = ["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"];
const KEY_VARS: [&str; 2] = ["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading record source {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("record source {path} is not a JSON array: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone)]
pub struct SyncConfig {
    pub supabase_url: String,
    pub supabase_key: String,
    pub data_path: PathBuf,
    pub http_timeout: Option<Duration>,
    pub user_agent: String,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_key", &"<redacted>")
            .field("data_path", &self.data_path)
            .field("http_timeout", &self.http_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Endpoint and key are required; everything else has a default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let first_set = |vars: &[&'static str]| {
            vars.iter()
                .find_map(|var| lookup(*var).filter(|v| !v.trim().is_empty()))
        };

        let supabase_url = first_set(&URL_VARS).ok_or(ConfigError::Missing(URL_VARS[0]))?;
        let supabase_key = first_set(&KEY_VARS).ok_or(ConfigError::Missing(KEY_VARS[0]))?;

        let http_timeout = match lookup("BRAINSPACE_HTTP_TIMEOUT_SECS") {
            Some(raw) if !raw.trim().is_empty() => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    var: "BRAINSPACE_HTTP_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
                Some(Duration::from_secs(secs))
            }
            _ => None,
        };

        Ok(Self {
            supabase_url: supabase_url.trim().to_string(),
            supabase_key: supabase_key.trim().to_string(),
            data_path: lookup("BRAINSPACE_DATA_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH)),
            http_timeout,
            user_agent: lookup("BRAINSPACE_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        })
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: self.http_timeout,
            user_agent: Some(self.user_agent.clone()),
        }
    }

    /// One client per run, handed to the sync routine by reference.
    pub fn connect(&self) -> Result<SupabaseTable, StoreError> {
        SupabaseTable::new(
            self.supabase_url.clone(),
            &self.supabase_key,
            self.http_client_config(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `execute_sql` first, row-level update when that fails.
    #[default]
    RpcFirst,
    /// Row-level update only.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePath {
    Rpc,
    RowUpdate,
}

impl fmt::Display for UpdatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc => f.write_str("rpc"),
            Self::RowUpdate => f.write_str("row update"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// `rows` is only known on the row-update path.
    Updated {
        path: UpdatePath,
        rows: Option<usize>,
    },
    /// Row update succeeded but matched no row. Counted as a failure.
    NoMatch,
    /// The store rejected the update or the request failed.
    Failed { message: String },
    /// The source element could not be decoded into a record.
    Malformed { message: String },
}

impl RecordOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordReport {
    /// Zero-based position in the Record Source.
    pub index: usize,
    pub name: Option<String>,
    pub company: Option<String>,
    /// Set when the RPC path failed before the row update was tried.
    pub rpc_error: Option<String>,
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub mode: SyncMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records: Vec<RecordReport>,
    pub succeeded: usize,
    pub failed: usize,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn no_match(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome == RecordOutcome::NoMatch)
            .count()
    }
}

/// Reads the whole Record Source. Elements are decoded one at a time during the run.
pub async fn load_record_source(path: impl AsRef<Path>) -> Result<Vec<JsonValue>, SourceError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .await
        .map_err(|source| SourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&text).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Overwrites the reasoning columns of the row(s) named like `record`.
///
/// Returns the outcome and, in [`SyncMode::RpcFirst`], the RPC error that caused a
/// fallback to the row-level update.
pub async fn sync_record(
    table: &dyn PartnerTable,
    mode: SyncMode,
    record: &SourceRecord,
) -> (RecordOutcome, Option<String>) {
    let fields = record.reasoning();

    let mut rpc_error = None;
    if mode == SyncMode::RpcFirst {
        let statement = SqlStatement::reasoning_update(&record.name, &fields);
        match table.execute_sql(&statement).await {
            Ok(()) => {
                return (
                    RecordOutcome::Updated {
                        path: UpdatePath::Rpc,
                        rows: None,
                    },
                    None,
                )
            }
            Err(err) => {
                warn!(name = %record.name, status = ?err.status(), "execute_sql failed, falling back to row update: {err}");
                rpc_error = Some(err.to_string());
            }
        }
    }

    let outcome = match table.update_reasoning(&record.name, &fields).await {
        Ok(0) => RecordOutcome::NoMatch,
        Ok(rows) => RecordOutcome::Updated {
            path: UpdatePath::RowUpdate,
            rows: Some(rows),
        },
        Err(err) => RecordOutcome::Failed {
            message: err.to_string(),
        },
    };
    (outcome, rpc_error)
}

/// Processes `records` strictly in order, one awaited update at a time.
///
/// Never aborts early: every element yields exactly one [`RecordReport`].
pub async fn sync_reasoning(
    table: &dyn PartnerTable,
    mode: SyncMode,
    records: &[JsonValue],
) -> SyncReport {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let span = info_span!("reasoning_sync", %run_id, ?mode, records = records.len());

    async move {
        let total = records.len();
        let mut reports = Vec::with_capacity(total);
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        for (index, raw) in records.iter().enumerate() {
            let position = index + 1;
            let report = match SourceRecord::deserialize(raw) {
                Ok(record) => {
                    let (outcome, rpc_error) = sync_record(table, mode, &record).await;
                    log_outcome(position, total, &record, &outcome);
                    RecordReport {
                        index,
                        name: Some(record.name.clone()),
                        company: record.company.clone(),
                        rpc_error,
                        outcome,
                    }
                }
                Err(err) => {
                    let name = raw.get("name").and_then(JsonValue::as_str).map(str::to_string);
                    let company = raw
                        .get("company")
                        .and_then(JsonValue::as_str)
                        .map(str::to_string);
                    error!(
                        "[{position}/{total}] skipping malformed record {} - {}: {err}",
                        name.as_deref().unwrap_or("<unnamed>"),
                        company.as_deref().unwrap_or("unknown company"),
                    );
                    RecordReport {
                        index,
                        name,
                        company,
                        rpc_error: None,
                        outcome: RecordOutcome::Malformed {
                            message: err.to_string(),
                        },
                    }
                }
            };

            if report.outcome.is_success() {
                succeeded += 1;
            } else {
                failed += 1;
            }
            reports.push(report);
        }

        info!(succeeded, failed, "reasoning sync complete");
        SyncReport {
            run_id,
            mode,
            started_at,
            finished_at: Utc::now(),
            records: reports,
            succeeded,
            failed,
        }
    }
    .instrument(span)
    .await
}

fn log_outcome(position: usize, total: usize, record: &SourceRecord, outcome: &RecordOutcome) {
    let name = &record.name;
    let company = record.company_or_unknown();
    match outcome {
        RecordOutcome::Updated { path, rows } => {
            let series_chars = record
                .series_reasoning
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| s.chars().count());
            info!(
                rows = ?rows,
                series_reasoning_chars = ?series_chars,
                "[{position}/{total}] updated {name} - {company} via {path}"
            );
        }
        RecordOutcome::NoMatch => {
            warn!("[{position}/{total}] no match found for {name} - {company}");
        }
        RecordOutcome::Failed { message } | RecordOutcome::Malformed { message } => {
            error!("[{position}/{total}] error updating {name} - {company}: {message}");
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Overrides `BRAINSPACE_DATA_PATH`.
    pub data_path: Option<PathBuf>,
    pub mode: SyncMode,
}

/// Configuration is checked before the Record Source is read or any request is made.
pub async fn run_sync_once_from_env(options: SyncOptions) -> Result<SyncReport> {
    let config = SyncConfig::from_env().context("loading hosted store configuration")?;
    run_sync_once(&config, options).await
}

pub async fn run_sync_once(config: &SyncConfig, options: SyncOptions) -> Result<SyncReport> {
    let data_path = options
        .data_path
        .unwrap_or_else(|| config.data_path.clone());
    let records = load_record_source(&data_path).await?;
    info!(
        path = %data_path.display(),
        "loaded {} records from record source",
        records.len()
    );

    let table = config.connect().context("building hosted store client")?;
    Ok(sync_reasoning(&table, options.mode, &records).await)
}
