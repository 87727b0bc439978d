use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{SheetBackend, check_api_key};
use crate::error::{SyncError, SyncResult};
use crate::sheet::{COLUMN_COUNT, COLUMN_RANGE};

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetsSettings {
    pub api_base: String,
    pub spreadsheet_id: String,
    pub api_key: Option<String>,
    pub sheet_name: String,
    pub timeout: Duration,
}

impl Default for SheetsSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            spreadsheet_id: String::new(),
            api_key: None,
            sheet_name: "Sheet1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct ValueRangeBody<'a> {
    values: [&'a [String]; 1],
}

/// Spreadsheet-values endpoint, authenticated by an API key in the query string.
#[derive(Debug, Clone)]
pub struct SheetsClient {
    settings: SheetsSettings,
    http: reqwest::Client,
}

impl SheetsClient {
    pub fn new(settings: SheetsSettings) -> anyhow::Result<Self> {
        let mut settings = settings;
        while settings.api_base.ends_with('/') {
            settings.api_base.pop();
        }
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("failed building HTTP client for sheet sync")?;
        Ok(Self { settings, http })
    }

    fn values_url(&self, range: &str, suffix: &str, raw_input: bool) -> String {
        let mut url = format!(
            "{}/{}/values/{}!{}{}?",
            self.settings.api_base,
            urlencoding::encode(&self.settings.spreadsheet_id),
            urlencoding::encode(&self.settings.sheet_name),
            range,
            suffix
        );
        if raw_input {
            url.push_str("valueInputOption=RAW&");
        }
        url.push_str("key=");
        url.push_str(&urlencoding::encode(
            self.settings.api_key.as_deref().unwrap_or_default(),
        ));
        url
    }
}

async fn read_success(response: reqwest::Response) -> SyncResult<String> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(body);
    }
    warn!(status = %status, body = %body, "sheets API returned non-success status");
    Err(SyncError::Http {
        status: status.as_u16(),
        body,
    })
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetBackend for SheetsClient {
    fn ensure_configured(&self) -> SyncResult<()> {
        check_api_key(self.settings.api_key.as_deref())?;
        if self.settings.spreadsheet_id.trim().is_empty() {
            return Err(SyncError::NotConfigured(
                "spreadsheet id not configured".to_string(),
            ));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(sheet = %self.settings.sheet_name))]
    async fn read_range(&self, range: &str) -> SyncResult<Vec<Vec<String>>> {
        let url = self.values_url(range, "", false);
        let response = self.http.get(&url).send().await?;
        let body = read_success(response).await?;

        let parsed: ValueRange = serde_json::from_str(&body)
            .map_err(|err| SyncError::Transport(format!("invalid sheets response: {err}")))?;
        let rows: Vec<Vec<String>> = parsed
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();

        debug!(rows = rows.len(), "read sheet range");
        Ok(rows)
    }

    #[instrument(skip(self, row), fields(sheet = %self.settings.sheet_name))]
    async fn update_row(&self, row_number: usize, row: Vec<String>) -> SyncResult<()> {
        let last_column = (b'A' + (COLUMN_COUNT as u8) - 1) as char;
        let range = format!("A{row_number}:{last_column}{row_number}");
        let url = self.values_url(&range, "", true);
        let response = self
            .http
            .put(&url)
            .json(&ValueRangeBody {
                values: [row.as_slice()],
            })
            .send()
            .await?;
        read_success(response).await?;
        Ok(())
    }

    #[instrument(skip(self, row), fields(sheet = %self.settings.sheet_name))]
    async fn append_row(&self, row: Vec<String>) -> SyncResult<()> {
        let url = self.values_url(COLUMN_RANGE, ":append", true);
        let response = self
            .http
            .post(&url)
            .json(&ValueRangeBody {
                values: [row.as_slice()],
            })
            .send()
            .await?;
        read_success(response).await?;
        Ok(())
    }
}
