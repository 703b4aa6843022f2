use crate::domain::model::Record;
use crate::domain::ports::{RecordSource, Storage};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

/// 從兩個 CSV 檔讀取交易與明細，第一列必須是標題
pub struct CsvSource<S: Storage> {
    storage: S,
    transactions_file: String,
    line_items_file: String,
}

impl<S: Storage> CsvSource<S> {
    pub fn new(storage: S, transactions_file: String, line_items_file: String) -> Self {
        Self {
            storage,
            transactions_file,
            line_items_file,
        }
    }

    async fn read_records(&self, path: &str) -> Result<Vec<Record>> {
        tracing::debug!("Reading CSV rows from: {}", path);
        let bytes = self.storage.read_file(path).await?;
        let records = parse_csv(&bytes)?;
        tracing::debug!("Read {} rows from {}", records.len(), path);
        Ok(records)
    }
}

/// Parses CSV bytes into records keyed by header. Blank cells become `null`.
///
/// Rows whose field count differs from the header are kept but tagged as
/// malformed, so one ragged row never fails the whole file.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let malformed = (row.len() != headers.len()).then(|| {
            let line = row.position().map(|p| p.line()).unwrap_or_default();
            format!(
                "line {} has {} fields, header has {}",
                line,
                row.len(),
                headers.len()
            )
        });
        let data = headers
            .iter()
            .zip(row.iter())
            .map(|(header, cell)| {
                let value = if cell.is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::Value::String(cell.to_string())
                };
                (header.to_string(), value)
            })
            .collect();
        records.push(Record { data, malformed });
    }
    Ok(records)
}

#[async_trait]
impl<S: Storage> RecordSource for CsvSource<S> {
    async fn transactions(&self) -> Result<Vec<Record>> {
        self.read_records(&self.transactions_file).await
    }

    async fn line_items(&self) -> Result<Vec<Record>> {
        self.read_records(&self.line_items_file).await
    }
}

/// 從 HTTP 端點讀取 JSON 陣列
pub struct ApiSource {
    client: Client,
    transactions_endpoint: String,
    line_items_endpoint: String,
    headers: HashMap<String, String>,
    timeout: Option<Duration>,
}

impl ApiSource {
    pub fn new(transactions_endpoint: String, line_items_endpoint: String) -> Self {
        Self {
            client: Client::new(),
            transactions_endpoint,
            line_items_endpoint,
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn fetch(&self, endpoint: &str) -> Result<Vec<Record>> {
        let mut request = self.client.get(endpoint);

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!("Making API request to: {}", endpoint);
        let response = request.send().await?;
        tracing::debug!("API response status: {}", response.status());

        if !response.status().is_success() {
            return Err(EtlError::ProcessingError {
                message: format!("{} returned HTTP {}", endpoint, response.status()),
            });
        }

        let json_data: serde_json::Value = response.json().await?;
        json_to_records(json_data).map_err(|message| EtlError::ProcessingError {
            message: format!("{}: {}", endpoint, message),
        })
    }
}

fn json_to_records(json_data: serde_json::Value) -> std::result::Result<Vec<Record>, String> {
    match json_data {
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                serde_json::Value::Object(obj) => Ok(Record::new(obj.into_iter().collect())),
                other => Err(format!("element {} is not an object: {}", index, other)),
            })
            .collect(),
        // 單一物件包裝成陣列
        serde_json::Value::Object(obj) => Ok(vec![Record::new(obj.into_iter().collect())]),
        other => Err(format!("expected a JSON array of objects, got {}", other)),
    }
}

#[async_trait]
impl RecordSource for ApiSource {
    async fn transactions(&self) -> Result<Vec<Record>> {
        self.fetch(&self.transactions_endpoint).await
    }

    async fn line_items(&self) -> Result<Vec<Record>> {
        self.fetch(&self.line_items_endpoint).await
    }
}
