use crate::domain::model::{AllocationRow, BatchWarning, ReconciledBatch};
use crate::domain::ports::{RecordSink, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

pub const ALLOCATIONS_CSV: &str = "allocations.csv";
pub const ALLOCATIONS_JSON: &str = "allocations.json";
pub const WARNINGS_CSV: &str = "warnings.csv";
pub const SUMMARY_JSON: &str = "summary.json";

/// 將批次結果寫入 Storage，可選擇打包成 ZIP
pub struct StorageSink<S: Storage> {
    storage: S,
    output_formats: Vec<String>,
    archive_name: Option<String>,
}

impl<S: Storage> StorageSink<S> {
    pub fn new(storage: S, output_formats: Vec<String>, archive_name: Option<String>) -> Self {
        Self {
            storage,
            output_formats,
            archive_name,
        }
    }

    fn wants(&self, format: &str) -> bool {
        self.output_formats.iter().any(|f| f == format)
    }

    /// Renders every output file as (name, bytes), allocations first.
    pub fn render(&self, batch: &ReconciledBatch) -> Result<Vec<(&'static str, Vec<u8>)>> {
        let mut files = Vec::new();

        if self.wants("csv") {
            files.push((ALLOCATIONS_CSV, allocations_csv(&batch.rows)?));
        }
        if self.wants("json") {
            files.push((ALLOCATIONS_JSON, serde_json::to_vec_pretty(&batch.rows)?));
        }
        files.push((WARNINGS_CSV, warnings_csv(&batch.warnings)?));
        files.push((SUMMARY_JSON, serde_json::to_vec_pretty(&batch.summary)?));

        Ok(files)
    }
}

fn allocations_csv(rows: &[AllocationRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["transaction_id", "item_id", "price", "buy_price", "origin"])?;
    for row in rows {
        let price = row.price.to_string();
        let buy_price = row.buy_price.to_string();
        writer.write_record([
            row.transaction_id.as_str(),
            row.item_id.as_str(),
            price.as_str(),
            buy_price.as_str(),
            row.origin.as_str(),
        ])?;
    }
    into_bytes(writer)
}

fn warnings_csv(warnings: &[BatchWarning]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["transaction_id", "item_id", "kind", "detail"])?;
    for warning in warnings {
        writer.write_record([
            warning.transaction_id.as_deref().unwrap_or(""),
            warning.item_id.as_deref().unwrap_or(""),
            warning.kind.as_str(),
            warning.detail.as_str(),
        ])?;
    }
    into_bytes(writer)
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| crate::utils::error::EtlError::IoError(e.into_error()))
}

#[async_trait]
impl<S: Storage> RecordSink for StorageSink<S> {
    async fn write(&self, batch: &ReconciledBatch) -> Result<String> {
        let files = self.render(batch)?;

        if let Some(archive_name) = &self.archive_name {
            tracing::debug!("Creating ZIP file with {} files", files.len());

            let zip_data = {
                let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
                for (name, data) in &files {
                    zip.start_file::<_, ()>(*name, FileOptions::default())?;
                    zip.write_all(data)?;
                }
                zip.finish()?.into_inner()
            };

            tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
            self.storage.write_file(archive_name, &zip_data).await?;
            return Ok(self.storage.location(archive_name));
        }

        for (name, data) in &files {
            tracing::debug!("Writing {} ({} bytes)", name, data.len());
            self.storage.write_file(name, data).await?;
        }

        // 回傳主要輸出檔的位置
        let primary = files.first().map(|(name, _)| *name).unwrap_or(SUMMARY_JSON);
        Ok(self.storage.location(primary))
    }
}
