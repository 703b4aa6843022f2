use crate::domain::model::{FieldMapping, PrecedencePolicy, ReconciledBatch, Record, Transaction};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// 給使用者看的輸出位置
    fn location(&self, path: &str) -> String;
}

pub trait ConfigProvider: Send + Sync {
    fn output_path(&self) -> &str;
    fn output_formats(&self) -> &[String];
    /// ZIP 檔名；`None` 表示輸出個別檔案
    fn archive_name(&self) -> Option<&str>;
    fn precedence(&self) -> PrecedencePolicy;
    fn field_mapping(&self) -> FieldMapping;
    fn workers(&self) -> usize;
    fn max_transactions(&self) -> Option<usize>;
}

/// 舊系統資料的讀取端，列的順序必須與來源一致
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn transactions(&self) -> Result<Vec<Record>>;
    async fn line_items(&self) -> Result<Vec<Record>>;
}

/// Persists a reconciled batch and returns where it was written.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write(&self, batch: &ReconciledBatch) -> Result<String>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<Transaction>>;
    async fn transform(&self, data: Vec<Transaction>) -> Result<ReconciledBatch>;
    async fn load(&self, batch: ReconciledBatch) -> Result<String>;
}
