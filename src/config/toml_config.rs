use crate::domain::model::{FieldMapping, PrecedencePolicy, PriceSource};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub job: JobConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub fields: FieldMapping,
    #[serde(default)]
    pub allocation: AllocationConfig,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Csv,
    Api,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub r#type: SourceKind,
    /// CSV 檔名或 API 端點
    pub transactions: String,
    pub line_items: String,
    pub input_dir: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    #[serde(default)]
    pub price_source: PriceSource,
    #[serde(default = "default_true")]
    pub preserve_buy_price: bool,
    pub workers: Option<usize>,
    pub max_transactions: Option<usize>,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            price_source: PriceSource::default(),
            preserve_buy_price: true,
            workers: None,
            max_transactions: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    pub output_formats: Vec<String>,
    pub compression: Option<CompressionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    /// "compact" 或 "json"
    pub log_format: Option<String>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${LEGACY_API_TOKEN})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn input_dir(&self) -> &str {
        self.source.input_dir.as_deref().unwrap_or(".")
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.log_format.as_deref())
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn output_formats(&self) -> &[String] {
        &self.load.output_formats
    }

    fn archive_name(&self) -> Option<&str> {
        self.load
            .compression
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c.filename.as_str())
    }

    fn precedence(&self) -> PrecedencePolicy {
        PrecedencePolicy {
            source_of_truth: self.allocation.price_source,
            preserve_buy_price: self.allocation.preserve_buy_price,
        }
    }

    fn field_mapping(&self) -> FieldMapping {
        self.fields.clone()
    }

    fn workers(&self) -> usize {
        self.allocation.workers.unwrap_or(4)
    }

    fn max_transactions(&self) -> Option<usize> {
        self.allocation.max_transactions
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("job.name", &self.job.name)?;

        match self.source.r#type {
            SourceKind::Csv => {
                let input_dir = validation::validate_required_field("source.input_dir", &self.source.input_dir)?;
                validation::validate_path("source.input_dir", input_dir)?;
                validation::validate_file_extension("source.transactions", &self.source.transactions, &["csv"])?;
                validation::validate_file_extension("source.line_items", &self.source.line_items, &["csv"])?;
            }
            SourceKind::Api => {
                validation::validate_url("source.transactions", &self.source.transactions)?;
                validation::validate_url("source.line_items", &self.source.line_items)?;
            }
        }

        validation::validate_non_empty_string("fields.transaction_id", &self.fields.transaction_id)?;
        validation::validate_non_empty_string("fields.transaction_target", &self.fields.transaction_target)?;
        validation::validate_non_empty_string("fields.item_id", &self.fields.item_id)?;
        validation::validate_non_empty_string("fields.item_transaction_id", &self.fields.item_transaction_id)?;

        validation::validate_range("allocation.workers", self.workers(), 1, 64)?;
        validation::validate_path("load.output_path", &self.load.output_path)?;
        validation::validate_output_formats("load.output_formats", &self.load.output_formats)?;

        if let Some(archive) = self.archive_name() {
            validation::validate_file_extension("load.compression.filename", archive, &["zip"])?;
        }

        Ok(())
    }
}
