use crate::domain::model::{FieldMapping, PrecedencePolicy, PriceSource};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "reconcile-etl")]
#[command(about = "Allocate aggregate offers across legacy line items")]
pub struct CliConfig {
    /// Directory holding the input CSV files
    #[arg(long, default_value = ".")]
    pub input_dir: String,

    #[arg(long, default_value = "transactions.csv")]
    pub transactions: String,

    #[arg(long, default_value = "line_items.csv")]
    pub line_items: String,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    /// Column holding a transaction's aggregate offer
    #[arg(long, default_value = "offer")]
    pub target_field: String,

    /// Column holding a line item's weight
    #[arg(long, default_value = "weight")]
    pub weight_field: String,

    /// Field that wins for items already carrying a value: price or buy-price
    #[arg(long, default_value = "price")]
    pub price_source: PriceSource,

    /// Mirror the resolved price into buy_price instead of keeping the item's own
    #[arg(long)]
    pub overwrite_buy_price: bool,

    #[arg(long, default_value = "4")]
    pub workers: usize,

    #[arg(long)]
    pub max_transactions: Option<usize>,

    #[arg(long, value_delimiter = ',', default_value = "csv")]
    pub format: Vec<String>,

    /// Bundle all output files into a single ZIP archive
    #[arg(long)]
    pub zip: bool,

    #[arg(long, default_value = "reconcile_output.zip")]
    pub archive_name: String,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,
}

impl ConfigProvider for CliConfig {
    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn output_formats(&self) -> &[String] {
        &self.format
    }

    fn archive_name(&self) -> Option<&str> {
        self.zip.then_some(self.archive_name.as_str())
    }

    fn precedence(&self) -> PrecedencePolicy {
        PrecedencePolicy {
            source_of_truth: self.price_source,
            preserve_buy_price: !self.overwrite_buy_price,
        }
    }

    fn field_mapping(&self) -> FieldMapping {
        FieldMapping {
            transaction_target: self.target_field.clone(),
            item_weight: self.weight_field.clone(),
            ..FieldMapping::default()
        }
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn max_transactions(&self) -> Option<usize> {
        self.max_transactions
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("input_dir", &self.input_dir)?;
        validation::validate_file_extension("transactions", &self.transactions, &["csv"])?;
        validation::validate_file_extension("line_items", &self.line_items, &["csv"])?;
        validation::validate_path("output_path", &self.output_path)?;
        validation::validate_non_empty_string("target_field", &self.target_field)?;
        validation::validate_non_empty_string("weight_field", &self.weight_field)?;
        validation::validate_range("workers", self.workers, 1, 64)?;
        validation::validate_output_formats("format", &self.format)?;
        if self.zip {
            validation::validate_file_extension("archive_name", &self.archive_name, &["zip"])?;
        }
        Ok(())
    }
}
