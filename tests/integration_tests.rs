use anyhow::Result;
use httpmock::prelude::*;
use reconcile_etl::config::toml_config::TomlConfig;
use reconcile_etl::core::ConfigProvider;
use reconcile_etl::{
    ApiSource, CliConfig, CsvSource, EtlEngine, LocalStorage, PriceSource, ReconcilePipeline,
    StorageSink,
};
use tempfile::TempDir;

const TRANSACTIONS: &str = "\
id,offer
T1,100.00
T2,10.00
T3,
T4,50.00
";

const LINE_ITEMS: &str = "\
id,transaction_id,price,buy_price,weight
I1,T1,40.00,,
I2,T1,,,10
I3,T1,,,10
I4,T2,,,
I5,T2,,,
I6,T2,,,
I7,T3,25.00,20.00,
I8,T4,,,abc
I9,T99,,,1
I10,T1,5.00,,,extra
";

fn cli_config(input_dir: &str, output_dir: &str) -> CliConfig {
    CliConfig {
        input_dir: input_dir.to_string(),
        transactions: "transactions.csv".to_string(),
        line_items: "line_items.csv".to_string(),
        output_path: output_dir.to_string(),
        target_field: "offer".to_string(),
        weight_field: "weight".to_string(),
        price_source: PriceSource::Price,
        overwrite_buy_price: false,
        workers: 2,
        max_transactions: None,
        format: vec!["csv".to_string()],
        zip: false,
        archive_name: "reconcile_output.zip".to_string(),
        verbose: false,
        monitor: false,
    }
}

async fn write_inputs(dir: &TempDir) -> Result<()> {
    tokio::fs::write(dir.path().join("transactions.csv"), TRANSACTIONS).await?;
    tokio::fs::write(dir.path().join("line_items.csv"), LINE_ITEMS).await?;
    Ok(())
}

fn build_engine(
    config: CliConfig,
) -> EtlEngine<ReconcilePipeline<CsvSource<LocalStorage>, StorageSink<LocalStorage>, CliConfig>> {
    let source = CsvSource::new(
        LocalStorage::new(config.input_dir.clone()),
        config.transactions.clone(),
        config.line_items.clone(),
    );
    let sink = StorageSink::new(
        LocalStorage::new(config.output_path.clone()),
        config.format.clone(),
        config.archive_name().map(str::to_string),
    );
    EtlEngine::new(ReconcilePipeline::new(source, sink, config))
}

#[tokio::test]
async fn test_end_to_end_csv_reconciliation() -> Result<()> {
    let input_dir = TempDir::new()?;
    let output_dir = TempDir::new()?;
    write_inputs(&input_dir).await?;

    let config = cli_config(
        input_dir.path().to_str().unwrap(),
        output_dir.path().to_str().unwrap(),
    );
    let output = build_engine(config).run().await?;
    assert!(output.ends_with("allocations.csv"));

    let allocations = tokio::fs::read_to_string(output_dir.path().join("allocations.csv")).await?;
    let lines: Vec<&str> = allocations.lines().collect();
    assert_eq!(
        lines,
        vec![
            "transaction_id,item_id,price,buy_price,origin",
            "T1,I1,40.00,40.00,existing",
            "T1,I2,30.00,30.00,allocated",
            "T1,I3,30.00,30.00,allocated",
            "T2,I4,3.33,3.33,allocated",
            "T2,I5,3.33,3.33,allocated",
            "T2,I6,3.34,3.34,allocated",
            "T3,I7,25.00,20.00,existing",
            "T4,I8,50.00,50.00,allocated",
        ]
    );

    let warnings = tokio::fs::read_to_string(output_dir.path().join("warnings.csv")).await?;
    assert!(warnings.contains("T3,,missing_target"));
    assert!(warnings.contains("T4,I8,invalid_number"));
    assert!(warnings.contains("T99,I9,orphan_line_item"));
    assert!(warnings.contains("T1,I10,malformed_row"));

    let summary: serde_json::Value = serde_json::from_str(
        &tokio::fs::read_to_string(output_dir.path().join("summary.json")).await?,
    )?;
    assert_eq!(summary["transactions"], 4);
    assert_eq!(summary["line_items"], 8);
    assert_eq!(summary["allocated_items"], 6);
    assert_eq!(summary["target_total"], "160.00");
    assert_eq!(summary["allocated_total"], "120.00");
    assert_eq!(summary["existing_total"], "65.00");
    assert_eq!(summary["warnings"]["malformed_row"], 1);

    Ok(())
}

#[tokio::test]
async fn test_buy_price_policy_changes_existing_items() -> Result<()> {
    let input_dir = TempDir::new()?;
    let output_dir = TempDir::new()?;
    write_inputs(&input_dir).await?;

    let mut config = cli_config(
        input_dir.path().to_str().unwrap(),
        output_dir.path().to_str().unwrap(),
    );
    config.price_source = PriceSource::BuyPrice;
    config.overwrite_buy_price = true;
    build_engine(config).run().await?;

    let allocations = tokio::fs::read_to_string(output_dir.path().join("allocations.csv")).await?;
    assert!(allocations.contains("T3,I7,20.00,20.00,existing"));

    Ok(())
}

#[tokio::test]
async fn test_zip_output_with_json_rows() -> Result<()> {
    let input_dir = TempDir::new()?;
    let output_dir = TempDir::new()?;
    write_inputs(&input_dir).await?;

    let mut config = cli_config(
        input_dir.path().to_str().unwrap(),
        output_dir.path().to_str().unwrap(),
    );
    config.format = vec!["csv".to_string(), "json".to_string()];
    config.zip = true;
    config.max_transactions = Some(1);

    let output = build_engine(config).run().await?;
    assert!(output.ends_with("reconcile_output.zip"));

    let zip_data = std::fs::read(output_dir.path().join("reconcile_output.zip"))?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data))?;
    assert_eq!(archive.len(), 4);

    let mut json_file = archive.by_name("allocations.json")?;
    let mut json_content = String::new();
    std::io::Read::read_to_string(&mut json_file, &mut json_content)?;

    let rows: Vec<serde_json::Value> = serde_json::from_str(&json_content)?;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1]["price"], "30.00");

    Ok(())
}

#[tokio::test]
async fn test_missing_input_file_fails() -> Result<()> {
    let input_dir = TempDir::new()?;
    let output_dir = TempDir::new()?;

    let config = cli_config(
        input_dir.path().to_str().unwrap(),
        output_dir.path().to_str().unwrap(),
    );
    let err = build_engine(config).run().await.unwrap_err();

    assert_eq!(err.severity().exit_code(), 3);
    assert!(!output_dir.path().join("allocations.csv").exists());

    Ok(())
}

#[tokio::test]
async fn test_end_to_end_api_source_from_toml() -> Result<()> {
    let output_dir = TempDir::new()?;
    let server = MockServer::start();

    let transactions_mock = server.mock(|when, then| {
        when.method(GET).path("/trades");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(serde_json::json!([
                {"trade_id": 501, "final_offer": 250.5},
                {"trade_id": 502, "final_offer": "75"}
            ]));
    });
    let items_mock = server.mock(|when, then| {
        when.method(GET).path("/trade-items");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(serde_json::json!([
                {"id": 1, "trade_id": 501, "dwt": 2},
                {"id": 2, "trade_id": 501, "dwt": 3},
                {"id": 3, "trade_id": 502, "price": "75.00"}
            ]));
    });

    let toml_content = format!(
        r#"
[job]
name = "api-trades"

[source]
type = "api"
transactions = "{base}/trades"
line_items = "{base}/trade-items"

[fields]
transaction_id = "trade_id"
transaction_target = "final_offer"
item_transaction_id = "trade_id"
item_weight = "dwt"

[allocation]
workers = 1

[load]
output_path = "{output}"
output_formats = ["csv"]
"#,
        base = server.base_url(),
        output = output_dir.path().to_str().unwrap().replace('\\', "/")
    );
    let config = TomlConfig::from_toml_str(&toml_content)?;

    let source = ApiSource::new(
        config.source.transactions.clone(),
        config.source.line_items.clone(),
    );
    let sink = StorageSink::new(
        LocalStorage::new(config.output_path().to_string()),
        config.output_formats().to_vec(),
        config.archive_name().map(str::to_string),
    );
    let engine = EtlEngine::new(ReconcilePipeline::new(source, sink, config));
    engine.run().await?;

    transactions_mock.assert();
    items_mock.assert();

    let allocations = tokio::fs::read_to_string(output_dir.path().join("allocations.csv")).await?;
    assert!(allocations.contains("501,1,100.20,100.20,allocated"));
    assert!(allocations.contains("501,2,150.30,150.30,allocated"));
    assert!(allocations.contains("502,3,75.00,75.00,existing"));

    Ok(())
}

#[tokio::test]
async fn test_dry_run_writes_nothing() -> Result<()> {
    let input_dir = TempDir::new()?;
    let output_dir = TempDir::new()?;
    write_inputs(&input_dir).await?;

    let config = cli_config(
        input_dir.path().to_str().unwrap(),
        output_dir.path().to_str().unwrap(),
    );
    let summary = build_engine(config).dry_run().await?;

    assert_eq!(summary.transactions, 4);
    assert!(!output_dir.path().join("allocations.csv").exists());

    Ok(())
}
