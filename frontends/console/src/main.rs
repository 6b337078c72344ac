use std::path::PathBuf;

use anyhow::Result;
use tokio::io::{stdin, stdout, BufReader};
use tracing::info;

use formbridge::logging::init_tracing;
use formbridge::BridgeConfig;
use formbridge_console::app::{load_schema, parse_schema, DEFAULT_CONFIG, DEFAULT_PRESET, DEFAULT_SCHEMA};
use formbridge_console::ConsoleApp;
use formbridge_core::PresetManifest;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Simple argument parsing: --config/-c, --schema/-s, --preset/-p <path>
    let mut args = std::env::args().skip(1);
    let mut config_path: Option<PathBuf> = std::env::var_os("FORMBRIDGE_CONFIG").map(PathBuf::from);
    let mut schema_path: Option<PathBuf> = None;
    let mut preset_path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        let slot = match arg.as_str() {
            "--config" | "-c" => &mut config_path,
            "--schema" | "-s" => &mut schema_path,
            "--preset" | "-p" => &mut preset_path,
            other => {
                eprintln!("Ignoring unknown argument '{}'", other);
                continue;
            }
        };
        if let Some(path) = args.next() {
            *slot = Some(PathBuf::from(path));
        }
    }

    let config = match &config_path {
        Some(path) => BridgeConfig::load_from_file(path)?,
        None => BridgeConfig::from_yaml_str(DEFAULT_CONFIG)?,
    };
    init_tracing(&config.log_filter);

    let schema = match &schema_path {
        Some(path) => load_schema(path)?,
        None => parse_schema(DEFAULT_SCHEMA)?,
    };
    let preset = match &preset_path {
        Some(path) => PresetManifest::load_from_file(path)?,
        None => PresetManifest::from_yaml_str(DEFAULT_PRESET)?,
    };

    info!(
        "Starting console (batching: {}, delay: {}ms)",
        config.batch.enabled, config.batch.delay_ms
    );
    let mut app = ConsoleApp::new(config, schema, &preset).await?;
    println!("formbridge console. Type 'help' for commands.");
    app.run(BufReader::new(stdin()), stdout()).await?;
    app.shutdown();
    Ok(())
}
