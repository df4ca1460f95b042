//! Datasource - run SQL against a generic or embedded backend.

mod cli;

use cli::{Cli, OutputFormat};
use datasource::config::Config;
use datasource::db::{manager_for, ConnectionRegistry, DatasourceManager, ExecOutcome, ResultHandle};
use datasource::logging;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?.datasource;

    // CLI over file over environment.
    config.merge(&cli.to_config_overrides());
    config.apply_env_defaults();

    let params = config.connect_params()?;
    info!("Datasource: {}", config.display_string());

    let registry = ConnectionRegistry::shared();
    let mut manager = manager_for(cli.backend(), &config, registry).await;
    manager.connect(&params).await?;

    let binds = cli.bind_values();
    for sql in &cli.statements {
        match manager.exec(sql, &binds).await? {
            ExecOutcome::Rows(mut rows) => print_rows(manager.as_ref(), &mut rows, cli.format)?,
            ExecOutcome::Count(_) => println!("{}", manager.affected_rows()),
        }
    }

    if let Some(table) = &cli.insert_id {
        println!("{}", manager.insert_id(table).await?);
    }

    manager.disconnect();
    Ok(())
}

fn print_rows(
    manager: &dyn DatasourceManager,
    rows: &mut ResultHandle,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut header_printed = false;

    while let Some(record) = manager.fetch_array(rows) {
        match format {
            OutputFormat::Text => {
                // Field names may be folded, so take the header from a record.
                if !header_printed {
                    println!("{}", record.field_names().collect::<Vec<_>>().join("\t"));
                    header_printed = true;
                }
                let line: Vec<String> = record.iter().map(|(_, v)| v.to_display_string()).collect();
                println!("{}", line.join("\t"));
            }
            OutputFormat::Json => println!("{}", serde_json::to_string(&record.to_json())?),
        }
    }

    Ok(())
}
