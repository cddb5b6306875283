use clap::Parser;
use sqlgate::backend::sqlite::{ReadOnlyPool, SqliteBackend, connect_writable};
use sqlgate::cli::{self, Cli, Command};
use sqlgate::error::GatewayError;
use sqlgate::gateway::{ExportRequest, Gateway, GatewayResponse, PromptRequest};
use sqlgate::output_mode::RequestedMode;
use sqlgate::generator::openrouter::OpenRouterGenerator;
use sqlgate::verbose::{self, Timer};
use sqlgate::{catalog, config, generator, output};
use std::path::PathBuf;
use std::process;

#[tokio::main]
async fn main() {
    // Load .env file (optional, ignore if missing)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config_path = cli.config.as_ref();

    let result = match cli.command {
        Command::Query(ref args) => query(args, cli.verbose, cli.show_secrets, config_path).await,
        Command::Export(ref args) => export(args, cli.verbose, cli.show_secrets, config_path).await,
        Command::Schema(ref args) => schema(args, cli.verbose, cli.show_secrets, config_path).await,
        Command::InstallViews(ref args) => {
            install_views(args, cli.verbose, cli.show_secrets, config_path).await
        }
    };

    if let Err(err) = result {
        output::print_error(&err);
        process::exit(1);
    }
}

async fn query(
    args: &cli::QueryArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<(), GatewayError> {
    let app_config = config::load(&args.settings, verbose, show_secrets, config_path)?;
    log_config(&app_config);
    let output_mode = args.mode.parse::<RequestedMode>()?;
    let generator = OpenRouterGenerator::new(app_config.generator_settings()?);

    let pool = ReadOnlyPool::open(&app_config.database);
    let gateway = Gateway::new(SqliteBackend::new(&pool), app_config.gateway_settings());
    let request = PromptRequest {
        prompt: args.prompt.clone(),
        output_mode,
        unlimited: args.unlimited,
        human_readable: Some(!args.raw_columns),
    };

    let result = gateway.run_prompt(&generator, request).await;
    pool.close().await;

    match result? {
        GatewayResponse::Table(table) => output::print_json(&table),
        GatewayResponse::Spreadsheet(sheet) => {
            let path = output::write_spreadsheet(&sheet, args.output.as_deref())?;
            output::print_summary(&path, sheet.row_count, &sheet.sql)
        }
    }
}

async fn export(
    args: &cli::ExportArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<(), GatewayError> {
    let app_config = config::load(&args.settings, verbose, show_secrets, config_path)?;
    log_config(&app_config);
    let sql = resolve_sql(args)?;

    let pool = ReadOnlyPool::open(&app_config.database);
    let gateway = Gateway::new(SqliteBackend::new(&pool), app_config.gateway_settings());
    let request = ExportRequest {
        sql,
        title: args.title.clone(),
        unlimited: args.unlimited,
        human_readable: Some(!args.raw_columns),
    };

    let result = gateway.run_export(request).await;
    pool.close().await;

    let sheet = result?;
    let path = output::write_spreadsheet(&sheet, args.output.as_deref())?;
    output::print_summary(&path, sheet.row_count, &sheet.sql)
}

async fn schema(
    args: &cli::SchemaArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<(), GatewayError> {
    let app_config = config::load(&args.settings, verbose, show_secrets, config_path)?;
    if args.prompt {
        print!("{}", generator::build_system_prompt(app_config.max_rows));
        return Ok(());
    }
    // The pool connects lazily, so listing the schema never opens the database.
    let pool = ReadOnlyPool::open(&app_config.database);
    let gateway = Gateway::new(SqliteBackend::new(&pool), app_config.gateway_settings());
    output::print_json(&gateway.schema())
}

async fn install_views(
    args: &cli::InstallViewsArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<(), GatewayError> {
    let app_config = config::load(&args.settings, verbose, show_secrets, config_path)?;
    let verbose = app_config.verbose;

    verbose::emit(
        verbose,
        &format!("installing views into {}...", app_config.database.display()),
    );
    let timer = Timer::start();
    let pool = connect_writable(&app_config.database).await?;
    let installed = catalog::ensure_installed(&pool).await;
    pool.close().await;
    installed?;
    verbose::timed(
        verbose,
        &format!("{} views installed", catalog::list().len()),
        &timer,
        &[],
    );
    Ok(())
}

// --- Helpers ---

fn resolve_sql(args: &cli::ExportArgs) -> Result<String, GatewayError> {
    if let Some(ref sql) = args.sql {
        return Ok(sql.clone());
    }
    if let Some(ref path) = args.sql_file {
        let content = std::fs::read_to_string(path).map_err(|e| GatewayError::Input {
            message: format!("cannot read SQL file {}: {}", path.display(), e),
        })?;
        return Ok(content);
    }
    Err(GatewayError::Input {
        message: "no SQL provided: use positional argument or --file".to_string(),
    })
}

fn log_config(app_config: &config::AppConfig) {
    for line in app_config.describe() {
        verbose::emit(app_config.verbose, &line);
    }
}
