use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sqlgate", about = "Natural-language questions over a read-only SQLite view catalog")]
pub struct Cli {
    /// Path to config file
    #[arg(short = 'c', long, global = true, env = "SQLGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit diagnostics to stderr
    #[arg(short = 'v', long, global = true, env = "SQLGATE_VERBOSE")]
    pub verbose: bool,

    /// Disable credential masking
    #[arg(long, global = true, env = "SQLGATE_SHOW_SECRETS")]
    pub show_secrets: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Turn a prompt into a validated query and run it
    Query(QueryArgs),

    /// Run a SELECT statement and write the result as a spreadsheet
    Export(ExportArgs),

    /// Print the view catalog
    Schema(SchemaArgs),

    /// Create or refresh the catalog views in the database
    #[command(name = "install-views")]
    InstallViews(InstallViewsArgs),
}

/// Database, limits and generator settings shared by every command.
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// SQLite database file
    #[arg(short = 'd', long, env = "SQLGATE_DATABASE")]
    pub database: Option<PathBuf>,

    /// Max rows per query (default: 500)
    #[arg(short = 'l', long, env = "SQLGATE_MAX_ROWS")]
    pub max_rows: Option<i64>,

    /// Query timeout in milliseconds (default: 5000)
    #[arg(short = 't', long, env = "SQLGATE_QUERY_TIMEOUT_MS")]
    pub query_timeout_ms: Option<u64>,

    /// Generator timeout in milliseconds (default: 15000)
    #[arg(long, env = "SQLGATE_LLM_TIMEOUT_MS")]
    pub llm_timeout_ms: Option<u64>,

    /// Generator provider (only "openrouter" is supported)
    #[arg(long, env = "SQLGATE_PROVIDER")]
    pub provider: Option<String>,

    /// Chat-completions base URL
    #[arg(long, env = "SQLGATE_BASE_URL")]
    pub base_url: Option<String>,

    /// Model identifier
    #[arg(short = 'm', long, env = "SQLGATE_MODEL")]
    pub model: Option<String>,

    /// Generator API key (falls back to api_key_env, then SQLGATE_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// HTTP-Referer attribution header
    #[arg(long, env = "SQLGATE_REFERER")]
    pub referer: Option<String>,

    /// X-Title attribution header
    #[arg(long, env = "SQLGATE_APP_TITLE")]
    pub app_title: Option<String>,

    /// Sampling temperature, clamped to [0, 1]
    #[arg(long, env = "SQLGATE_TEMPERATURE")]
    pub temperature: Option<f64>,

    /// Config file profile name
    #[arg(short = 'P', long, env = "SQLGATE_PROFILE")]
    pub profile: Option<String>,
}

#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// Question in natural language
    pub prompt: String,

    /// Delivery mode: auto, table or xlsx
    #[arg(long = "mode", default_value = "auto")]
    pub mode: String,

    /// Disable the row cap
    #[arg(long)]
    pub unlimited: bool,

    /// Keep raw column names and technical columns
    #[arg(long)]
    pub raw_columns: bool,

    /// Spreadsheet destination: a file, or a directory for the derived name
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// SQL query text
    pub sql: Option<String>,

    /// Read SQL from file
    #[arg(short = 'f', long = "file", conflicts_with = "sql")]
    pub sql_file: Option<PathBuf>,

    /// Title used for the spreadsheet filename
    #[arg(long, default_value = "")]
    pub title: String,

    /// Disable the row cap
    #[arg(long)]
    pub unlimited: bool,

    /// Keep raw column names and technical columns
    #[arg(long)]
    pub raw_columns: bool,

    /// Spreadsheet destination: a file, or a directory for the derived name
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Parser, Debug)]
pub struct SchemaArgs {
    /// Print the generator system prompt instead of the JSON listing
    #[arg(long)]
    pub prompt: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Parser, Debug)]
pub struct InstallViewsArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,
}
