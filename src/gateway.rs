use std::fmt;
use std::time::Duration;

use chrono::{Local, Utc};

use crate::backend::{Backend, QueryResult};
use crate::catalog;
use crate::error::GatewayError;
use crate::filename::spreadsheet_filename;
use crate::format::{self, SchemaResponse, SchemaView, TableResponse};
use crate::format_xlsx;
use crate::generator::{DEFAULT_QUERY_TITLE, PlanGenerator};
use crate::output_mode::{OutputMode, RequestedMode, resolve_output_mode};
use crate::projection;
use crate::rewrite::rewrite_reversed_aliases;
use crate::validation::{self, LimitPolicy};
use crate::verbose::{self, Timer};

pub const MAX_PROMPT_CHARS: usize = 4000;
pub const MAX_SQL_CHARS: usize = 16000;
pub const DEFAULT_EXPORT_TITLE: &str = "ai_export";
pub const SUPPORTED_PROVIDER: &str = "openrouter";

const FILENAME_TIMESTAMP: &str = "%Y%m%d_%H%M%S";

/// Pipeline stages, in order. A request either reaches `Delivered` or stops
/// with an error whose [`GatewayError::terminal_state`] says where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Rewritten,
    Validated,
    Executed,
    Projected,
    Delivered,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Rewritten => "rewritten",
            Stage::Validated => "validated",
            Stage::Executed => "executed",
            Stage::Projected => "projected",
            Stage::Delivered => "delivered",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub enabled: bool,
    pub provider: String,
    pub max_rows: usize,
    pub query_timeout: Duration,
    pub llm_timeout: Duration,
    pub verbose: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: SUPPORTED_PROVIDER.to_string(),
            max_rows: 500,
            query_timeout: Duration::from_millis(5000),
            llm_timeout: Duration::from_millis(15000),
            verbose: false,
        }
    }
}

/// A natural-language request.
#[derive(Debug, Clone, Default)]
pub struct PromptRequest {
    pub prompt: String,
    pub output_mode: RequestedMode,
    pub unlimited: bool,
    /// Absent means human-readable.
    pub human_readable: Option<bool>,
}

/// A caller-supplied statement, always delivered as a spreadsheet.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub sql: String,
    pub title: String,
    pub unlimited: bool,
    pub human_readable: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct SpreadsheetResponse {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// The sanitized statement that was executed.
    pub sql: String,
    pub row_count: usize,
}

#[derive(Debug, Clone)]
pub enum GatewayResponse {
    Table(TableResponse),
    Spreadsheet(SpreadsheetResponse),
}

impl GatewayResponse {
    pub fn sql(&self) -> &str {
        match self {
            GatewayResponse::Table(t) => &t.sql,
            GatewayResponse::Spreadsheet(s) => &s.sql,
        }
    }
}

pub struct Gateway<B: Backend> {
    backend: B,
    settings: GatewaySettings,
}

impl<B: Backend> Gateway<B> {
    pub fn new(backend: B, settings: GatewaySettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Catalog listing plus the settings a client needs to phrase requests.
    pub fn schema(&self) -> SchemaResponse {
        SchemaResponse {
            enabled: self.settings.enabled,
            max_rows: self.settings.max_rows,
            views: catalog::list().iter().map(SchemaView::from).collect(),
        }
    }

    /// Prompt → plan → rewrite → validate → execute → project → deliver.
    pub async fn run_prompt<G: PlanGenerator>(
        &self,
        generator: &G,
        request: PromptRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        self.ensure_available()?;
        let prompt = request.prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(input_error("prompt is required"));
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(input_error("prompt is too long"));
        }
        let human_readable = request.human_readable.unwrap_or(true);
        let max_rows = self.resolve_max_rows(request.unlimited);
        self.enter(Stage::Received);

        let timer = Timer::start();
        let plan = tokio::time::timeout(self.settings.llm_timeout, generator.generate(&prompt, max_rows))
            .await
            .map_err(|_| GatewayError::Generation {
                message: format!(
                    "no plan after {}ms",
                    self.settings.llm_timeout.as_millis()
                ),
            })??;
        if plan.sql.trim().is_empty() {
            return Err(GatewayError::Generation {
                message: "model returned empty SQL".to_string(),
            });
        }
        verbose::timed(self.settings.verbose, "plan generated", &timer, &[]);

        let sql = rewrite_reversed_aliases(&plan.sql);
        self.enter(Stage::Rewritten);

        let (sql, result) = self
            .validate_and_run(&sql, max_rows, human_readable)
            .await?;

        let mode = resolve_output_mode(&prompt, request.output_mode, &plan.output_mode);
        let title = match plan.title.trim() {
            "" => DEFAULT_QUERY_TITLE.to_string(),
            t => t.to_string(),
        };

        let response = match mode {
            OutputMode::Xlsx => {
                GatewayResponse::Spreadsheet(self.spreadsheet(&title, DEFAULT_QUERY_TITLE, sql, &result)?)
            }
            OutputMode::Table => GatewayResponse::Table(TableResponse {
                prompt,
                title,
                sql,
                output_mode: mode,
                rows: format::rows_to_json(&result),
                row_count: result.row_count(),
                columns: result.columns,
                unlimited: request.unlimited,
                human_readable,
                generated_at: format::timestamp_rfc3339(Utc::now()),
            }),
        };
        self.enter(Stage::Delivered);
        Ok(response)
    }

    /// Run a caller-supplied statement and build a spreadsheet from it.
    ///
    /// The alias rewriter is skipped: export SQL is usually a statement this
    /// gateway already sanitized.
    pub async fn run_export(
        &self,
        request: ExportRequest,
    ) -> Result<SpreadsheetResponse, GatewayError> {
        self.ensure_available()?;
        let sql = request.sql.trim();
        if sql.is_empty() {
            return Err(input_error("sql is required"));
        }
        if sql.chars().count() > MAX_SQL_CHARS {
            return Err(input_error("sql is too long"));
        }
        let human_readable = request.human_readable.unwrap_or(true);
        let max_rows = self.resolve_max_rows(request.unlimited);
        self.enter(Stage::Received);

        let (sql, result) = self.validate_and_run(sql, max_rows, human_readable).await?;
        let response = self.spreadsheet(&request.title, DEFAULT_EXPORT_TITLE, sql, &result)?;
        self.enter(Stage::Delivered);
        Ok(response)
    }

    async fn validate_and_run(
        &self,
        sql: &str,
        max_rows: usize,
        human_readable: bool,
    ) -> Result<(String, QueryResult), GatewayError> {
        let safe_sql = validation::validate(sql, LimitPolicy::new(max_rows))
            .into_result()
            .map_err(|reason| {
                verbose::emit(self.settings.verbose, &format!("rejected: {}", reason));
                GatewayError::Validation { reason }
            })?;
        self.enter(Stage::Validated);
        verbose::emit(self.settings.verbose, &format!("sql: {}", safe_sql));

        let timer = Timer::start();
        let result = self
            .backend
            .execute(&safe_sql, max_rows, self.settings.query_timeout)
            .await?;
        let rows = format!("{} rows", result.row_count());
        let cap = if result.truncated { "row cap reached" } else { "" };
        verbose::timed(
            self.settings.verbose,
            &format!("stage: {}", Stage::Executed),
            &timer,
            &[rows.as_str(), cap],
        );

        let result = projection::project(result, human_readable);
        self.enter(Stage::Projected);
        Ok((safe_sql, result))
    }

    fn spreadsheet(
        &self,
        title: &str,
        default_title: &str,
        sql: String,
        result: &QueryResult,
    ) -> Result<SpreadsheetResponse, GatewayError> {
        let bytes = format_xlsx::to_xlsx(result)?;
        let timestamp = Local::now().format(FILENAME_TIMESTAMP).to_string();
        Ok(SpreadsheetResponse {
            filename: spreadsheet_filename(title, default_title, &timestamp),
            bytes,
            sql,
            row_count: result.row_count(),
        })
    }

    fn ensure_available(&self) -> Result<(), GatewayError> {
        if !self.settings.enabled {
            return Err(GatewayError::Config {
                message: "assistant is disabled in config".to_string(),
            });
        }
        if !self
            .settings
            .provider
            .trim()
            .eq_ignore_ascii_case(SUPPORTED_PROVIDER)
        {
            return Err(GatewayError::Config {
                message: format!("unsupported provider \"{}\"", self.settings.provider.trim()),
            });
        }
        Ok(())
    }

    fn resolve_max_rows(&self, unlimited: bool) -> usize {
        if unlimited { 0 } else { self.settings.max_rows }
    }

    fn enter(&self, stage: Stage) {
        verbose::stage(self.settings.verbose, stage);
    }
}

fn input_error(message: &str) -> GatewayError {
    GatewayError::Input {
        message: message.to_string(),
    }
}
