use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use sqlgate::backend::sqlite::{ReadOnlyPool, SqliteBackend};
use sqlgate::catalog;
use sqlgate::error::{GatewayError, TerminalState};
use sqlgate::gateway::{
    ExportRequest, Gateway, GatewayResponse, GatewaySettings, PromptRequest, Stage,
};
use sqlgate::generator::{PlanGenerator, QueryPlan};
use sqlgate::output_mode::{OutputMode, RequestedMode};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;

/// Returns a fixed plan and records what it was asked.
struct StubGenerator {
    plan: Result<QueryPlan, String>,
    delay: Duration,
    calls: Mutex<Vec<(String, usize)>>,
}

impl StubGenerator {
    fn returning(sql: &str, output_mode: &str, title: &str) -> Self {
        Self {
            plan: Ok(QueryPlan {
                sql: sql.to_string(),
                output_mode: output_mode.to_string(),
                title: title.to_string(),
            }),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            plan: Err(message.to_string()),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

impl PlanGenerator for StubGenerator {
    async fn generate(&self, prompt: &str, max_rows: usize) -> Result<QueryPlan, GatewayError> {
        self.calls.lock().unwrap().push((prompt.to_string(), max_rows));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.plan.clone().map_err(|message| GatewayError::Generation { message })
    }
}

/// Database with every base table, the catalog views, and three companies
/// (one soft-deleted).
async fn installed_database() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("main.db");
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    for view in catalog::list() {
        let table = view
            .materializing_statement
            .split("FROM")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap();
        let mut columns: Vec<String> = view.columns.iter().map(|c| format!("\"{}\"", c)).collect();
        columns.push("deleted_at DATETIME".to_string());
        sqlx::query(&format!("CREATE TABLE {} ({})", table, columns.join(", ")))
            .execute(&pool)
            .await
            .unwrap();
    }
    catalog::ensure_installed(&pool).await.unwrap();

    sqlx::query(
        "INSERT INTO companies (id, name, phone, deleted_at) VALUES
            (1, 'Alpha', '+7 900 000 00 01', NULL),
            (2, 'Beta', '+7 900 000 00 02', NULL),
            (3, 'Gone', NULL, '2024-01-01 00:00:00')",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;
    (dir, path)
}

fn prompt(text: &str) -> PromptRequest {
    PromptRequest {
        prompt: text.to_string(),
        ..PromptRequest::default()
    }
}

fn expect_table(response: GatewayResponse) -> sqlgate::format::TableResponse {
    match response {
        GatewayResponse::Table(table) => table,
        GatewayResponse::Spreadsheet(sheet) => panic!("expected table, got {}", sheet.filename),
    }
}

#[tokio::test]
async fn test_prompt_end_to_end() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let gateway = Gateway::new(SqliteBackend::new(&pool), GatewaySettings::default());
    let generator = StubGenerator::returning("SELECT name FROM ai_companies", "table", "companies");

    let response = gateway
        .run_prompt(&generator, prompt("покажи список компаний"))
        .await
        .unwrap();
    assert_eq!(generator.calls(), vec![("покажи список компаний".to_string(), 500)]);

    let table = expect_table(response);
    assert_eq!(table.columns.len(), 1);
    assert_eq!(table.sql, "SELECT name FROM ai_companies LIMIT 500");
    assert_eq!(table.output_mode, OutputMode::Table);
    assert_eq!(table.row_count, 2);
    assert_eq!(table.title, "companies");
    assert!(table.human_readable);
    assert!(!table.unlimited);
    let names: Vec<&str> = table
        .rows
        .iter()
        .filter_map(|row| row.values().next().and_then(|v| v.as_str()))
        .collect();
    assert_eq!(names, vec!["Alpha", "Beta"]);
    pool.close().await;
}

#[tokio::test]
async fn test_configured_row_cap_applied() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let settings = GatewaySettings {
        max_rows: 1,
        ..GatewaySettings::default()
    };
    let gateway = Gateway::new(SqliteBackend::new(&pool), settings);
    let generator =
        StubGenerator::returning("SELECT name FROM ai_companies ORDER BY name LIMIT 100", "table", "");

    let table = expect_table(gateway.run_prompt(&generator, prompt("компании")).await.unwrap());
    assert_eq!(table.sql, "SELECT name FROM ai_companies ORDER BY name LIMIT 1");
    assert_eq!(table.row_count, 1);
    assert_eq!(table.title, "ai_query");
    pool.close().await;
}

#[tokio::test]
async fn test_unlimited_request_has_no_cap() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let gateway = Gateway::new(SqliteBackend::new(&pool), GatewaySettings::default());
    let generator = StubGenerator::returning("SELECT name FROM ai_companies", "table", "");

    let request = PromptRequest {
        unlimited: true,
        ..prompt("все компании")
    };
    let table = expect_table(gateway.run_prompt(&generator, request).await.unwrap());
    assert_eq!(table.sql, "SELECT name FROM ai_companies");
    assert!(table.unlimited);
    assert_eq!(generator.calls()[0].1, 0);
    pool.close().await;
}

#[tokio::test]
async fn test_reversed_alias_rewritten_before_validation() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let gateway = Gateway::new(SqliteBackend::new(&pool), GatewaySettings::default());
    let generator =
        StubGenerator::returning("SELECT \"Компания\" AS name FROM ai_companies", "table", "");

    let table = expect_table(gateway.run_prompt(&generator, prompt("компании")).await.unwrap());
    assert_eq!(table.sql, "SELECT name AS \"Компания\" FROM ai_companies LIMIT 500");
    assert_eq!(table.columns, vec!["Компания"]);
    pool.close().await;
}

#[tokio::test]
async fn test_raw_columns_keep_technical_fields() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let gateway = Gateway::new(SqliteBackend::new(&pool), GatewaySettings::default());
    let generator = StubGenerator::returning("SELECT id, name FROM ai_companies", "table", "");

    let humanized = expect_table(gateway.run_prompt(&generator, prompt("компании")).await.unwrap());
    assert_eq!(humanized.columns, vec!["Имя"]);

    let request = PromptRequest {
        human_readable: Some(false),
        ..prompt("компании")
    };
    let raw = expect_table(gateway.run_prompt(&generator, request).await.unwrap());
    assert_eq!(raw.columns, vec!["id", "name"]);
    assert!(!raw.human_readable);
    pool.close().await;
}

#[tokio::test]
async fn test_spreadsheet_selected_by_prompt_keyword() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let gateway = Gateway::new(SqliteBackend::new(&pool), GatewaySettings::default());
    let generator = StubGenerator::returning("SELECT name FROM ai_companies", "", "Компании");

    let response = gateway
        .run_prompt(&generator, prompt("выгрузи компании"))
        .await
        .unwrap();
    match response {
        GatewayResponse::Spreadsheet(sheet) => {
            assert!(sheet.filename.starts_with("kompanii_"), "got {}", sheet.filename);
            assert!(sheet.filename.ends_with(".xlsx"));
            assert_eq!(&sheet.bytes[..2], b"PK");
            assert_eq!(sheet.row_count, 2);
            assert_eq!(sheet.sql, "SELECT name FROM ai_companies LIMIT 500");
        }
        GatewayResponse::Table(_) => panic!("expected spreadsheet"),
    }
    pool.close().await;
}

#[tokio::test]
async fn test_explicit_table_mode_overrides_keywords() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let gateway = Gateway::new(SqliteBackend::new(&pool), GatewaySettings::default());
    let generator = StubGenerator::returning("SELECT name FROM ai_companies", "xlsx", "");

    let request = PromptRequest {
        output_mode: RequestedMode::Table,
        ..prompt("выгрузи компании в excel")
    };
    let response = gateway.run_prompt(&generator, request).await.unwrap();
    assert!(matches!(response, GatewayResponse::Table(_)));
    pool.close().await;
}

#[tokio::test]
async fn test_unsafe_plan_rejected_before_execution() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let gateway = Gateway::new(SqliteBackend::new(&pool), GatewaySettings::default());
    let generator = StubGenerator::returning("SELECT name FROM companies", "table", "");

    let err = gateway
        .run_prompt(&generator, prompt("компании"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation { .. }), "got {:?}", err);
    assert_eq!(err.terminal_state(), TerminalState::Rejected);
    assert!(err.to_string().contains("\"companies\""));
    pool.close().await;
}

#[tokio::test]
async fn test_execution_error_is_failed() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let gateway = Gateway::new(SqliteBackend::new(&pool), GatewaySettings::default());
    let generator = StubGenerator::returning("SELECT no_such_column FROM ai_companies", "table", "");

    let err = gateway
        .run_prompt(&generator, prompt("компании"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Execution { .. }), "got {:?}", err);
    assert_eq!(err.terminal_state(), TerminalState::Failed);
    pool.close().await;
}

#[tokio::test]
async fn test_generation_failure_surfaces() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let gateway = Gateway::new(SqliteBackend::new(&pool), GatewaySettings::default());
    let generator = StubGenerator::failing("provider returned no choices");

    let err = gateway
        .run_prompt(&generator, prompt("компании"))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "generation: upstream generation failed: provider returned no choices"
    );
    pool.close().await;
}

#[tokio::test]
async fn test_slow_generator_times_out() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let settings = GatewaySettings {
        llm_timeout: Duration::from_millis(20),
        ..GatewaySettings::default()
    };
    let gateway = Gateway::new(SqliteBackend::new(&pool), settings);
    let mut generator = StubGenerator::returning("SELECT name FROM ai_companies", "table", "");
    generator.delay = Duration::from_millis(500);

    let err = gateway
        .run_prompt(&generator, prompt("компании"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Generation { .. }), "got {:?}", err);
    pool.close().await;
}

#[tokio::test]
async fn test_invalid_prompts_rejected_without_generation() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let gateway = Gateway::new(SqliteBackend::new(&pool), GatewaySettings::default());
    let generator = StubGenerator::returning("SELECT name FROM ai_companies", "table", "");

    for text in ["".to_string(), "   ".to_string(), "я".repeat(4001)] {
        let err = gateway.run_prompt(&generator, prompt(&text)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Input { .. }), "got {:?}", err);
        assert_eq!(err.terminal_state(), TerminalState::Rejected);
    }
    assert!(generator.calls().is_empty());
    pool.close().await;
}

#[tokio::test]
async fn test_disabled_and_unsupported_provider() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let generator = StubGenerator::returning("SELECT name FROM ai_companies", "table", "");

    let disabled = Gateway::new(
        SqliteBackend::new(&pool),
        GatewaySettings {
            enabled: false,
            ..GatewaySettings::default()
        },
    );
    let err = disabled.run_prompt(&generator, prompt("компании")).await.unwrap_err();
    assert!(matches!(err, GatewayError::Config { .. }));

    let other = Gateway::new(
        SqliteBackend::new(&pool),
        GatewaySettings {
            provider: "someone-else".to_string(),
            ..GatewaySettings::default()
        },
    );
    let err = other.run_prompt(&generator, prompt("компании")).await.unwrap_err();
    assert!(err.to_string().contains("unsupported provider"));
    assert!(generator.calls().is_empty());
    pool.close().await;
}

#[tokio::test]
async fn test_export_builds_spreadsheet() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let gateway = Gateway::new(SqliteBackend::new(&pool), GatewaySettings::default());

    let sheet = gateway
        .run_export(ExportRequest {
            sql: "SELECT id, name FROM ai_companies LIMIT 500;".to_string(),
            ..ExportRequest::default()
        })
        .await
        .unwrap();
    assert!(sheet.filename.starts_with("ai_export_"), "got {}", sheet.filename);
    assert_eq!(sheet.sql, "SELECT id, name FROM ai_companies LIMIT 500");
    assert_eq!(sheet.row_count, 2);
    assert_eq!(&sheet.bytes[..2], b"PK");
    pool.close().await;
}

#[tokio::test]
async fn test_export_rejects_unsafe_sql() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let gateway = Gateway::new(SqliteBackend::new(&pool), GatewaySettings::default());

    for sql in ["DELETE FROM ai_companies", "SELECT name FROM ai_companies, ai_members"] {
        let err = gateway
            .run_export(ExportRequest {
                sql: sql.to_string(),
                title: "x".to_string(),
                ..ExportRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation { .. }), "got {:?}", err);
    }

    let err = gateway
        .run_export(ExportRequest {
            sql: format!("SELECT name FROM ai_companies WHERE name = '{}'", "x".repeat(16000)),
            ..ExportRequest::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Input { .. }));
    pool.close().await;
}

#[tokio::test]
async fn test_schema_lists_catalog() {
    let (_dir, path) = installed_database().await;
    let pool = ReadOnlyPool::open(&path);
    let gateway = Gateway::new(SqliteBackend::new(&pool), GatewaySettings::default());

    let schema = gateway.schema();
    assert!(schema.enabled);
    assert_eq!(schema.max_rows, 500);
    assert_eq!(schema.views.len(), catalog::list().len());
    assert_eq!(schema.views[1].name, "ai_companies");
    pool.close().await;
}

#[test]
fn test_stage_names() {
    let stages = [
        Stage::Received,
        Stage::Rewritten,
        Stage::Validated,
        Stage::Executed,
        Stage::Projected,
        Stage::Delivered,
    ];
    let names: Vec<String> = stages.iter().map(|s| s.to_string()).collect();
    assert_eq!(
        names,
        vec!["received", "rewritten", "validated", "executed", "projected", "delivered"]
    );
}
