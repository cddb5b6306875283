use std::time::Duration;

use secrecy::SecretString;
use sqlgate::error::GatewayError;
use sqlgate::generator::openrouter::{OpenRouterGenerator, OpenRouterSettings};
use sqlgate::generator::{build_system_prompt, parse_query_plan, PlanGenerator};

fn settings(api_key: &str, model: &str) -> OpenRouterSettings {
    OpenRouterSettings {
        base_url: "http://127.0.0.1:9/api/v1/".to_string(),
        api_key: SecretString::from(api_key.to_string()),
        model: model.to_string(),
        temperature: 0.1,
        referer: None,
        app_title: None,
        timeout: Duration::from_millis(200),
    }
}

#[test]
fn test_parse_strict_json() {
    let plan = parse_query_plan(
        r#"{"sql": "SELECT name FROM ai_companies", "output_mode": "table", "title": "companies"}"#,
    )
    .unwrap();
    assert_eq!(plan.sql, "SELECT name FROM ai_companies");
    assert_eq!(plan.output_mode, "table");
    assert_eq!(plan.title, "companies");
}

#[test]
fn test_parse_json_wrapped_in_prose() {
    let content = "Here you go:\n```json\n{\"sql\": \"SELECT name FROM ai_members\", \"output_mode\": \"xlsx\"}\n```";
    let plan = parse_query_plan(content).unwrap();
    assert_eq!(plan.sql, "SELECT name FROM ai_members");
    assert_eq!(plan.output_mode, "xlsx");
    assert_eq!(plan.title, "");
}

#[test]
fn test_parse_without_object_fails() {
    let err = parse_query_plan("SELECT name FROM ai_members").unwrap_err();
    assert!(matches!(err, GatewayError::Generation { .. }));
    assert!(err.to_string().contains("failed to parse model json response"));
}

#[test]
fn test_parse_empty_sql_fails() {
    let err = parse_query_plan(r#"{"sql": "  ", "output_mode": "table"}"#).unwrap_err();
    assert!(err.to_string().contains("model returned empty SQL"));
}

#[test]
fn test_parse_malformed_object_fails() {
    let err = parse_query_plan(r#"text {"sql": } text"#).unwrap_err();
    assert!(err.to_string().contains("failed to decode model response"));
}

#[test]
fn test_system_prompt_lists_catalog_and_limit() {
    let prompt = build_system_prompt(500);
    assert!(prompt.contains("максимум 500"));
    assert!(prompt.contains("ai_companies"));
    assert!(prompt.contains("ai_member_passes"));
    assert!(prompt.contains("\"output_mode\": \"table|xlsx\""));
    assert!(prompt.contains("Правильно: name AS \"Имя\""));
}

#[test]
fn test_system_prompt_without_limit() {
    let prompt = build_system_prompt(0);
    assert!(prompt.contains("Жесткий лимит строк не обязателен"));
    assert!(!prompt.contains("максимум 0"));
}

#[tokio::test]
async fn test_missing_api_key_is_generation_error() {
    let generator = OpenRouterGenerator::new(settings("", "openai/gpt-4o-mini"));
    let err = generator.generate("покажи компании", 500).await.unwrap_err();
    assert!(matches!(err, GatewayError::Generation { .. }));
    assert!(err.to_string().contains("api key is not configured"));
}

#[tokio::test]
async fn test_missing_model_is_generation_error() {
    let generator = OpenRouterGenerator::new(settings("sk-test", " "));
    let err = generator.generate("покажи компании", 500).await.unwrap_err();
    assert!(err.to_string().contains("model is not configured"));
}

#[tokio::test]
async fn test_unreachable_provider_is_generation_error() {
    let generator = OpenRouterGenerator::new(settings("sk-test", "openai/gpt-4o-mini"));
    let err = generator.generate("покажи компании", 500).await.unwrap_err();
    assert!(matches!(err, GatewayError::Generation { .. }), "got {:?}", err);
}
