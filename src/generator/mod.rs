pub mod openrouter;

use serde::Deserialize;

use crate::catalog;
use crate::error::GatewayError;

pub const DEFAULT_QUERY_TITLE: &str = "ai_query";

/// What the model proposes for a prompt. The SQL is untrusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QueryPlan {
    #[serde(default)]
    pub sql: String,
    #[serde(default)]
    pub output_mode: String,
    #[serde(default)]
    pub title: String,
}

/// Turns a natural-language prompt into a query plan.
pub trait PlanGenerator {
    fn generate(
        &self,
        prompt: &str,
        max_rows: usize,
    ) -> impl std::future::Future<Output = Result<QueryPlan, GatewayError>> + Send;
}

/// Parse the model's reply. Tries strict JSON, then the outermost `{...}`
/// span, since models sometimes wrap the object in prose or fences.
pub fn parse_query_plan(content: &str) -> Result<QueryPlan, GatewayError> {
    if let Ok(plan) = serde_json::from_str::<QueryPlan>(content)
        && !plan.sql.trim().is_empty()
    {
        return Ok(plan);
    }

    let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) else {
        return Err(generation_error("failed to parse model json response"));
    };
    if end <= start {
        return Err(generation_error("failed to parse model json response"));
    }

    let plan: QueryPlan = serde_json::from_str(&content[start..=end])
        .map_err(|e| generation_error(&format!("failed to decode model response: {}", e)))?;
    if plan.sql.trim().is_empty() {
        return Err(generation_error("model returned empty SQL"));
    }
    Ok(plan)
}

/// System prompt handed to the model. `max_rows == 0` drops the row-limit rule.
pub fn build_system_prompt(max_rows: usize) -> String {
    let limit_rule = if max_rows == 0 {
        "4) Жесткий лимит строк не обязателен. Добавляй LIMIT только если пользователь явно просит сократить выборку.".to_string()
    } else {
        format!("4) Учитывай лимит строк: максимум {}.", max_rows)
    };

    format!(
        r#"Ты помощник для генерации SQL-запросов к SQLite.
Тебе нужно вернуть СТРОГО JSON-объект:
{{
  "sql": "<один SQL SELECT или WITH...SELECT>",
  "output_mode": "table|xlsx",
  "title": "<краткое имя выгрузки латиницей_или_кириллицей>"
}}

Правила:
1) Разрешены ТОЛЬКО SELECT/CTE-SELECT, без ; в конце, без комментариев.
2) Запрещены любые мутации данных и системные команды.
3) Используй только перечисленные VIEW (НЕ базовые таблицы):
{schema}
{limit_rule}
5) Если пользователь просит выгрузку/файл/Excel/XLSX, то output_mode="xlsx", иначе output_mode="table".
6) Не используй SELECT *.
7) По умолчанию возвращай только человеко-читаемые бизнес-поля (то, что важно пользователю).
8) Технические поля (id, *_id, created_at, updated_at и т.п.) включай только если пользователь явно попросил.
9) Для каждого столбца в финальном SELECT задавай понятный алиас (желательно на русском, в двойных кавычках), например "Компания", "Количество участников".
   Важно: алиас ставится справа, а источник слева. Правильно: name AS "Имя". Неправильно: "Имя" AS name.
10) Не добавляй markdown и пояснения, только JSON.
"#,
        schema = catalog::schema_prompt(),
        limit_rule = limit_rule,
    )
}

pub(crate) fn generation_error(message: &str) -> GatewayError {
    GatewayError::Generation {
        message: message.to_string(),
    }
}
