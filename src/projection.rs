use crate::backend::{unique_column_names, QueryResult};
use crate::validation::strip_identifier_quotes;

const FALLBACK_LABEL: &str = "Колонка";

const LABELS: &[(&str, &str)] = &[
    ("name", "Имя"),
    ("surname", "Фамилия"),
    ("middlename", "Отчество"),
    ("full_name", "ФИО"),
    ("document", "Документ"),
    ("company", "Компания"),
    ("company_name", "Компания"),
    ("accreditation", "Аккредитация"),
    ("accreditation_name", "Аккредитация"),
    ("email", "Email"),
    ("phone", "Телефон"),
    ("number", "Номер"),
    ("type", "Тип"),
    ("route", "Маршрут"),
    ("state", "Статус"),
    ("description", "Описание"),
    ("event", "Мероприятие"),
    ("event_name", "Мероприятие"),
    ("gate", "Зона"),
    ("gate_name", "Зона"),
    ("limit", "Лимит"),
    ("count", "Количество"),
    ("total", "Итого"),
    ("pass", "Пропуск"),
    ("pass2", "Пропуск 2"),
    ("in_zone", "В зоне"),
    ("blocked", "Заблокирован"),
    ("responsible", "Ответственный"),
    ("birth", "Дата рождения"),
    ("print_count", "Печатей"),
    ("given_bangle_count", "Выдано браслетов"),
    ("given_bangle", "Выдан браслет"),
    ("short_name", "Короткое имя"),
    ("time_start", "Начало"),
    ("time_end", "Окончание"),
    ("frozen", "Заморожена"),
    ("frozen_at", "Заморожена с"),
    ("username", "Логин"),
    ("role", "Роль"),
];

const TECHNICAL_COLUMNS: &[&str] = &[
    "id",
    "user_id",
    "member_id",
    "company_id",
    "gate_id",
    "event_id",
    "accreditation_id",
    "responsible_member_id",
    "editor_id",
    "created_at",
    "updated_at",
    "deleted_at",
    "photo_filename",
];

const INTERNAL_KEY_SUFFIX: &str = "_id";

/// Drop technical columns and relabel the rest for end users.
///
/// Returns the input unchanged when `enabled` is false. If every column is
/// technical, nothing is dropped.
pub fn project(result: QueryResult, enabled: bool) -> QueryResult {
    if !enabled || result.columns.is_empty() {
        return result;
    }

    let mut retained: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .filter(|(_, column)| !is_technical_column(column))
        .map(|(idx, _)| idx)
        .collect();
    if retained.is_empty() {
        retained = (0..result.columns.len()).collect();
    }

    let columns = unique_column_names(
        retained
            .iter()
            .map(|&idx| humanize_column_name(&result.columns[idx])),
    );
    let rows = result
        .rows
        .into_iter()
        .map(|mut row| {
            retained
                .iter()
                .map(|&idx| row.get_mut(idx).map(std::mem::take).unwrap_or_default())
                .collect()
        })
        .collect();

    QueryResult {
        columns,
        rows,
        truncated: result.truncated,
    }
}

pub fn is_technical_column(column: &str) -> bool {
    let normalized = normalize_column_name(column);
    if normalized.is_empty() {
        return false;
    }
    TECHNICAL_COLUMNS.contains(&normalized.as_str()) || normalized.ends_with(INTERNAL_KEY_SUFFIX)
}

fn normalize_column_name(column: &str) -> String {
    strip_identifier_quotes(column.trim()).trim().to_lowercase()
}

fn label_for(key: &str) -> Option<&'static str> {
    LABELS
        .iter()
        .find(|(column, _)| *column == key)
        .map(|(_, label)| *label)
}

/// Display label: dictionary hit, then per-segment hits, then a title-cased
/// version of the raw name. Names that already read as labels pass through.
pub fn humanize_column_name(column: &str) -> String {
    let raw = column.trim();
    if raw.is_empty() {
        return FALLBACK_LABEL.to_string();
    }
    if has_non_latin_letters(raw) || raw.contains(' ') {
        return raw.to_string();
    }

    let normalized = normalize_column_name(raw);
    if let Some(label) = label_for(&normalized) {
        return label.to_string();
    }

    let joined = normalized
        .split('_')
        .map(|part| match label_for(part) {
            Some(label) => label.to_lowercase(),
            None => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    if joined.trim().is_empty() {
        return raw.to_string();
    }
    capitalize_words(&joined)
}

fn capitalize_words(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn has_non_latin_letters(value: &str) -> bool {
    value.chars().any(|c| c.is_alphabetic() && !c.is_ascii())
}
