use std::collections::BTreeSet;
use std::sync::LazyLock;

use sqlx::SqlitePool;

use crate::error::GatewayError;

/// A read-only view exposed to generated queries.
#[derive(Debug)]
pub struct ViewDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub columns: &'static [&'static str],
    pub materializing_statement: &'static str,
}

static VIEWS: &[ViewDefinition] = &[
    ViewDefinition {
        name: "ai_users",
        description: "Пользователи системы (без пароля и reset-хэшей)",
        columns: &[
            "id", "created_at", "updated_at", "username", "role", "frozen", "frozen_at",
            "frozen_action", "company_id",
        ],
        materializing_statement: "CREATE VIEW ai_users AS
SELECT id, created_at, updated_at, username, role, frozen, frozen_at, frozen_action, company_id
FROM users
WHERE deleted_at IS NULL",
    },
    ViewDefinition {
        name: "ai_companies",
        description: "Компании и их лимиты",
        columns: &[
            "id", "created_at", "updated_at", "name", "inn", "description", "cars_limit",
            "members_limit", "in_event_members_limit", "responsible_member_id", "default_route",
            "editor_id", "phone", "email",
        ],
        materializing_statement: "CREATE VIEW ai_companies AS
SELECT id, created_at, updated_at, name, inn, description, cars_limit, members_limit, in_event_members_limit,
       responsible_member_id, default_route, editor_id, phone, email
FROM companies
WHERE deleted_at IS NULL",
    },
    ViewDefinition {
        name: "ai_members",
        description: "Участники",
        columns: &[
            "id", "created_at", "updated_at", "document", "photo_filename", "name", "surname",
            "middlename", "company_name", "email", "phone", "barcode", "state", "description",
            "birth", "responsible", "print_count", "given_bangle_count", "company_id",
            "accreditation_id", "in_zone", "given_bangle", "blocked",
        ],
        materializing_statement: "CREATE VIEW ai_members AS
SELECT id, created_at, updated_at, document, photo_filename, name, surname, middlename, company_name, email, phone,
       barcode, state, description, birth, responsible, print_count, given_bangle_count, company_id,
       accreditation_id, in_zone, given_bangle, blocked
FROM members
WHERE deleted_at IS NULL",
    },
    ViewDefinition {
        name: "ai_autos",
        description: "Автомобили",
        columns: &[
            "id", "created_at", "updated_at", "number", "type", "route", "description",
            "company_id", "state", "pass", "pass2", "company",
        ],
        materializing_statement: "CREATE VIEW ai_autos AS
SELECT id, created_at, updated_at, number, type, route, description, company_id, state, pass, pass2, company
FROM autos
WHERE deleted_at IS NULL",
    },
    ViewDefinition {
        name: "ai_accreditations",
        description: "Типы аккредитаций",
        columns: &[
            "id", "created_at", "updated_at", "name", "short_name", "description", "position",
            "hidden", "require_photo",
        ],
        materializing_statement: "CREATE VIEW ai_accreditations AS
SELECT id, created_at, updated_at, name, short_name, description, position, hidden, require_photo
FROM accreditations
WHERE deleted_at IS NULL",
    },
    ViewDefinition {
        name: "ai_events",
        description: "Мероприятия/даты",
        columns: &[
            "id", "created_at", "updated_at", "name", "description", "position", "time_start",
            "time_end",
        ],
        materializing_statement: "CREATE VIEW ai_events AS
SELECT id, created_at, updated_at, name, description, position, time_start, time_end
FROM events
WHERE deleted_at IS NULL",
    },
    ViewDefinition {
        name: "ai_gates",
        description: "Зоны доступа",
        columns: &[
            "id", "created_at", "updated_at", "name", "short_name", "description", "position",
            "external", "additional", "require_photo",
        ],
        materializing_statement: "CREATE VIEW ai_gates AS
SELECT id, created_at, updated_at, name, short_name, description, position, external, additional, require_photo
FROM gates
WHERE deleted_at IS NULL",
    },
    ViewDefinition {
        name: "ai_company_accreditation_limits",
        description: "Лимиты компании по аккредитациям",
        columns: &["id", "created_at", "updated_at", "company_id", "accreditation_id", "limit"],
        materializing_statement: "CREATE VIEW ai_company_accreditation_limits AS
SELECT id, created_at, updated_at, company_id, accreditation_id, \"limit\" AS \"limit\"
FROM company_accreditation_limits
WHERE deleted_at IS NULL",
    },
    ViewDefinition {
        name: "ai_company_event_limits",
        description: "Лимиты компании по мероприятиям",
        columns: &["id", "created_at", "updated_at", "company_id", "event_id", "limit"],
        materializing_statement: "CREATE VIEW ai_company_event_limits AS
SELECT id, created_at, updated_at, company_id, event_id, \"limit\" AS \"limit\"
FROM company_event_limits
WHERE deleted_at IS NULL",
    },
    ViewDefinition {
        name: "ai_company_gate_limits",
        description: "Лимиты компании по зонам",
        columns: &["id", "created_at", "updated_at", "company_id", "gate_id", "limit"],
        materializing_statement: "CREATE VIEW ai_company_gate_limits AS
SELECT id, created_at, updated_at, company_id, gate_id, \"limit\" AS \"limit\"
FROM company_gate_limits
WHERE deleted_at IS NULL",
    },
    ViewDefinition {
        name: "ai_member_passes",
        description: "Факты проходов через зоны",
        columns: &["id", "created_at", "member_id", "gate_id"],
        materializing_statement: "CREATE VIEW ai_member_passes AS
SELECT id, created_at, member_id, gate_id
FROM member_passes
WHERE deleted_at IS NULL",
    },
    ViewDefinition {
        name: "ai_member_prints",
        description: "Факты печати бейджей",
        columns: &["id", "created_at", "member_id"],
        materializing_statement: "CREATE VIEW ai_member_prints AS
SELECT id, created_at, member_id
FROM member_prints
WHERE deleted_at IS NULL",
    },
    ViewDefinition {
        name: "ai_member_events",
        description: "Связи участник-мероприятие",
        columns: &["member_id", "event_id"],
        materializing_statement: "CREATE VIEW ai_member_events AS
SELECT member_id, event_id
FROM member_events",
    },
    ViewDefinition {
        name: "ai_member_gates",
        description: "Связи участник-доп.зона",
        columns: &["member_id", "gate_id"],
        materializing_statement: "CREATE VIEW ai_member_gates AS
SELECT member_id, gate_id
FROM member_gates",
    },
    ViewDefinition {
        name: "ai_accreditation_gates",
        description: "Связи аккредитация-зона",
        columns: &["accreditation_id", "gate_id"],
        materializing_statement: "CREATE VIEW ai_accreditation_gates AS
SELECT accreditation_id, gate_id
FROM accreditation_gates",
    },
];

static VIEW_NAMES: LazyLock<BTreeSet<&'static str>> =
    LazyLock::new(|| VIEWS.iter().map(|view| view.name).collect());

static COLUMN_NAMES: LazyLock<BTreeSet<&'static str>> = LazyLock::new(|| {
    VIEWS
        .iter()
        .flat_map(|view| view.columns.iter().copied())
        .collect()
});

/// All catalog views, in installation order.
pub fn list() -> &'static [ViewDefinition] {
    VIEWS
}

/// The allow-list consulted by the validator.
pub fn names() -> &'static BTreeSet<&'static str> {
    &VIEW_NAMES
}

pub fn is_allowed(name: &str) -> bool {
    VIEW_NAMES.contains(name)
}

/// Whether any catalog view exposes a column with this (lowercase) name.
pub fn is_known_column(name: &str) -> bool {
    COLUMN_NAMES.contains(name)
}

/// Drop and recreate every catalog view, stopping at the first database error.
///
/// Must be called with a writable pool; the gateway's own read-only pool
/// cannot create views.
pub async fn ensure_installed(pool: &SqlitePool) -> Result<(), GatewayError> {
    for view in VIEWS {
        sqlx::query(&format!("DROP VIEW IF EXISTS {}", view.name))
            .execute(pool)
            .await
            .map_err(|e| GatewayError::Execution {
                message: format!("failed to drop view {}: {}", view.name, e),
            })?;
        sqlx::query(view.materializing_statement)
            .execute(pool)
            .await
            .map_err(|e| GatewayError::Execution {
                message: format!("failed to create view {}: {}", view.name, e),
            })?;
    }
    Ok(())
}

/// Catalog listing embedded in the generator's system prompt.
pub fn schema_prompt() -> String {
    let mut out = String::from("Доступные VIEW для запросов (SQLite):\n");
    for view in VIEWS {
        out.push_str("- ");
        out.push_str(view.name);
        out.push_str(" : ");
        out.push_str(view.description);
        out.push_str("\n  columns: ");
        out.push_str(&view.columns.join(", "));
        out.push('\n');
    }
    out
}
