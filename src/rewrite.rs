use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::catalog;

/// `"Метка" AS column`: a quoted label holding at least one non-Latin letter,
/// written before the source column instead of after it.
static REVERSED_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(["'])([^"']*[\p{Alphabetic}&&\P{Latin}][^"']*)["']\s+as\s+([a-z_][a-z0-9_]*)"#)
        .expect("reversed alias pattern is valid")
});

/// Rewrite `"label" AS column` into `column AS "label"` when `column` is a
/// catalog column. Unknown identifiers are left untouched.
///
/// This only reduces false rejections; the validator never relies on it.
pub fn rewrite_reversed_aliases(sql: &str) -> String {
    REVERSED_ALIAS
        .replace_all(sql, |caps: &Captures| {
            let fragment = caps[0].to_string();
            let label = caps[2].trim();
            let column = caps[3].trim().to_ascii_lowercase();
            if label.is_empty() || column.is_empty() || !catalog::is_known_column(&column) {
                return fragment;
            }
            format!("{} AS \"{}\"", column, label.replace('"', "\"\""))
        })
        .into_owned()
}
