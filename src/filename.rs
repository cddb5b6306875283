use std::sync::LazyLock;

use regex::Regex;

const MAX_FILENAME_BYTES: usize = 100;
const UNNAMED: &str = "unnamed_file";

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_.]+").expect("disallowed filename chars"));
static REPEATED_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__+").expect("underscore run"));
static REPEATED_DOTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.\.+").expect("dot run"));

/// Build a download filename from a free-form title and a timestamp suffix.
pub fn spreadsheet_filename(title: &str, default_title: &str, timestamp: &str) -> String {
    let title = match title.trim() {
        "" => default_title,
        t => t,
    };
    sanitize_filename(&format!("{}_{}.xlsx", title, timestamp))
}

/// Reduce a name to `[a-z0-9_.]`, transliterating Cyrillic first.
pub fn sanitize_filename(name: &str) -> String {
    let mut name = transliterate(name).to_lowercase();
    for c in [' ', '/', '\\', ':', '*', '?', '"', '<', '>', '|'] {
        name = name.replace(c, "_");
    }
    let name = DISALLOWED.replace_all(&name, "");
    let name = name.trim_matches(|c: char| c == '_' || c == '.');
    let name = REPEATED_UNDERSCORES.replace_all(name, "_");
    let mut name = REPEATED_DOTS.replace_all(&name, ".").into_owned();

    if name.len() > MAX_FILENAME_BYTES {
        // Only ASCII remains, so byte slicing is safe.
        name = match name.rfind('.') {
            Some(dot) if dot > 0 => {
                let ext = name[dot..].to_string();
                let keep = MAX_FILENAME_BYTES.saturating_sub(ext.len());
                format!("{}{}", &name[..keep.min(dot)], ext)
            }
            _ => name[..MAX_FILENAME_BYTES].to_string(),
        };
    }

    if name.is_empty() || name == "." {
        return UNNAMED.to_string();
    }
    name
}

fn transliterate(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        let lower = c.to_lowercase().next().unwrap_or(c);
        let mapped = match lower {
            'а' => "a",
            'б' => "b",
            'в' => "v",
            'г' => "g",
            'д' => "d",
            'е' => "e",
            'ё' => "e",
            'ж' => "zh",
            'з' => "z",
            'и' => "i",
            'й' => "y",
            'к' => "k",
            'л' => "l",
            'м' => "m",
            'н' => "n",
            'о' => "o",
            'п' => "p",
            'р' => "r",
            'с' => "s",
            'т' => "t",
            'у' => "u",
            'ф' => "f",
            'х' => "kh",
            'ц' => "ts",
            'ч' => "ch",
            'ш' => "sh",
            'щ' => "shch",
            'ъ' => "",
            'ы' => "y",
            'ь' => "",
            'э' => "e",
            'ю' => "yu",
            'я' => "ya",
            _ => {
                out.push(c);
                continue;
            }
        };
        out.push_str(mapped);
    }
    out
}
