use std::sync::OnceLock;

use regex::Regex;

use crate::core::value::Value;

/// Per-backend rewriting knobs, fixed at connect time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteOptions {
    /// Replace a null parameter's marker with a literal NULL token and drop
    /// the slot, instead of binding null.
    pub inline_nulls: bool,
    /// Alias `table.column` items in the SELECT output list so joined
    /// queries survive the object-keyed response shape.
    pub alias_columns: bool,
}

/// Normalize ORM-generated SQL for the remote engine. Expands embedded
/// date-truncation calls, optionally aliases output columns, and translates
/// `%s` markers to native `?` markers one-for-one, left to right. Caller
/// input is never mutated.
pub fn rewrite(sql: &str, params: &[Value], opts: RewriteOptions) -> (String, Vec<Value>) {
    let (sql, params) = expand_date_trunc(sql, params);
    let sql = if opts.alias_columns {
        alias_select_columns(&sql)
    } else {
        sql
    };
    translate_placeholders(&sql, &params, opts.inline_nulls)
}

const DEFER_ON: &str = "PRAGMA defer_foreign_keys = on;";
const DEFER_OFF: &str = "PRAGMA defer_foreign_keys = off;";

/// Bracket a statement with foreign-key deferral pragmas.
pub fn wrap_defer_foreign_keys(sql: &str) -> String {
    let sql = sql.trim_end().trim_end_matches(';');
    format!("{DEFER_ON}\n{sql};\n{DEFER_OFF}")
}

/// Inverse of [`wrap_defer_foreign_keys`]: the statement between the
/// deferral pragmas, for backends that can only bind parameters to a single
/// prepared statement.
pub fn unwrap_defer_foreign_keys(sql: &str) -> Option<&str> {
    let inner = sql.strip_prefix(DEFER_ON)?.strip_suffix(DEFER_OFF)?;
    Some(inner.trim().trim_end_matches(';'))
}

/// Quote an identifier; `table.column` compounds get an alias so duplicate
/// bare names across joined tables stay distinguishable.
pub fn quote_name(name: &str) -> String {
    if let Some((table, column)) = name.split_once('.') {
        return format!("\"{table}\".\"{column}\" AS \"{table}_{column}\"");
    }
    if name.starts_with('"') && name.ends_with('"') {
        return name.to_string();
    }
    format!("\"{name}\"")
}

fn translate_placeholders(
    sql: &str,
    params: &[Value],
    inline_nulls: bool,
) -> (String, Vec<Value>) {
    let mut out = String::with_capacity(sql.len());
    let mut kept = Vec::with_capacity(params.len());
    let mut idx = 0;
    let mut in_string = false;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '\'' {
            in_string = !in_string;
            out.push(c);
            i += 1;
            continue;
        }
        if !in_string && c == '%' && i + 1 < bytes.len() && bytes[i + 1] == b's' {
            let param = params.get(idx);
            idx += 1;
            match param {
                Some(v) if inline_nulls && v.is_null() => out.push_str("NULL"),
                Some(v) => {
                    kept.push(v.clone());
                    out.push('?');
                }
                None => out.push('?'),
            }
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }
    (out, kept)
}

fn trunc_bound_tz_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"django_(?:date|datetime)_trunc\(%s,\s*([^,]+),\s*%s,\s*%s\)").expect("regex")
    })
}

fn trunc_bound_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"django_(?:date|datetime)_trunc\(%s,\s*([^,()]+)\)").expect("regex")
    })
}

fn trunc_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"django_(?:date|datetime)_trunc\('(\w+)',\s*([^,()]+)\)").expect("regex")
    })
}

/// Expand the ORM's private truncation function into native date/string
/// formatting. When the kind is itself a bound parameter a CASE over the
/// full kind set is required; the 4-argument datetime form carries two
/// trailing timezone parameters that the expansion drops from both the SQL
/// and the parameter list.
fn expand_date_trunc(sql: &str, params: &[Value]) -> (String, Vec<Value>) {
    let mut sql = sql.to_string();
    let mut params = params.to_vec();

    if !sql.contains("django_date_trunc") && !sql.contains("django_datetime_trunc") {
        return (sql, params);
    }

    // 4-arg bound-kind form: one call at a time so parameter indexes stay
    // aligned with the text being replaced.
    loop {
        let Some((range, field)) = trunc_bound_tz_re().captures(&sql).map(|caps| {
            let range = caps.get(0).expect("match").range();
            (range, caps[1].trim().to_string())
        }) else {
            break;
        };
        let kind_idx = count_markers(&sql[..range.start]);
        let tz_idx = kind_idx + 1 + count_markers(&field);
        // Drop the two timezone slots that the expansion no longer binds.
        if tz_idx < params.len() {
            params.remove(tz_idx);
        }
        if tz_idx < params.len() {
            params.remove(tz_idx);
        }
        let replacement = case_over_kinds(&field);
        sql.replace_range(range, &replacement);
    }

    // 2-arg bound-kind form: placeholder count is preserved, no parameter
    // surgery needed.
    let sql = trunc_bound_re()
        .replace_all(&sql, |caps: &regex::Captures<'_>| {
            case_over_kinds(caps[1].trim())
        })
        .into_owned();

    // Literal-kind form: direct template substitution. Unknown kinds are
    // left as-is, matching the original backend.
    let sql = trunc_literal_re()
        .replace_all(&sql, |caps: &regex::Captures<'_>| {
            trunc_template(&caps[1], caps[2].trim())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();

    (sql, params)
}

// Placeholder markers only, skipping string literals the same way the
// placeholder translator does.
fn count_markers(sql: &str) -> usize {
    let mut count = 0;
    let mut in_string = false;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            in_string = !in_string;
            i += 1;
        } else if !in_string && bytes[i] == b'%' && i + 1 < bytes.len() && bytes[i + 1] == b's' {
            count += 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    count
}

fn trunc_template(kind: &str, field: &str) -> Option<String> {
    let sql = match kind {
        "year" => format!("STRFTIME('%Y-01-01', {field})"),
        "quarter" => quarter_case(field),
        "month" => format!("STRFTIME('%Y-%m-01', {field})"),
        "week" => format!(
            "DATE({field}, '-' || CAST((CAST(STRFTIME('%w', {field}) AS INTEGER) + 6) % 7 AS TEXT) || ' days')"
        ),
        "day" | "date" => format!("DATE({field})"),
        "hour" => format!("STRFTIME('%Y-%m-%d %H:00:00', {field})"),
        "minute" => format!("STRFTIME('%Y-%m-%d %H:%M:00', {field})"),
        "second" => format!("STRFTIME('%Y-%m-%d %H:%M:%S', {field})"),
        "time" => format!("TIME({field})"),
        _ => return None,
    };
    Some(sql)
}

// Quarter number is (month + 2) / 3; switching on the raw month the way the
// original backend did returns NULL for months 5-12.
fn quarter_case(field: &str) -> String {
    format!(
        "CASE (CAST(STRFTIME('%m', {field}) AS INTEGER) + 2) / 3 \
         WHEN 1 THEN STRFTIME('%Y-01-01', {field}) \
         WHEN 2 THEN STRFTIME('%Y-04-01', {field}) \
         WHEN 3 THEN STRFTIME('%Y-07-01', {field}) \
         WHEN 4 THEN STRFTIME('%Y-10-01', {field}) END"
    )
}

fn case_over_kinds(field: &str) -> String {
    let kinds = [
        "year", "quarter", "month", "week", "day", "hour", "minute", "second", "date", "time",
    ];
    let mut out = String::from("CASE %s");
    for kind in kinds {
        let template = trunc_template(kind, field).expect("known kind");
        out.push_str(&format!(" WHEN '{kind}' THEN {template}"));
    }
    out.push_str(" END");
    out
}

/// Rewrite bare `table.column` items in the top-level SELECT output list to
/// `"table"."column" AS "table_column"`. The object-keyed response shape
/// keys rows by column label, so two joined tables sharing a bare column
/// name would otherwise collide.
pub fn alias_select_columns(sql: &str) -> String {
    let Some(select_pos) = find_keyword(sql, "SELECT ") else {
        return sql.to_string();
    };
    let list_start = select_pos + "SELECT ".len();
    let Some(from_off) = top_level_from(&sql[list_start..]) else {
        return sql.to_string();
    };
    let list = &sql[list_start..list_start + from_off];

    let mut rewritten = Vec::new();
    for item in split_top_level(list) {
        rewritten.push(alias_item(item.trim()));
    }

    format!(
        "{}{} {}",
        &sql[..list_start],
        rewritten.join(", "),
        &sql[list_start + from_off..]
    )
}

fn compound_ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^"?([A-Za-z_][A-Za-z0-9_]*)"?\."?([A-Za-z_][A-Za-z0-9_]*)"?$"#)
            .expect("regex")
    })
}

fn alias_item(item: &str) -> String {
    if item.to_uppercase().contains(" AS ") {
        return item.to_string();
    }
    match compound_ident_re().captures(item) {
        Some(caps) => {
            let table = &caps[1];
            let column = &caps[2];
            format!("\"{table}\".\"{column}\" AS \"{table}_{column}\"")
        }
        None => item.to_string(),
    }
}

// Case-insensitive byte scan over the original text. An ASCII pattern can
// only match at ASCII bytes, so offsets always land on char boundaries even
// when the surrounding SQL is not ASCII.
fn find_keyword(s: &str, keyword: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let pattern = keyword.as_bytes();
    if bytes.len() < pattern.len() {
        return None;
    }
    (0..=bytes.len() - pattern.len())
        .find(|&i| bytes[i..i + pattern.len()].eq_ignore_ascii_case(pattern))
}

fn top_level_from(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_string = !in_string,
            b'(' if !in_string => depth += 1,
            b')' if !in_string => depth -= 1,
            b'F' | b'f' if !in_string && depth == 0 => {
                if bytes.len() - i >= 5 && bytes[i..i + 5].eq_ignore_ascii_case(b"FROM ") {
                    let before_ok = i == 0 || bytes[i - 1].is_ascii_whitespace();
                    if before_ok {
                        return Some(i);
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn split_top_level(s: &str) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match b as char {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth -= 1,
            ',' if !in_string && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}
