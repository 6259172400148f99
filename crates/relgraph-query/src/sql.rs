//! Identifier quoting shared by the criteria compiler and the graph engine.

/// Quote an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// `<qualifier>."<column>"` where `qualifier` is already rendered (a quoted table name
/// or a join alias).
pub fn column_ref(qualifier: &str, column: &str) -> String {
    format!("{}.{}", qualifier, quote_identifier(column))
}

/// Escape `%`, `_` and `\` so a needle matches literally under `LIKE ... ESCAPE '\'`.
pub fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Number of `?` placeholders outside string literals.
pub fn count_placeholders(sql: &str) -> usize {
    let mut in_literal = false;
    let mut count = 0;
    for c in sql.chars() {
        match c {
            '\'' => in_literal = !in_literal,
            '?' if !in_literal => count += 1,
            _ => {}
        }
    }
    count
}
