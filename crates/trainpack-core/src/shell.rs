//! POSIX shell quoting for operands of `RUN` directives.

/// Quote `word` for a POSIX shell.
///
/// Words made only of characters that never need escaping are returned as-is;
/// anything else is wrapped in single quotes with embedded quotes spliced as
/// `'"'"'`.
pub fn quote(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_safe) {
        return word.to_string();
    }
    quote_always(word)
}

/// Quote `word` in single quotes even when it would be safe bare.
pub fn quote_always(word: &str) -> String {
    format!("'{}'", word.replace('\'', r#"'"'"'"#))
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '_' | '-')
}
