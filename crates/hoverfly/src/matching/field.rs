//! Scalar matcher kinds: exact, glob and regex.

use regex::Regex;

/// Byte equality after field canonicalization (done at request ingest).
pub fn exact_match(pattern: &str, value: &str) -> bool {
    pattern == value
}

/// Glob matching anchored to the full value: `*` matches any run of
/// characters (including none), `?` matches exactly one.
pub fn glob_match(pattern: &str, value: &str) -> bool {
    match compile_glob(pattern) {
        Ok(re) => re.is_match(value),
        Err(_) => false,
    }
}

/// Full-value regex matching; the pattern is anchored before evaluation.
pub fn regex_match(pattern: &str, value: &str) -> bool {
    match Regex::new(&format!("^(?:{pattern})$")) {
        Ok(re) => re.is_match(value),
        Err(_) => false,
    }
}

fn compile_glob(pattern: &str) -> Result<Regex, regex::Error> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    Regex::new(&translated)
}
