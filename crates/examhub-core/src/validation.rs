use std::sync::LazyLock;

use regex::Regex;

use crate::errors::AccessError;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("static regex")
});

pub const TITLE: (usize, usize) = (5, 200);
pub const CONTENT: (usize, usize) = (10, 20_000);
pub const COMMENT: (usize, usize) = (1, 2_000);
pub const NAME: (usize, usize) = (2, 60);
pub const BIO: (usize, usize) = (0, 500);
pub const PASSWORD: (usize, usize) = (8, 128);
pub const MAX_TAGS: usize = 5;
pub const TAG: (usize, usize) = (1, 30);

/// Trim and bound-check a text field by character count.
pub fn text(field: &str, value: &str, (min, max): (usize, usize)) -> Result<String, AccessError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min {
        return Err(AccessError::validation(format!(
            "{field} must be at least {min} characters"
        )));
    }
    if len > max {
        return Err(AccessError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn email(value: &str) -> Result<String, AccessError> {
    let normalized = value.trim().to_lowercase();
    if normalized.len() > 254 || !EMAIL.is_match(&normalized) {
        return Err(AccessError::validation("email is not valid"));
    }
    Ok(normalized)
}

pub fn password(value: &str) -> Result<(), AccessError> {
    let len = value.chars().count();
    if len < PASSWORD.0 || len > PASSWORD.1 {
        return Err(AccessError::validation(format!(
            "password must be {}-{} characters",
            PASSWORD.0, PASSWORD.1
        )));
    }
    Ok(())
}

/// Normalize tags: trimmed, lower-cased, deduplicated, order kept.
pub fn tags(values: &[String]) -> Result<Vec<String>, AccessError> {
    let mut out: Vec<String> = Vec::new();
    for raw in values {
        let tag = text("tag", &raw.to_lowercase(), TAG)?;
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    if out.len() > MAX_TAGS {
        return Err(AccessError::validation(format!("at most {MAX_TAGS} tags allowed")));
    }
    Ok(out)
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}
