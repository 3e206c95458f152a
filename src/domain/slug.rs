//! Deterministic, URL-safe slugs derived from titles and names.

use slug::slugify;
use thiserror::Error;

/// Longest slug accepted by any content table.
pub const MAX_SLUG_LEN: usize = 250;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Derive a slug: lower-case ASCII, whitespace folded to hyphens, everything else that is
/// not URL-safe dropped, capped at [`MAX_SLUG_LEN`] characters.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let mut candidate = slugify(input);
    if candidate.len() > MAX_SLUG_LEN {
        candidate.truncate(MAX_SLUG_LEN);
        while candidate.ends_with('-') {
            candidate.pop();
        }
    }

    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Resolve the slug for a new row: an explicit slug wins over the title, but both pass
/// through the same normalisation.
pub fn resolve_slug(explicit: Option<&str>, title: &str) -> Result<String, SlugError> {
    match explicit.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => derive_slug(value),
        None => derive_slug(title),
    }
}
