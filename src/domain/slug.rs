//! Slugs for file paths and branch names.
//!
//! ASCII slugification comes from the `slug` crate; Chinese titles are
//! transliterated with `pinyin` first so "基线对齐" becomes `ji-xian-dui-qi`.

use pinyin::{Pinyin, ToPinyin};
use slug::slugify;
use thiserror::Error;

/// Upper bound for slugs embedded in paths and branch names.
pub const MAX_SLUG_LEN: usize = 80;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Derive a slug from human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(transliterate_to_ascii(input));
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Slug for an article title, cut back to a word boundary at [`MAX_SLUG_LEN`].
pub fn article_slug(title: &str) -> Result<String, SlugError> {
    let slug = derive_slug(title)?;
    if slug.len() <= MAX_SLUG_LEN {
        return Ok(slug);
    }

    // slugify output is ASCII, so byte slicing is safe.
    let head = &slug[..MAX_SLUG_LEN];
    let cut = match head.rfind('-') {
        Some(idx) if idx > 0 => &head[..idx],
        _ => head,
    };
    Ok(cut.trim_end_matches('-').to_string())
}

fn transliterate_to_ascii(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(py) => append_pinyin(&mut output, py),
            None if ch.is_whitespace() => output.push(' '),
            None => output.push(ch),
        }
    }

    output
}

fn append_pinyin(buffer: &mut String, pinyin: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(pinyin.plain());
}
