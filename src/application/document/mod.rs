//! Structured article bodies.
//!
//! A body is parsed into the comrak AST for the duration of one call. Arena
//! nodes cannot cross an `.await`, so callers read an [`DocumentOutline`], do
//! their async work against plain values, then hand a [`DocumentEdits`] back to
//! [`rewrite`], which re-parses the same text and applies the edits by index.

mod options;
mod transformer;

use std::collections::BTreeMap;

use comrak::{
    Arena, format_commonmark, format_html,
    nodes::{AstNode, NodeValue},
    parse_document,
};
use thiserror::Error;

pub use transformer::DocumentTransformer;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to serialize document: {message}")]
    Serialize { message: String },
}

/// An image reference in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageNode {
    /// Position among all images of the document, depth-first.
    pub index: usize,
    pub url: String,
    pub alt_text: String,
}

impl ImageNode {
    pub fn has_http_url(&self) -> bool {
        is_http_url(&self.url)
    }

    /// Missing or non-HTTP URL with a description to generate from.
    pub fn needs_resolution(&self) -> bool {
        !self.has_http_url() && !self.alt_text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentOutline {
    pub images: Vec<ImageNode>,
    /// Text of the first top-level block when it is a level-1 heading.
    pub leading_heading: Option<String>,
    pub first_paragraph: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentEdits {
    /// Replacement URLs keyed by [`ImageNode::index`].
    pub image_urls: BTreeMap<usize, String>,
    pub strip_leading_heading: bool,
}

impl DocumentEdits {
    pub fn is_empty(&self) -> bool {
        self.image_urls.is_empty() && !self.strip_leading_heading
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub markdown: String,
    pub html: String,
}

pub fn is_http_url(value: &str) -> bool {
    url::Url::parse(value.trim())
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

pub fn outline(markdown: &str) -> DocumentOutline {
    let options = options::markdown_options();
    let arena = Arena::new();
    let root = parse_document(&arena, markdown, &options);

    let images = image_nodes(root)
        .into_iter()
        .enumerate()
        .filter_map(|(index, node)| {
            let url = {
                let data = node.data.borrow();
                match &data.value {
                    NodeValue::Image(link) => link.url.to_string(),
                    _ => return None,
                }
            };
            Some(ImageNode {
                index,
                url,
                alt_text: normalize_whitespace(&collect_inline_text(node)),
            })
        })
        .collect();

    let leading_heading =
        leading_heading(root).map(|node| normalize_whitespace(&collect_inline_text(node)));

    let first_paragraph = top_level_blocks(root)
        .find(|node| matches!(node.data.borrow().value, NodeValue::Paragraph))
        .map(|node| normalize_whitespace(&collect_inline_text(node)))
        .filter(|text| !text.is_empty());

    DocumentOutline {
        images,
        leading_heading,
        first_paragraph,
    }
}

/// Apply `edits` and serialize back to CommonMark. Unedited input is returned
/// verbatim.
pub fn rewrite(markdown: &str, edits: &DocumentEdits) -> Result<String, DocumentError> {
    if edits.is_empty() {
        return Ok(markdown.to_string());
    }

    let options = options::markdown_options();
    let arena = Arena::new();
    let root = parse_document(&arena, markdown, &options);
    apply_edits(root, edits);

    let mut output = String::new();
    format_commonmark(root, &options, &mut output).map_err(|err| DocumentError::Serialize {
        message: err.to_string(),
    })?;
    Ok(output)
}

/// Apply `edits`, then serialize the same tree to CommonMark and to sanitized HTML.
pub fn rewrite_html(
    markdown: &str,
    edits: &DocumentEdits,
) -> Result<RenderedDocument, DocumentError> {
    let options = options::markdown_options();
    let arena = Arena::new();
    let root = parse_document(&arena, markdown, &options);
    apply_edits(root, edits);

    let markdown = if edits.is_empty() {
        markdown.to_string()
    } else {
        let mut output = String::new();
        format_commonmark(root, &options, &mut output).map_err(|err| {
            DocumentError::Serialize {
                message: err.to_string(),
            }
        })?;
        output
    };

    let mut html = String::new();
    format_html(root, &options, &mut html).map_err(|err| DocumentError::Serialize {
        message: err.to_string(),
    })?;
    let html = options::html_sanitizer().clean(&html).to_string();

    Ok(RenderedDocument { markdown, html })
}

fn apply_edits<'a>(root: &'a AstNode<'a>, edits: &DocumentEdits) {
    if !edits.image_urls.is_empty() {
        for (index, node) in image_nodes(root).into_iter().enumerate() {
            let Some(url) = edits.image_urls.get(&index) else {
                continue;
            };
            let mut data = node.data.borrow_mut();
            if let NodeValue::Image(link) = &mut data.value {
                link.url = url.clone().into();
            }
        }
    }

    if edits.strip_leading_heading
        && let Some(heading) = leading_heading(root)
    {
        heading.detach();
    }
}

fn image_nodes<'a>(root: &'a AstNode<'a>) -> Vec<&'a AstNode<'a>> {
    fn walk<'a>(node: &'a AstNode<'a>, found: &mut Vec<&'a AstNode<'a>>) {
        if matches!(node.data.borrow().value, NodeValue::Image(_)) {
            found.push(node);
        }
        let mut child = node.first_child();
        while let Some(next) = child {
            walk(next, found);
            child = next.next_sibling();
        }
    }

    let mut found = Vec::new();
    walk(root, &mut found);
    found
}

fn top_level_blocks<'a>(root: &'a AstNode<'a>) -> impl Iterator<Item = &'a AstNode<'a>> {
    std::iter::successors(root.first_child(), |node| node.next_sibling())
}

fn leading_heading<'a>(root: &'a AstNode<'a>) -> Option<&'a AstNode<'a>> {
    let first = root.first_child()?;
    let is_title = matches!(
        &first.data.borrow().value,
        NodeValue::Heading(heading) if heading.level == 1
    );
    is_title.then_some(first)
}

fn collect_inline_text(node: &AstNode<'_>) -> String {
    fn walk(node: &AstNode<'_>, buffer: &mut String) {
        {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::Text(text) => buffer.push_str(text),
                NodeValue::Code(code) => buffer.push_str(&code.literal),
                NodeValue::LineBreak | NodeValue::SoftBreak => buffer.push(' '),
                _ => {}
            }
        }
        let mut child = node.first_child();
        while let Some(next) = child {
            walk(next, buffer);
            child = next.next_sibling();
        }
    }

    let mut text = String::new();
    let mut child = node.first_child();
    while let Some(next) = child {
        walk(next, &mut text);
        child = next.next_sibling();
    }
    text
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
