//! HTML rendering of a chapter tree
//!
//! Headings come from each chapter's cached `level` via [`heading_tag`];
//! chapter bodies are markdown.

use crate::export::ExportError;
use crate::models::{Book, ChapterTreeNode};
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// HTML heading tag for a chapter level: `h{level + 1}`, clamped to `h1..h6`
pub fn heading_tag(level: u32) -> String {
    format!("h{}", level.saturating_add(1).clamp(1, 6))
}

const SLUG_SEPARATOR_PATTERN: &str = r"[^a-z0-9]+";

/// Lowercase ASCII slug of a title; `"chapter"` when nothing is left
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    static SLUG_REGEX: OnceLock<Regex> = OnceLock::new();
    let slug_regex = SLUG_REGEX.get_or_init(|| Regex::new(SLUG_SEPARATOR_PATTERN).unwrap());

    let slug = slug_regex.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "chapter".to_string()
    } else {
        slug.to_string()
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut out = String::new();
    html::push_html(&mut out, Parser::new_ext(markdown, options));
    out
}

/// Render one chapter and its whole subtree as nested `<section>`s
pub fn render_chapter_html(node: &ChapterTreeNode) -> String {
    let mut out = String::new();
    push_section(&mut out, node);
    out
}

fn push_section(out: &mut String, node: &ChapterTreeNode) {
    let chapter = &node.chapter;
    let tag = heading_tag(chapter.level);

    let _ = writeln!(out, "<section id=\"{}\">", escape_html(&chapter.id));
    let _ = writeln!(out, "<{tag}>{}</{tag}>", escape_html(&chapter.title));
    if !chapter.content.trim().is_empty() {
        out.push_str(&markdown_to_html(&chapter.content));
    }
    for child in &node.children {
        push_section(out, child);
    }
    out.push_str("</section>\n");
}

/// Render a complete standalone HTML document for a book
pub fn render_book_html(book: &Book, tree: &[ChapterTreeNode]) -> String {
    let body: String = tree.iter().map(render_chapter_html).collect();
    wrap_document(&book.title, book.author.as_deref(), &body)
}

fn wrap_document(title: &str, author: Option<&str>, body: &str) -> String {
    let title = escape_html(title);
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "<title>{}</title>", title);
    if let Some(author) = author {
        let _ = writeln!(out, "<meta name=\"author\" content=\"{}\">", escape_html(author));
    }
    out.push_str("</head>\n<body>\n");
    out.push_str(body);
    out.push_str("</body>\n</html>\n");
    out
}

/// File name for the root chapter at `index`: `NN-slug.html`
pub fn chapter_file_name(index: usize, title: &str) -> String {
    format!("{:02}-{}.html", index + 1, slugify(title))
}

/// Write one HTML file per root chapter (subtree inline) into `out_dir`.
///
/// Returns the files in book order, ready to hand to a converter.
pub async fn write_chapter_files(
    out_dir: &Path,
    book: &Book,
    tree: &[ChapterTreeNode],
) -> Result<Vec<PathBuf>, ExportError> {
    if tree.is_empty() {
        return Err(ExportError::empty_book(book.id.clone()));
    }

    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| ExportError::io(out_dir, e))?;

    let mut files = Vec::with_capacity(tree.len());
    for (index, node) in tree.iter().enumerate() {
        let path = out_dir.join(chapter_file_name(index, &node.chapter.title));
        let document = wrap_document(
            &node.chapter.title,
            book.author.as_deref(),
            &render_chapter_html(node),
        );
        tokio::fs::write(&path, document)
            .await
            .map_err(|e| ExportError::io(&path, e))?;
        files.push(path);
    }

    tracing::debug!(
        "Wrote {} chapter file(s) for book '{}' to {}",
        files.len(),
        book.id,
        out_dir.display()
    );
    Ok(files)
}
