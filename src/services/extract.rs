//! Turning files into documents.
//!
//! Plain text, markdown, and HTML are handled here. PDF and image text come from
//! external collaborators registered at runtime; without one those kinds fail
//! with [`ExtractionError::NoExtractor`].

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use crate::error::ExtractionError;
use crate::models::{Document, MetadataValue};
use crate::utils::file::{calculate_checksum, read_file_bytes};

/// File kind, detected from the extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentKind {
    PlainText,
    Markdown,
    Html,
    Pdf,
    Image,
    Unsupported(String),
}

impl ContentKind {
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension() else {
            return ContentKind::PlainText;
        };
        let ext = ext.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "md" | "markdown" | "mdx" => ContentKind::Markdown,
            "html" | "htm" | "xhtml" => ContentKind::Html,
            "pdf" => ContentKind::Pdf,
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" | "gif" | "webp" => ContentKind::Image,
            "txt" | "text" | "log" | "csv" | "tsv" | "rst" | "adoc" | "org" | "json" | "yaml"
            | "yml" | "toml" | "xml" | "ini" | "cfg" | "rs" | "py" | "js" | "ts" | "go"
            | "java" | "kt" | "c" | "h" | "cpp" | "hpp" | "rb" | "sh" | "sql" => {
                ContentKind::PlainText
            }
            _ => ContentKind::Unsupported(ext),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentKind::PlainText => "text",
            ContentKind::Markdown => "markdown",
            ContentKind::Html => "html",
            ContentKind::Pdf => "pdf",
            ContentKind::Image => "image",
            ContentKind::Unsupported(ext) => ext,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text pulled out of one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub text: String,
    pub page_count: Option<u32>,
    pub tables: Vec<String>,
}

impl Extracted {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Converts raw file bytes into text.
pub trait Extractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<Extracted, ExtractionError>;
}

fn decode_utf8(bytes: &[u8]) -> Result<&str, ExtractionError> {
    std::str::from_utf8(bytes).map_err(|e| ExtractionError::InvalidEncoding(e.to_string()))
}

// A pattern that fails to compile leaves text unchanged
fn replace_all<'a>(re: &Option<Regex>, text: &'a str, rep: &str) -> Cow<'a, str> {
    match re {
        Some(re) => re.replace_all(text, rep),
        None => Cow::Borrowed(text),
    }
}

static RE_MULTI_BLANK_LINES: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*){2,}").ok());

fn collapse_blank_lines(text: &str) -> String {
    replace_all(&RE_MULTI_BLANK_LINES, text, "\n\n").trim().to_string()
}

pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Extracted, ExtractionError> {
        let text = decode_utf8(bytes)?;
        // Keep form feeds: they mark page breaks for the chunker
        let pages = text.matches('\u{c}').count();
        Ok(Extracted {
            text: text.replace("\r\n", "\n"),
            page_count: (pages > 0).then(|| pages as u32 + 1),
            tables: Vec::new(),
        })
    }
}

static RE_MD_FENCE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)^\s*(```|~~~).*$").ok());
static RE_MD_IMAGE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").ok());
static RE_MD_LINK: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").ok());
static RE_MD_HEADING: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s+").ok());
static RE_MD_EMPHASIS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\*\*|__|\*|`)([^*`\n]+)(\*\*|__|\*|`)").ok());
static RE_MD_RULE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)^\s*([-*_]\s*){3,}$").ok());
static RE_MD_TABLE_DIVIDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\|?[\s:|-]+\|?$").ok());

/// Strips markdown syntax; pipe tables become separate table text.
pub struct MarkdownExtractor;

impl MarkdownExtractor {
    fn split_tables(text: &str) -> (String, Vec<String>) {
        // A lone pipe row is not a table and stays in the body
        fn flush<'a>(current: &mut Vec<&'a str>, body: &mut Vec<&'a str>, tables: &mut Vec<String>) {
            match current.len() {
                0 => {}
                1 => body.push(current[0]),
                _ => tables.push(current.join("\n")),
            }
            current.clear();
        }

        let mut body = Vec::new();
        let mut tables = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 1 {
                let divider = RE_MD_TABLE_DIVIDER
                    .as_ref()
                    .is_some_and(|re| re.is_match(trimmed));
                if !divider {
                    current.push(trimmed);
                }
                continue;
            }
            flush(&mut current, &mut body, &mut tables);
            body.push(line);
        }
        flush(&mut current, &mut body, &mut tables);

        (body.join("\n"), tables)
    }
}

impl Extractor for MarkdownExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Extracted, ExtractionError> {
        let source = decode_utf8(bytes)?;
        let (body, tables) = Self::split_tables(source);

        let text = replace_all(&RE_MD_FENCE, &body, "").into_owned();
        let text = replace_all(&RE_MD_IMAGE, &text, "$1").into_owned();
        let text = replace_all(&RE_MD_LINK, &text, "$1").into_owned();
        let text = replace_all(&RE_MD_HEADING, &text, "").into_owned();
        let text = replace_all(&RE_MD_RULE, &text, "").into_owned();
        let text = replace_all(&RE_MD_EMPHASIS, &text, "$2").into_owned();

        Ok(Extracted {
            text: collapse_blank_lines(&text),
            page_count: None,
            tables,
        })
    }
}

static RE_HTML_HIDDEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style|head|noscript)\b.*?</(script|style|head|noscript)\s*>").ok());
static RE_HTML_COMMENT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").ok());
static RE_HTML_TABLE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?is)<table\b.*?</table\s*>").ok());
static RE_HTML_ROW_END: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)</tr\s*>").ok());
static RE_HTML_CELL_END: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)</t[dh]\s*>").ok());
static RE_HTML_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)<(br|/p|/div|/li|/h[1-6]|/section|/article)\b[^>]*>").ok());
static RE_HTML_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>").ok());

/// Strips tags and hidden elements; `<table>` blocks become separate table text.
pub struct HtmlExtractor;

impl HtmlExtractor {
    fn decode_entities(text: &str) -> String {
        text.replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    }

    fn strip_tags(html: &str) -> String {
        let text = replace_all(&RE_HTML_BLOCK, html, "\n");
        let text = replace_all(&RE_HTML_TAG, &text, "");
        Self::decode_entities(&text)
    }

    fn table_text(table: &str) -> String {
        let rows = replace_all(&RE_HTML_CELL_END, table, " | ");
        let rows = replace_all(&RE_HTML_ROW_END, &rows, "\n");
        let text = replace_all(&RE_HTML_TAG, &rows, "");
        Self::decode_entities(&text)
            .lines()
            .map(|line| line.trim().trim_end_matches('|').trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Extractor for HtmlExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Extracted, ExtractionError> {
        let source = decode_utf8(bytes)?;
        let cleaned = replace_all(&RE_HTML_HIDDEN, source, "");
        let cleaned = replace_all(&RE_HTML_COMMENT, &cleaned, "").into_owned();

        let tables = match RE_HTML_TABLE.as_ref() {
            Some(re) => re
                .find_iter(&cleaned)
                .map(|m| Self::table_text(m.as_str()))
                .filter(|t| !t.is_empty())
                .collect(),
            None => Vec::new(),
        };
        let body = replace_all(&RE_HTML_TABLE, &cleaned, "\n");
        let text = Self::strip_tags(&body);
        let text: Vec<&str> = text.lines().map(str::trim).collect();

        Ok(Extracted {
            text: collapse_blank_lines(&text.join("\n")),
            page_count: None,
            tables,
        })
    }
}

/// Dispatch table from content kind to extractor.
pub struct ExtractorRegistry {
    extractors: HashMap<ContentKind, Arc<dyn Extractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ExtractorRegistry {
    /// Empty registry; every kind fails with `NoExtractor`.
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Registry with the text, markdown, and HTML extractors.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ContentKind::PlainText, PlainTextExtractor);
        registry.register(ContentKind::Markdown, MarkdownExtractor);
        registry.register(ContentKind::Html, HtmlExtractor);
        registry
    }

    pub fn register<E: Extractor + 'static>(&mut self, kind: ContentKind, extractor: E) {
        self.extractors.insert(kind, Arc::new(extractor));
    }

    pub fn supports(&self, kind: &ContentKind) -> bool {
        self.extractors.contains_key(kind)
    }

    pub fn extract(&self, kind: &ContentKind, bytes: &[u8]) -> Result<Extracted, ExtractionError> {
        if let ContentKind::Unsupported(ext) = kind {
            return Err(ExtractionError::Unsupported(ext.clone()));
        }
        let extractor = self
            .extractors
            .get(kind)
            .ok_or_else(|| ExtractionError::NoExtractor(kind.to_string()))?;
        extractor.extract(bytes)
    }

    /// Read a file and turn it into a [`Document`] keyed by its path.
    pub fn load_document(&self, path: &Path, max_file_size: u64) -> Result<Document, ExtractionError> {
        let kind = ContentKind::from_path(path);
        if let ContentKind::Unsupported(ext) = &kind {
            return Err(ExtractionError::Unsupported(ext.clone()));
        }

        let bytes = read_file_bytes(path, max_file_size)?;
        let extracted = self.extract(&kind, &bytes)?;
        let uri = path.to_string_lossy().to_string();

        if extracted.text.trim().is_empty() && extracted.tables.iter().all(|t| t.trim().is_empty()) {
            return Err(ExtractionError::NoUsableText(uri));
        }
        debug!(path = %uri, kind = %kind, chars = extracted.text.len(), "extracted document");

        let mut document = Document::new(uri, extracted.text)
            .with_tables(extracted.tables)
            .with_metadata("content_kind", kind.as_str())
            .with_metadata("checksum", calculate_checksum(&bytes))
            .with_metadata("size_bytes", MetadataValue::Integer(bytes.len() as i64));
        if let Some(name) = path.file_name() {
            document = document.with_metadata("filename", name.to_string_lossy().to_string());
        }
        if let Some(pages) = extracted.page_count {
            document = document.with_page_count(pages);
        }
        Ok(document)
    }
}
