//! Conversion of upstream page bodies into the requested output format.

use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use pulldown_cmark::{Event, Options, Parser};
use regex::Regex;
use scraper::{Html, Selector};

use crate::model::MimeType;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("unparseable content type {0:?}")]
    ContentType(String),
    #[error("unsupported charset {0:?}")]
    Charset(String),
    #[error("unsupported target mime type {0:?}")]
    Target(MimeType),
}

static SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("static script pattern"));
static STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("static style pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Text,
    Html,
}

/// Converts `body`, served with `content_type`, into `target`.
///
/// HTML sources are reduced to their `<body>` and converted to Markdown;
/// plain-text sources are treated as Markdown already. An HTML target is
/// rendered from that Markdown with raw HTML dropped, so the output never
/// carries upstream markup through unchanged.
pub fn transform(content_type: &str, target: MimeType, body: &[u8]) -> Result<String, ContentError> {
    let (format, charset) = parse_content_type(content_type)?;
    let text = decode(body, charset.as_deref())?;

    let markdown = match format {
        SourceFormat::Text => scrub_text(&text),
        SourceFormat::Html => html_to_markdown(&text),
    };

    match target {
        MimeType::Markdown => Ok(markdown),
        MimeType::Html => Ok(markdown_to_html(&markdown)),
        MimeType::Unspecified => Err(ContentError::Target(target)),
    }
}

fn parse_content_type(value: &str) -> Result<(SourceFormat, Option<String>), ContentError> {
    let mut parts = value.split(';');
    let essence = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
    if essence.is_empty() {
        return Ok((SourceFormat::Html, None));
    }
    let Some((kind, subtype)) = essence.split_once('/') else {
        return Err(ContentError::ContentType(value.to_owned()));
    };
    if kind.is_empty() || subtype.is_empty() {
        return Err(ContentError::ContentType(value.to_owned()));
    }

    let charset = parts.find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
    });

    let format = if essence == "text/plain" || essence == "text/markdown" {
        SourceFormat::Text
    } else {
        SourceFormat::Html
    };
    Ok((format, charset))
}

/// Decodes `body` in the declared charset, UTF-8 when none is declared. A
/// leading byte order mark wins over the declaration. UTF-8 bodies that do
/// not decode cleanly are read as Windows-1252 instead.
fn decode(body: &[u8], charset: Option<&str>) -> Result<String, ContentError> {
    let declared = match charset {
        Some(label) => Encoding::for_label(label.as_bytes())
            .ok_or_else(|| ContentError::Charset(label.to_owned()))?,
        None => UTF_8,
    };
    let (encoding, body) = match Encoding::for_bom(body) {
        Some((encoding, bom_len)) => (encoding, &body[bom_len..]),
        None => (declared, body),
    };

    if encoding == UTF_8 {
        if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(body) {
            return Ok(text.into_owned());
        }
        tracing::debug!(declared = ?charset, "body is not valid UTF-8; decoding as windows-1252");
        return Ok(WINDOWS_1252.decode_without_bom_handling(body).0.into_owned());
    }
    Ok(encoding.decode_without_bom_handling(body).0.into_owned())
}

fn normalize_spaces(text: &str) -> String {
    text.replace('\u{a0}', " ").replace("&nbsp;", " ")
}

/// Trims trailing whitespace and collapses runs of blank lines.
fn scrub_text(text: &str) -> String {
    let text = normalize_spaces(text).replace("\r\n", "\n");
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim_matches('\n').to_owned()
}

fn html_to_markdown(html: &str) -> String {
    let html = normalize_spaces(html);
    let html = SCRIPT.replace_all(&html, "");
    let html = STYLE.replace_all(&html, "");
    let document = Html::parse_document(&html);
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next().map(|body| body.inner_html()))
        .unwrap_or_else(|| html.to_string());
    scrub_text(&html2md::parse_html(&body))
}

fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(markdown, options)
        .filter(|event| !matches!(event, Event::Html(_) | Event::InlineHtml(_)));
    let mut out = String::new();
    pulldown_cmark::html::push_html(&mut out, parser);
    out
}
