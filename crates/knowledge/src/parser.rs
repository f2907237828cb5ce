//! Text extraction from uploaded documents.

use askdoc_core::{AppError, AppResult};
use std::path::Path;

/// Content type classification, by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Pdf,
    Markdown,
    Html,
    PlainText,
    Unknown,
}

impl ContentType {
    pub fn from_name(name: &str) -> Self {
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("pdf") => Self::Pdf,
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            Some("txt") | Some("text") => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::PlainText => "text",
            Self::Unknown => "unknown",
        }
    }
}

/// Extract clean text from document bytes.
///
/// Blocking: PDF parsing is CPU-bound, call from `spawn_blocking`.
/// Returns `AppError::Indexing` when the bytes cannot be decoded or contain
/// no text at all.
pub fn extract_text(name: &str, bytes: &[u8]) -> AppResult<String> {
    let content_type = ContentType::from_name(name);

    let text = match content_type {
        ContentType::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| AppError::Indexing(format!("Failed to parse PDF '{}': {}", name, e)))?,
        ContentType::Markdown => clean_markdown(&decode_utf8(name, bytes)?),
        ContentType::Html => clean_html(&decode_utf8(name, bytes)?),
        ContentType::PlainText => decode_utf8(name, bytes)?,
        ContentType::Unknown => {
            let raw = decode_utf8(name, bytes)?;
            if raw.contains('\0') {
                return Err(AppError::Indexing(format!(
                    "'{}' looks like a binary file",
                    name
                )));
            }
            raw
        }
    };

    let text = normalize_whitespace(&text);
    if text.is_empty() {
        return Err(AppError::Indexing(format!(
            "No extractable text in '{}'",
            name
        )));
    }

    tracing::debug!(
        "Extracted {} chars from {} ({})",
        text.len(),
        name,
        content_type.as_str()
    );

    Ok(text)
}

fn decode_utf8(name: &str, bytes: &[u8]) -> AppResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| AppError::Indexing(format!("'{}' is not valid UTF-8 text", name)))
}

/// Trim each line and collapse runs of blank lines (PDF output is full of them).
fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank_run += 1;
            continue;
        }
        if !result.is_empty() {
            result.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        result.push_str(trimmed);
        blank_run = 0;
    }

    result
}

/// Remove markdown headers markers, fences and rules.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim_start_matches('#').trim();

        if trimmed.starts_with("---") || trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }

        result.push_str(trimmed);
        result.push('\n');
    }

    result
}

/// Strip tags, scripts and styles.
fn clean_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    for (i, ch) in text.char_indices() {
        if ch == '<' {
            in_tag = true;
            let rest = text[i..].chars().take(8).collect::<String>().to_ascii_lowercase();
            if rest.starts_with("<script") {
                in_script = true;
            } else if rest.starts_with("</script") {
                in_script = false;
            } else if rest.starts_with("<style") {
                in_style = true;
            } else if rest.starts_with("</style") {
                in_style = false;
            } else if rest.starts_with("<p") || rest.starts_with("<br") || rest.starts_with("<li") {
                result.push('\n');
            }
        } else if ch == '>' {
            in_tag = false;
        } else if !in_tag && !in_script && !in_style {
            result.push(ch);
        }
    }

    result
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_detection() {
        assert_eq!(ContentType::from_name("manual.PDF"), ContentType::Pdf);
        assert_eq!(ContentType::from_name("notes.md"), ContentType::Markdown);
        assert_eq!(ContentType::from_name("page.htm"), ContentType::Html);
        assert_eq!(ContentType::from_name("faq.txt"), ContentType::PlainText);
        assert_eq!(ContentType::from_name("archive"), ContentType::Unknown);
    }

    #[test]
    fn test_clean_markdown() {
        let input = "# Warranty\n\nTwo years.\n\n```text\ncode\n```\n\n---\nParts and labor.";
        let output = extract_text("manual.md", input.as_bytes()).unwrap();
        assert!(output.starts_with("Warranty"));
        assert!(output.contains("Parts and labor."));
        assert!(!output.contains("```"));
    }

    #[test]
    fn test_clean_html() {
        let input = "<html><head><style>p { color: red }</style></head>\
                     <body><p>Hello <b>world</b></p><script>var x = 1;</script></body></html>";
        let output = extract_text("page.html", input.as_bytes()).unwrap();
        assert_eq!(output, "Hello world");
    }

    #[test]
    fn test_whitespace_normalization() {
        assert_eq!(normalize_whitespace("  a  \n\n\n\n  b\nc  "), "a\n\nb\nc");
    }

    #[test]
    fn test_empty_document_is_indexing_error() {
        let err = extract_text("blank.txt", b"   \n\n ").unwrap_err();
        assert!(matches!(err, AppError::Indexing(_)));
    }

    #[test]
    fn test_corrupt_pdf_is_indexing_error() {
        let err = extract_text("broken.pdf", b"this is not a pdf").unwrap_err();
        assert!(matches!(err, AppError::Indexing(_)));
    }

    #[test]
    fn test_invalid_utf8_is_indexing_error() {
        let err = extract_text("notes.txt", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, AppError::Indexing(_)));
    }
}
