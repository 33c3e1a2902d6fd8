//! Text extraction and chunking for uploaded documents.
//!
//! Anything that cannot be read degrades to a placeholder for that file
//! only; an upload batch is never aborted by one bad document.

/// Stands in for image content, since OCR is out of scope.
pub const IMAGE_PLACEHOLDER: &str = "[image uploaded]";

/// Stands in for a file that could not be parsed at all.
pub const UNREADABLE_PLACEHOLDER: &str = "[unreadable file]";

/// Retrieval unit size, in characters.
pub const CHUNK_SIZE: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF parse error: {0}")]
    Pdf(String),
    #[error("spreadsheet parse error: {0}")]
    Spreadsheet(String),
}

#[derive(Debug, Clone)]
pub struct Extracted {
    pub text: String,
    pub kind: &'static str,
}

/// Converts an uploaded document into plain text, dispatching on the file
/// extension. Unknown extensions are treated as text (source code, csv,
/// markdown and friends all pass through unchanged).
pub fn try_extract(filename: &str, bytes: &[u8]) -> Result<Extracted, ExtractError> {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => {
            let text = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| ExtractError::Pdf(e.to_string()))?;
            Ok(Extracted { text, kind: "pdf" })
        }
        "xlsx" | "xls" | "ods" | "xlsm" | "xlsb" => Ok(Extracted {
            text: extract_spreadsheet(bytes)?,
            kind: "spreadsheet",
        }),
        "html" | "htm" => Ok(Extracted {
            text: strip_html_tags(&String::from_utf8_lossy(bytes)),
            kind: "html",
        }),
        "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "tiff" => Ok(Extracted {
            text: IMAGE_PLACEHOLDER.to_string(),
            kind: "image",
        }),
        _ => Ok(Extracted {
            text: String::from_utf8_lossy(bytes).into_owned(),
            kind: "text",
        }),
    }
}

/// Like [`try_extract`], but degrades to [`UNREADABLE_PLACEHOLDER`] instead
/// of failing, so one malformed file never sinks its batch.
pub fn extract_or_placeholder(filename: &str, bytes: &[u8]) -> Extracted {
    match try_extract(filename, bytes) {
        Ok(extracted) => extracted,
        Err(e) => {
            tracing::warn!(file = filename, error = %e, "extraction failed, using placeholder");
            Extracted {
                text: UNREADABLE_PLACEHOLDER.to_string(),
                kind: "unreadable",
            }
        }
    }
}

/// Flattens every sheet to one row per line, cells pipe-separated.
fn extract_spreadsheet(bytes: &[u8]) -> Result<String, ExtractError> {
    use calamine::{open_workbook_auto_from_rs, Data, Reader};

    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| ExtractError::Spreadsheet(e.to_string()))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut all_text = String::new();

    for sheet_name in &sheet_names {
        let range = match workbook.worksheet_range(sheet_name) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if range.is_empty() {
            continue;
        }
        if sheet_names.len() > 1 {
            all_text.push_str(&format!("\n--- Sheet: {sheet_name} ---\n"));
        }
        for row in range.rows() {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| match cell {
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            all_text.push_str(&cells.join(" | "));
            all_text.push('\n');
        }
    }

    if all_text.trim().is_empty() {
        return Err(ExtractError::Spreadsheet("no data in any sheet".into()));
    }
    Ok(all_text)
}

/// Drops script/style blocks, strips the remaining tags, decodes the common
/// entities, and collapses whitespace.
fn strip_html_tags(html: &str) -> String {
    let stripped = remove_blocks(&remove_blocks(html, "script"), "style");

    let mut out = String::with_capacity(stripped.len());
    let mut in_tag = false;
    for ch in stripped.chars() {
        match ch {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }

    let out = out
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Removes every `<tag ...>...</tag>` block. Matching is ASCII
/// case-insensitive, which keeps byte offsets aligned with the input.
fn remove_blocks(input: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut lower = input.to_string();
    lower.make_ascii_lowercase();

    let mut out = String::with_capacity(input.len());
    let mut pos = 0;
    while let Some(found) = lower[pos..].find(&open) {
        let start = pos + found;
        out.push_str(&input[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => return out,
        }
    }
    out.push_str(&input[pos..]);
    out
}

#[derive(Debug, Clone)]
pub struct TextChunk {
    pub index: usize,
    /// Character offset of the chunk within its source text.
    pub start: usize,
    pub text: String,
}

/// Splits text into fixed-size character chunks, no overlap. The final
/// chunk carries whatever remains.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<TextChunk> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        if !piece.trim().is_empty() {
            chunks.push(TextChunk {
                index: chunks.len(),
                start,
                text: piece,
            });
        }
        start = end;
    }
    chunks
}
