//! Text extraction from MIME messages.
//!
//! Walks a multipart body in document order and concatenates the content of
//! every `text/*` leaf. Nested multiparts are flattened, anything else is skipped.
//! Quoted-printable leaves are decoded; every other transfer encoding is kept as is.

use mailparse::MailHeaderMap;

use crate::domain::mail::{ExtractedMail, HeaderMap, RawMessage};
use crate::error::MimeError;

/// Deepest multipart nesting accepted, counting the top-level body as 1.
pub const MAX_MULTIPART_DEPTH: usize = 64;

/// Assumed for a single-part message without Content-Type when
/// `single_part_text` is set.
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Also return the body of a message whose top-level type is `text/*`.
    /// Off by default: only multipart messages yield text.
    pub single_part_text: bool,
}

/// Split a full RFC 822 message into its header map and extracted text.
pub fn extract_mail(raw: &RawMessage, options: ExtractOptions) -> Result<ExtractedMail, MimeError> {
    let (headers, offset) =
        mailparse::parse_headers(&raw.bytes).map_err(|e| MimeError::Header(e.to_string()))?;

    let mut header = HeaderMap::new();
    for h in headers.iter() {
        // get_value unfolds and decodes RFC 2047 encoded-words
        header.push(h.get_key(), h.get_value());
    }

    let content_type = match headers.get_first_value("Content-Type") {
        Some(value) => value,
        None if options.single_part_text => DEFAULT_CONTENT_TYPE.to_string(),
        None => return Err(MimeError::MissingContentType),
    };
    let text = extract_text(&content_type, &raw.bytes[offset..], options)?;

    Ok(ExtractedMail {
        seq: raw.seq,
        header,
        text,
    })
}

/// Extract the concatenated `text/*` content of a body declared as `content_type`.
pub fn extract_text(
    content_type: &str,
    body: &[u8],
    options: ExtractOptions,
) -> Result<String, MimeError> {
    let media = MediaType::parse(content_type)?;
    let mut out = Vec::new();

    if media.is_multipart() {
        let boundary = media.boundary()?;
        walk_multipart(body, &boundary, 1, &mut out)?;
    } else if options.single_part_text && media.is_text() {
        out.extend_from_slice(body);
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn walk_multipart(
    body: &[u8],
    boundary: &str,
    depth: usize,
    out: &mut Vec<u8>,
) -> Result<(), MimeError> {
    if depth > MAX_MULTIPART_DEPTH {
        return Err(MimeError::TooDeep(MAX_MULTIPART_DEPTH));
    }

    for part in split_parts(body, boundary)? {
        let (headers, offset) =
            mailparse::parse_headers(part).map_err(|e| MimeError::Header(e.to_string()))?;
        let content_type = headers
            .get_first_value("Content-Type")
            .ok_or(MimeError::MissingContentType)?;
        let media = MediaType::parse(&content_type)?;
        let content = &part[offset..];

        if media.is_text() {
            let qp = headers
                .get_first_value("Content-Transfer-Encoding")
                .is_some_and(|enc| enc.trim().eq_ignore_ascii_case("quoted-printable"));
            if qp {
                let decoded =
                    quoted_printable::decode(content, quoted_printable::ParseMode::Robust)
                        .unwrap_or_else(|_| content.to_vec());
                out.extend_from_slice(&decoded);
            } else {
                out.extend_from_slice(content);
            }
        } else if media.is_multipart() {
            let nested = media.boundary()?;
            walk_multipart(content, &nested, depth + 1, out)?;
        }
    }

    Ok(())
}

/// Slice a multipart body into its parts (headers + content, delimiters removed).
///
/// The line break in front of a delimiter line belongs to the delimiter. Preamble
/// and epilogue are dropped.
fn split_parts<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<&'a [u8]>, MimeError> {
    let dash_boundary = format!("--{boundary}");
    let dash_boundary = dash_boundary.as_bytes();

    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| pos + i + 1)
            .unwrap_or(body.len());
        let line = trim_line_break(&body[pos..line_end]);

        if let Some(kind) = delimiter_kind(line, dash_boundary) {
            if let Some(start) = part_start {
                parts.push(&body[start..content_end(body, start, pos)]);
            }
            match kind {
                Delimiter::Close => {
                    if part_start.is_none() {
                        return Err(MimeError::NoOpeningDelimiter(boundary.to_string()));
                    }
                    return Ok(parts);
                }
                Delimiter::Open => part_start = Some(line_end),
            }
        }

        pos = line_end;
    }

    if part_start.is_none() {
        Err(MimeError::NoOpeningDelimiter(boundary.to_string()))
    } else {
        Err(MimeError::Unterminated(boundary.to_string()))
    }
}

enum Delimiter {
    Open,
    Close,
}

fn delimiter_kind(line: &[u8], dash_boundary: &[u8]) -> Option<Delimiter> {
    let rest = line.strip_prefix(dash_boundary)?;
    let (kind, rest) = match rest.strip_prefix(b"--") {
        Some(after) => (Delimiter::Close, after),
        None => (Delimiter::Open, rest),
    };
    // transport padding
    rest.iter()
        .all(|&b| b == b' ' || b == b'\t')
        .then_some(kind)
}

fn trim_line_break(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// End of a part's content given the offset of the delimiter line that follows it.
fn content_end(body: &[u8], start: usize, delimiter_at: usize) -> usize {
    let mut end = delimiter_at;
    if end > start && body[end - 1] == b'\n' {
        end -= 1;
        if end > start && body[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}

#[derive(Debug)]
struct MediaType {
    essence: String,
    raw: String,
    params: std::collections::BTreeMap<String, String>,
}

impl MediaType {
    fn parse(raw: &str) -> Result<Self, MimeError> {
        let essence = raw
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let valid = essence
            .split_once('/')
            .is_some_and(|(kind, sub)| is_token(kind) && is_token(sub));
        if !valid {
            return Err(MimeError::ContentType(raw.to_string()));
        }

        let parsed = mailparse::parse_content_type(raw);
        Ok(Self {
            essence,
            raw: raw.to_string(),
            params: parsed.params,
        })
    }

    fn is_text(&self) -> bool {
        self.essence.starts_with("text/")
    }

    fn is_multipart(&self) -> bool {
        self.essence.starts_with("multipart/")
    }

    fn boundary(&self) -> Result<String, MimeError> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("boundary"))
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| MimeError::MissingBoundary(self.raw.clone()))
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b)
        })
}
