//! Request body parsers.
//!
//! Both parsers work on the raw body the dispatcher drained before the chain
//! started, and do nothing when there is no body or no `Content-Type`.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use crate::error::Result;
use crate::http::headers;
use crate::request::{parse_query, Body, Part, Request, UploadedFile};

use super::{Flow, Middleware};

/// RFC 2046 caps boundaries at 70 characters
const MAX_BOUNDARY_LEN: usize = 70;

/// Parse `raw` according to the essence of `content_type`
pub fn parse_body(content_type: &str, raw: &Bytes) -> Result<Body> {
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();

    let body = match essence.as_str() {
        "application/json" | "text/json" => Body::Json(serde_json::from_slice(raw)?),
        "application/octet-stream" => Body::Raw(raw.clone()),
        "application/x-www-form-urlencoded" => {
            Body::Form(parse_query(&String::from_utf8_lossy(raw)))
        }
        text if text.starts_with("text/") => Body::Text(String::from_utf8_lossy(raw).into_owned()),
        _ => Body::Raw(raw.clone()),
    };
    Ok(body)
}

/// Fill [`Request::body`] from the raw body
pub fn body_parser() -> Middleware {
    Middleware::sync(|req, _res| {
        let Some((content_type, raw)) = raw_with_type(req) else {
            return Ok(Flow::Next);
        };
        req.set_body(parse_body(&content_type, &raw)?);
        Ok(Flow::Next)
    })
}

#[derive(Debug, Clone, Default)]
pub struct MultipartOptions {
    /// Largest body the parser accepts, in bytes
    pub max_size: Option<usize>,
}

#[derive(Debug, Error, PartialEq)]
pub enum MultipartError {
    #[error("missing boundary in multipart Content-Type")]
    MissingBoundary,

    #[error("invalid multipart boundary")]
    InvalidBoundary,

    #[error("multipart body of {size} bytes exceeds the {max} bytes limit")]
    TooLarge { size: usize, max: usize },

    #[error("malformed multipart body: {0}")]
    Malformed(&'static str),

    #[error("multipart part without a name")]
    MissingName,
}

/// Fill [`Request::body`] with the fields of a `multipart/*` body.
///
/// Parts with a filename are kept as [`UploadedFile`]s, parts with a
/// content type go through [`parse_body`], the rest become text.
pub fn multipart_parser(options: MultipartOptions) -> Middleware {
    Middleware::sync(move |req, _res| {
        let Some((content_type, raw)) = raw_with_type(req) else {
            return Ok(Flow::Next);
        };
        if !content_type.trim_start().to_ascii_lowercase().starts_with("multipart/") {
            return Ok(Flow::Next);
        }
        if let Some(max) = options.max_size {
            if raw.len() > max {
                return Err(MultipartError::TooLarge { size: raw.len(), max }.into());
            }
        }

        let boundary = parse_boundary(&content_type)?;
        let parts = split_parts(&raw, &boundary)?;
        if parts.is_empty() {
            return Ok(Flow::Next);
        }

        let mut fields = HashMap::with_capacity(parts.len());
        for part in parts {
            let value = match (part.filename, part.content_type) {
                (Some(filename), content_type) => Part::File(UploadedFile {
                    name: part.name.clone(),
                    filename,
                    content_type,
                    data: part.data,
                }),
                (None, Some(content_type)) => Part::Value(parse_body(&content_type, &part.data)?),
                (None, None) => Part::Value(Body::Text(String::from_utf8_lossy(&part.data).into_owned())),
            };
            fields.insert(part.name, value);
        }

        req.set_body(Body::Multipart(fields));
        Ok(Flow::Next)
    })
}

fn raw_with_type(req: &Request) -> Option<(String, Bytes)> {
    let raw = req.raw()?.clone();
    let content_type = req.head().header(headers::CONTENT_TYPE)?.to_string();
    Some((content_type, raw))
}

/// Boundary parameter of a `multipart/*` content type
pub fn parse_boundary(content_type: &str) -> std::result::Result<String, MultipartError> {
    for param in content_type.split(';').skip(1) {
        let Some((key, value)) = param.trim().split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let boundary = value.trim().trim_matches('"');
            if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
                return Err(MultipartError::InvalidBoundary);
            }
            return Ok(boundary.to_string());
        }
    }
    Err(MultipartError::MissingBoundary)
}

#[derive(Debug)]
struct RawPart {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

fn split_parts(body: &Bytes, boundary: &str) -> std::result::Result<Vec<RawPart>, MultipartError> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut parts = Vec::new();

    let Some(mut pos) = find(body, &delimiter, 0) else {
        return Ok(parts);
    };

    loop {
        let after = pos + delimiter.len();
        if body.get(after..after + 2) == Some(b"--".as_slice()) {
            break;
        }
        if body.get(after..after + 2) != Some(b"\r\n".as_slice()) {
            return Err(MultipartError::Malformed("expected CRLF after boundary"));
        }
        let header_start = after + 2;
        let header_end = find(body, b"\r\n\r\n", header_start)
            .ok_or(MultipartError::Malformed("unterminated part headers"))?;

        let part_headers = parse_part_headers(&body[header_start..header_end]);
        let data_start = header_end + 4;
        let next = find(body, &delimiter, data_start)
            .ok_or(MultipartError::Malformed("missing closing boundary"))?;
        let data_end = if next >= data_start + 2 && &body[next - 2..next] == b"\r\n" {
            next - 2
        } else {
            next
        };

        let disposition = part_headers
            .get("content-disposition")
            .ok_or(MultipartError::Malformed("part without Content-Disposition"))?;
        let (name, filename) = parse_disposition(disposition)?;

        parts.push(RawPart {
            name,
            filename,
            content_type: part_headers.get(headers::CONTENT_TYPE).cloned(),
            data: body.slice(data_start..data_end),
        });
        pos = next;
    }

    Ok(parts)
}

fn parse_part_headers(block: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(block)
        .split("\r\n")
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

fn parse_disposition(value: &str) -> std::result::Result<(String, Option<String>), MultipartError> {
    let mut name = None;
    let mut filename = None;
    for param in value.split(';').skip(1) {
        let Some((key, raw)) = param.trim().split_once('=') else {
            continue;
        };
        let raw = raw.trim().trim_matches('"').to_string();
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(raw),
            "filename" => filename = Some(raw),
            _ => {}
        }
    }
    let name = name.filter(|n| !n.is_empty()).ok_or(MultipartError::MissingName)?;
    Ok((name, filename.filter(|f| !f.is_empty())))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|window| window == needle).map(|i| i + from)
}
