//! Parsed request bodies, as produced by the body parsers.

use std::collections::HashMap;

use bytes::Bytes;
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use serde_json::Value;

/// A request body after parsing
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Unparsed bytes (`application/octet-stream` and unknown types)
    Raw(Bytes),
    /// `text/*`
    Text(String),
    /// `application/json`, `text/json`
    Json(Value),
    /// `application/x-www-form-urlencoded`
    Form(HashMap<String, String>),
    /// `multipart/*`, keyed by part name
    Multipart(HashMap<String, Part>),
}

impl Body {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_form(&self) -> Option<&HashMap<String, String>> {
        match self {
            Body::Form(form) => Some(form),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&Bytes> {
        match self {
            Body::Raw(raw) => Some(raw),
            _ => None,
        }
    }

    pub fn as_multipart(&self) -> Option<&HashMap<String, Part>> {
        match self {
            Body::Multipart(parts) => Some(parts),
            _ => None,
        }
    }
}

impl Serialize for Body {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Body::Raw(bytes) => serializer.collect_seq(bytes.iter()),
            Body::Text(text) => serializer.serialize_str(text),
            Body::Json(value) => value.serialize(serializer),
            Body::Form(form) => form.serialize(serializer),
            Body::Multipart(parts) => parts.serialize(serializer),
        }
    }
}

/// One multipart field
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// A part with a filename, kept as-is
    File(UploadedFile),
    /// Any other part, parsed by its content type (text when it has none)
    Value(Body),
}

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Part::File(file) => file.serialize(serializer),
            Part::Value(body) => body.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub name: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

// File contents stay out of serialized output; only the metadata is echoed.
impl Serialize for UploadedFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("UploadedFile", 4)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("filename", &self.filename)?;
        state.serialize_field("type", &self.content_type)?;
        state.serialize_field("size", &self.data.len())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_serializes_naturally() {
        let body = Body::Json(json!({"hello": "world"}));
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"hello":"world"}"#);

        let body = Body::Text("hi".to_string());
        assert_eq!(serde_json::to_string(&body).unwrap(), r#""hi""#);

        let body = Body::Raw(Bytes::from_static(&[1, 2]));
        assert_eq!(serde_json::to_string(&body).unwrap(), "[1,2]");
    }

    #[test]
    fn test_uploaded_file_serializes_metadata_only() {
        let file = UploadedFile {
            name: "avatar".to_string(),
            filename: "me.png".to_string(),
            content_type: Some("image/png".to_string()),
            data: Bytes::from_static(b"\x89PNG"),
        };
        let value = serde_json::to_value(Part::File(file)).unwrap();
        assert_eq!(value["filename"], "me.png");
        assert_eq!(value["size"], 4);
        assert!(value.get("data").is_none());
    }
}
