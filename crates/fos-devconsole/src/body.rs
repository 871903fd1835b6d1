//! Request bodies
//!
//! The shapes a page can hand to `fetch()` or `XMLHttpRequest.send()`, and
//! the capture policy that turns them into something inspectable.

use serde_json::{Map, Value};

/// Request body
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Plain string payload
    Text(String),
    /// Multipart form data
    Form(FormData),
    /// `application/x-www-form-urlencoded` parameters
    UrlEncoded(Vec<(String, String)>),
    /// Binary large object
    Blob(Blob),
    /// Already-structured value, captured as-is
    Other(Value),
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// FormData value
#[derive(Debug, Clone, PartialEq)]
pub enum FormDataValue {
    Text(String),
    File { name: String, content: Vec<u8>, content_type: String },
}

/// FormData object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    entries: Vec<(String, FormDataValue)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), FormDataValue::Text(value.to_string())));
    }

    pub fn append_file(&mut self, name: &str, filename: &str, content: Vec<u8>, content_type: &str) {
        self.entries.push((name.to_string(), FormDataValue::File {
            name: filename.to_string(),
            content,
            content_type: content_type.to_string(),
        }));
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &FormDataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Blob - raw binary data with a MIME type
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    data: Vec<u8>,
    mime_type: String,
}

impl Blob {
    pub fn new(data: Vec<u8>, mime_type: &str) -> Self {
        Self { data, mime_type: mime_type.to_string() }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

/// Capture a request body for display. Never fails.
pub fn parse_body(body: Option<&RequestBody>) -> Value {
    let Some(body) = body else {
        return Value::Null;
    };
    match body {
        RequestBody::Text(text) if text.is_empty() => Value::Null,
        RequestBody::Text(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone())),
        RequestBody::Form(form) => {
            let mut map = Map::new();
            for (key, value) in form.entries() {
                let captured = match value {
                    FormDataValue::Text(text) => text.clone(),
                    FormDataValue::File { name, content, .. } => {
                        format!("[File: {} ({}b)]", name, content.len())
                    }
                };
                map.insert(key.to_string(), Value::String(captured));
            }
            Value::Object(map)
        }
        RequestBody::UrlEncoded(pairs) => Value::Object(
            pairs.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        ),
        RequestBody::Blob(blob) => Value::String(format!("[Blob: {}, {} bytes]", blob.mime_type, blob.size())),
        RequestBody::Other(value) => value.clone(),
    }
}

/// Parse a URL-encoded query or form string into pairs
pub fn parse_urlencoded(input: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_body() {
        assert_eq!(parse_body(None), Value::Null);
        assert_eq!(parse_body(Some(&RequestBody::from(""))), Value::Null);
    }

    #[test]
    fn test_json_and_raw_text() {
        assert_eq!(parse_body(Some(&RequestBody::from(r#"{"x":1}"#))), json!({"x": 1}));
        assert_eq!(parse_body(Some(&RequestBody::from("plain"))), json!("plain"));
    }

    #[test]
    fn test_form_data_with_file() {
        let mut form = FormData::new();
        form.append_file("file", "test.txt", b"content".to_vec(), "text/plain");
        form.append("field", "value");

        let captured = parse_body(Some(&RequestBody::Form(form)));
        assert_eq!(captured["field"], "value");
        assert_eq!(captured["file"], "[File: test.txt (7b)]");
    }

    #[test]
    fn test_urlencoded() {
        let body = RequestBody::UrlEncoded(parse_urlencoded("q=search&page=2"));
        assert_eq!(parse_body(Some(&body)), json!({"q": "search", "page": "2"}));
    }

    #[test]
    fn test_blob_placeholder() {
        let body = RequestBody::Blob(Blob::new(vec![0; 16], "image/png"));
        assert_eq!(parse_body(Some(&body)), json!("[Blob: image/png, 16 bytes]"));
    }

    #[test]
    fn test_other_passthrough() {
        let body = RequestBody::Other(json!([1, 2, 3]));
        assert_eq!(parse_body(Some(&body)), json!([1, 2, 3]));
    }
}
