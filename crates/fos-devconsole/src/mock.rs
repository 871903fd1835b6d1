//! Mock engine
//!
//! User-defined rules that short-circuit matching requests with a synthetic
//! response. Rules are evaluated in insertion order; the first active match
//! wins.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::host::fetch::{HeaderMap, Headers, Response};

/// Header stamped on every synthetic response
pub const MOCK_MARKER_HEADER: &str = "x-mocked-by";

/// Value of [`MOCK_MARKER_HEADER`]
pub const MOCK_MARKER: &str = "fos-devconsole";

/// Method value that matches any verb
pub const ANY_METHOD: &str = "*";

/// Mock rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockRule {
    pub id: String,
    pub active: bool,
    /// Verb or `*`
    pub method: String,
    /// Exact (case-sensitive) substring of the request URL
    pub url_pattern: String,
    pub status: u16,
    /// Serialized payload, usually JSON
    pub response_body: String,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

impl MockRule {
    /// An active rule with no delay
    pub fn new(id: &str, method: &str, url_pattern: &str, status: u16, response_body: &str) -> Self {
        Self {
            id: id.to_string(),
            active: true,
            method: method.to_string(),
            url_pattern: url_pattern.to_string(),
            status,
            response_body: response_body.to_string(),
            delay_ms: None,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether this rule applies to a request
    pub fn matches(&self, method: &str, url: &str) -> bool {
        self.active
            && (self.method == ANY_METHOD || self.method.eq_ignore_ascii_case(method))
            && url.contains(&self.url_pattern)
    }

    /// Headers of the synthetic response
    pub fn response_headers(&self) -> Headers {
        Headers::new()
            .with("content-type", "application/json")
            .with(MOCK_MARKER_HEADER, MOCK_MARKER)
    }

    /// Synthetic fetch response
    pub fn to_response(&self) -> Response {
        Response::new(self.status, self.response_headers(), self.response_body.as_bytes())
    }

    /// Response headers as recorded in the store
    pub fn recorded_headers(&self) -> HeaderMap {
        self.response_headers().to_map()
    }

    /// Response body as recorded in the store: JSON if it parses, else raw
    pub fn recorded_body(&self) -> Value {
        serde_json::from_str(&self.response_body)
            .unwrap_or_else(|_| Value::String(self.response_body.clone()))
    }
}

/// Partial update for a mock rule
#[derive(Debug, Clone, Default)]
pub struct MockUpdate {
    pub active: Option<bool>,
    pub method: Option<String>,
    pub url_pattern: Option<String>,
    pub status: Option<u16>,
    pub response_body: Option<String>,
    pub delay_ms: Option<Option<u64>>,
}

impl MockUpdate {
    pub(crate) fn apply(self, rule: &mut MockRule) {
        if let Some(active) = self.active {
            rule.active = active;
        }
        if let Some(method) = self.method {
            rule.method = method;
        }
        if let Some(pattern) = self.url_pattern {
            rule.url_pattern = pattern;
        }
        if let Some(status) = self.status {
            rule.status = status;
        }
        if let Some(body) = self.response_body {
            rule.response_body = body;
        }
        if let Some(delay) = self.delay_ms {
            rule.delay_ms = delay;
        }
    }
}

/// First active rule, in insertion order, matching `method` and `url`
pub fn find_match<'a>(rules: &'a [MockRule], method: &str, url: &str) -> Option<&'a MockRule> {
    rules.iter().find(|rule| rule.matches(method, url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let rules = vec![
            MockRule::new("1", "GET", "/api", 200, "{}"),
            MockRule::new("2", "GET", "/api/users", 404, "{}"),
        ];
        assert_eq!(find_match(&rules, "GET", "/api/users/5").unwrap().id, "1");
    }

    #[test]
    fn test_inactive_rules_skipped() {
        let rules = vec![
            MockRule::new("1", "GET", "/api", 200, "{}").inactive(),
            MockRule::new("2", "*", "/api", 500, "{}"),
        ];
        assert_eq!(find_match(&rules, "DELETE", "/api/x").unwrap().id, "2");
    }

    #[test]
    fn test_method_case_insensitive_url_case_sensitive() {
        let rules = vec![MockRule::new("1", "post", "/Api", 201, "{}")];
        assert!(find_match(&rules, "POST", "/Api/items").is_some());
        assert!(find_match(&rules, "POST", "/api/items").is_none());
        assert!(find_match(&rules, "GET", "/Api/items").is_none());
    }

    #[test]
    fn test_no_rules() {
        assert!(find_match(&[], "GET", "/").is_none());
    }

    #[test]
    fn test_synthetic_response() {
        let rule = MockRule::new("1", "GET", "/x", 418, r#"{"teapot":true}"#);
        let res = rule.to_response();
        assert_eq!(res.status(), 418);
        assert_eq!(res.headers().get("X-Mocked-By"), Some(MOCK_MARKER));
        assert_eq!(rule.recorded_body()["teapot"], true);

        let raw = MockRule::new("2", "GET", "/y", 200, "not json");
        assert_eq!(raw.recorded_body(), Value::String("not json".into()));
    }

    #[test]
    fn test_rule_from_json() {
        let rule: MockRule = serde_json::from_str(
            r#"{"id":"1","active":true,"method":"GET","urlPattern":"/api/users","status":404,"responseBody":"{}"}"#,
        ).unwrap();
        assert_eq!(rule.url_pattern, "/api/users");
        assert_eq!(rule.delay_ms, None);
    }
}
