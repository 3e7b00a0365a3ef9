use std::collections::HashMap;

use axum::http::HeaderMap;
use axum::http::Uri;

/// Transport details handed to services as params.
#[derive(Debug, Clone, Default)]
pub struct RestParams {
    pub provider: String,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub method: String,
    pub path: String,
    pub raw_query: Option<String>,
}

impl RestParams {
    pub fn from_parts(
        provider: &str,
        headers: &HeaderMap,
        query: HashMap<String, String>,
        method: &str,
        uri: &Uri,
    ) -> Self {
        let mut out = Self {
            provider: provider.to_string(),
            headers: HashMap::new(),
            query,
            method: method.to_string(),
            path: uri.path().to_string(),
            raw_query: uri.query().map(|s| s.to_string()),
        };

        for (k, v) in headers.iter() {
            if let Ok(s) = v.to_str() {
                out.headers.insert(k.to_string(), s.to_string());
            }
        }

        out
    }

    /// Internal calls (hooks, listeners) that did not come over HTTP.
    pub fn internal() -> Self {
        Self {
            provider: "internal".to_string(),
            ..Self::default()
        }
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// `?flag=true` or `?flag=1`.
    pub fn query_flag(&self, key: &str) -> bool {
        matches!(self.query_value(key), Some("true") | Some("1"))
    }

    /// `?expand=a,b` contains `name`.
    pub fn expands(&self, name: &str) -> bool {
        self.query_value("expand")
            .map(|v| v.split(',').map(|s| s.trim()).any(|s| s == name))
            .unwrap_or(false)
    }
}

pub trait FromRestParams: Sized {
    fn from_rest_params(params: RestParams) -> Self;
}

impl FromRestParams for RestParams {
    fn from_rest_params(params: RestParams) -> Self {
        params
    }
}

impl FromRestParams for () {
    fn from_rest_params(_params: RestParams) -> Self {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_helpers() {
        let mut params = RestParams::internal();
        params.query.insert("unassigned".into(), "1".into());
        params.query.insert("expand".into(), "agent, leads".into());
        params.query.insert("agent_id".into(), "  ".into());

        assert!(params.query_flag("unassigned"));
        assert!(!params.query_flag("missing"));
        assert!(params.expands("leads"));
        assert!(!params.expands("category"));
        assert_eq!(params.query_value("agent_id"), None);
    }
}
