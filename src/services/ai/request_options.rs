use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

use super::transport::TransportError;
use super::types::ChatRequestOptions;

pub(super) const REFERER_HEADER: &str = "HTTP-Referer";
pub(super) const TITLE_HEADER: &str = "X-Title";

fn is_disallowed_header(name: &str) -> bool {
    let lower = name.trim().to_ascii_lowercase();
    matches!(
        lower.as_str(),
        "authorization" | "proxy-authorization" | "x-api-key"
    )
}

fn build_header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut header_map = HeaderMap::new();
    for (key, value) in headers {
        if is_disallowed_header(key) {
            return Err(TransportError::invalid_request(format!(
                "Header not allowed in request options: {key}"
            )));
        }
        let name = HeaderName::from_bytes(key.trim().as_bytes())
            .map_err(|_| TransportError::invalid_request(format!("Invalid header name: {key}")))?;
        let val = HeaderValue::from_str(value).map_err(|_| {
            TransportError::invalid_request(format!("Invalid header value for {key}"))
        })?;
        header_map.insert(name, val);
    }
    Ok(header_map)
}

/// Attribution headers plus caller overrides. Overrides win on conflict.
pub(super) fn request_headers(
    referer: &str,
    title: &str,
    request_options: &ChatRequestOptions,
) -> Result<HeaderMap, TransportError> {
    let mut defaults = HashMap::new();
    if !referer.trim().is_empty() {
        defaults.insert(REFERER_HEADER.to_string(), referer.trim().to_string());
    }
    if !title.trim().is_empty() {
        defaults.insert(TITLE_HEADER.to_string(), title.trim().to_string());
    }
    let mut header_map = build_header_map(&defaults)?;

    if let Some(headers) = request_options.headers.as_ref() {
        for (name, value) in build_header_map(headers)? {
            if let Some(name) = name {
                header_map.insert(name, value);
            }
        }
    }

    Ok(header_map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_credential_headers() {
        let options = ChatRequestOptions {
            headers: Some(HashMap::from([(
                " Authorization ".to_string(),
                "Bearer nope".to_string(),
            )])),
        };
        assert!(matches!(
            request_headers("", "", &options),
            Err(TransportError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let options = ChatRequestOptions {
            headers: Some(HashMap::from([(
                "x-title".to_string(),
                "Custom".to_string(),
            )])),
        };
        let headers = request_headers("http://localhost", "Agent Studio", &options).unwrap();
        assert_eq!(headers.get("x-title").unwrap(), "Custom");
        assert_eq!(headers.get("http-referer").unwrap(), "http://localhost");
    }

    #[test]
    fn test_blank_defaults_are_omitted() {
        let headers = request_headers(" ", "", &ChatRequestOptions::default()).unwrap();
        assert!(headers.is_empty());
    }
}
