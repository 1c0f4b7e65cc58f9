// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Auth header construction for requests to the remote command-center
// server.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

const API_KEY_HEADER: &str = "X-API-Key";

/// If `api_key` already looks like a bearer token (case-insensitive
/// "bearer " prefix), forward it verbatim as `Authorization`. Otherwise
/// send it both as `X-API-Key` and as `Authorization: Bearer <key>`, since
/// different server deployments expect one or the other.
pub fn auth_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if api_key.len() >= 7 && api_key[..7].eq_ignore_ascii_case("bearer ") {
        if let Ok(v) = HeaderValue::from_str(api_key) {
            headers.insert(AUTHORIZATION, v);
        }
        return headers;
    }

    if let Ok(v) = HeaderValue::from_str(api_key) {
        headers.insert(API_KEY_HEADER, v);
    }
    if let Ok(v) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, v);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefixed_key_is_sent_verbatim() {
        let headers = auth_headers("Bearer abc123");
        assert_eq!(
            headers.get(AUTHORIZATION).unwrap(),
            "Bearer abc123"
        );
        assert!(headers.get(API_KEY_HEADER).is_none());
    }

    #[test]
    fn bearer_prefix_is_case_insensitive() {
        let headers = auth_headers("BEARER xyz");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "BEARER xyz");
    }

    #[test]
    fn plain_key_is_sent_both_ways() {
        let headers = auth_headers("sk-plain-key");
        assert_eq!(headers.get(API_KEY_HEADER).unwrap(), "sk-plain-key");
        assert_eq!(
            headers.get(AUTHORIZATION).unwrap(),
            "Bearer sk-plain-key"
        );
    }
}
