//! Environment variable configuration
//!
//! Every getter reads its variable on each call and falls back to the default when the
//! variable is unset, blank or invalid.

use std::env;
use std::str::FromStr;

use super::{
    DEFAULT_API_PORT, DEFAULT_DATA_DIR, DEFAULT_HTTP_TIMEOUT_SECONDS, DEFAULT_NUM_PREDICT,
    DEFAULT_OLLAMA_HOST, DEFAULT_OLLAMA_PORT, DEFAULT_RUNS_PER_TEST,
};

fn non_blank(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn positive<T: FromStr + PartialOrd + Default>(name: &str) -> Option<T> {
    non_blank(name)
        .and_then(|v| T::from_str(&v).ok())
        .filter(|v| *v > T::default())
}

/// Parses a TCP port, accepting only `1..=65535`.
pub fn parse_port(text: &str) -> Option<u16> {
    text.trim().parse::<u16>().ok().filter(|p| *p > 0)
}

/// Combines a host (with or without scheme, with or without port) and an optional
/// port override into `scheme://host:port`.
pub fn build_ollama_url(host: &str, port: Option<&str>) -> String {
    let host = host.trim();
    let host = if host.is_empty() {
        DEFAULT_OLLAMA_HOST
    } else {
        host
    };
    let (scheme, rest) = match host.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => ("http".to_string(), host),
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit('@').next().unwrap_or(authority);
    let (hostname, host_port) = split_authority(authority);
    let hostname = if hostname.is_empty() {
        "127.0.0.1"
    } else {
        hostname
    };
    let port = port
        .and_then(parse_port)
        .or(host_port)
        .unwrap_or(DEFAULT_OLLAMA_PORT);
    format!("{scheme}://{hostname}:{port}")
}

fn split_authority(authority: &str) -> (&str, Option<u16>) {
    if authority.starts_with('[') {
        if let Some(end) = authority.find(']') {
            let host = &authority[..=end];
            let port = authority[end + 1..]
                .strip_prefix(':')
                .and_then(parse_port);
            return (host, port);
        }
        return (authority, None);
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => (host, parse_port(port)),
        None => (authority, None),
    }
}

/// Inference daemon location and call settings
pub mod ollama {
    use super::*;

    /// Get the raw host from `OLLAMA_HOST` or use the default
    pub fn host() -> String {
        non_blank("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string())
    }

    /// Get the port override from `OLLAMA_PORT`, if valid
    pub fn port() -> Option<u16> {
        non_blank("OLLAMA_PORT").and_then(|p| parse_port(&p))
    }

    /// Get the daemon base URL built from host and port
    pub fn url() -> String {
        let port = port().map(|p| p.to_string());
        build_ollama_url(&host(), port.as_deref())
    }

    /// Get the per-call generation budget
    pub fn num_predict() -> u32 {
        positive("OBENCH_NUM_PREDICT").unwrap_or(DEFAULT_NUM_PREDICT)
    }

    /// Get the HTTP request timeout in seconds
    pub fn http_timeout_seconds() -> u64 {
        positive("OBENCH_HTTP_TIMEOUT_SECONDS").unwrap_or(DEFAULT_HTTP_TIMEOUT_SECONDS)
    }
}

/// Benchmark run settings
pub mod runs {
    use super::*;

    /// Get how many times each case is repeated
    pub fn runs_per_test() -> u32 {
        positive("OBENCH_RUNS_PER_TEST").unwrap_or(DEFAULT_RUNS_PER_TEST)
    }

    /// Get the run name used to pick a separate results file
    pub fn run_name() -> Option<String> {
        non_blank("OBENCH_RUN_NAME")
    }
}

/// Result storage settings
pub mod storage {
    use super::*;

    /// Get the directory holding results files
    pub fn data_dir() -> String {
        non_blank("OBENCH_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
    }
}

/// HTTP API settings
pub mod api {
    use super::*;

    /// Get the API listen port from `PORT`
    pub fn port() -> u16 {
        non_blank("PORT")
            .and_then(|p| parse_port(&p))
            .unwrap_or(DEFAULT_API_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", None, "http://127.0.0.1:11434")]
    #[case("localhost", None, "http://localhost:11434")]
    #[case("http://gpu-box:11500", None, "http://gpu-box:11500")]
    #[case("http://gpu-box:11500", Some("9000"), "http://gpu-box:9000")]
    #[case("HTTPS://gpu-box/", None, "https://gpu-box:11434")]
    #[case("gpu-box", Some("not-a-port"), "http://gpu-box:11434")]
    #[case("[::1]:8080", None, "http://[::1]:8080")]
    fn test_build_ollama_url(
        #[case] host: &str,
        #[case] port: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(build_ollama_url(host, port), expected);
    }

    #[rstest]
    #[case("1", Some(1))]
    #[case("65535", Some(65535))]
    #[case("0", None)]
    #[case("65536", None)]
    #[case("-1", None)]
    #[case("abc", None)]
    fn test_parse_port(#[case] text: &str, #[case] expected: Option<u16>) {
        assert_eq!(parse_port(text), expected);
    }
}
