//! Utility functions for the Down engine
//!
//! This module provides helper functions for URL validation, HTTP client
//! creation and human-readable formatting.

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Response;
use url::Url;

use crate::config::DownloadConfig;
use crate::error::{DownError, DownResult};

/// Schemes accepted by the URL validator
const SUPPORTED_SCHEMES: [&str; 3] = ["http", "https", "ftp"];

/// Creates an HTTP client with the specified configuration
pub(crate) fn create_client(config: &DownloadConfig) -> DownResult<reqwest::Client> {
    let mut headers = HeaderMap::new();

    // Set user agent
    if let Ok(value) = HeaderValue::from_str(&config.user_agent) {
        headers.insert(USER_AGENT, value);
    }

    let client = reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(config.connection_timeout)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        })
        .build()
        .map_err(DownError::HttpError)?;

    Ok(client)
}

/// Parses the Content-Length header from a response
pub(crate) fn parse_content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

const SIZE_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

fn format_bytes_with_unit(bytes: u64) -> (f64, usize) {
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    (size, unit_index)
}

/// Formats a size in bytes to a human-readable string
pub fn format_size(size: u64) -> String {
    let (size, unit_index) = format_bytes_with_unit(size);
    format!("{:.1} {}", size, SIZE_UNITS[unit_index])
}

/// Formats speed in bytes per second to a human-readable string
pub fn format_speed(speed: u64) -> String {
    let (speed, unit_index) = format_bytes_with_unit(speed);
    format!("{:.1} {}/s", speed, SIZE_UNITS[unit_index])
}

/// Formats a duration in seconds to a human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{} sec", seconds);
    }

    let minutes = seconds / 60;
    let seconds = seconds % 60;

    if minutes < 60 {
        return format!("{} min {} sec", minutes, seconds);
    }

    let hours = minutes / 60;
    let minutes = minutes % 60;

    format!("{} hr {} min", hours, minutes)
}

/// Returns true if `url` is an absolute http, https or ftp URL with a host.
///
/// Malformed input yields `false`; this never fails.
pub fn is_valid_url(url: &str) -> bool {
    validate_url(url).is_ok()
}

/// Validates a URL, returning the parsed form on success
pub fn validate_url(url: &str) -> DownResult<Url> {
    let text = url.trim();
    let url = Url::parse(text).map_err(|e| DownError::InvalidUrl(e.to_string()))?;

    if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
        return Err(DownError::InvalidUrl(format!(
            "Unsupported scheme: {}",
            url.scheme()
        )));
    }

    // The parser fills in a host for `http:example.com`; require a written `//` authority
    let has_authority = text
        .split_once(':')
        .is_some_and(|(_, rest)| rest.starts_with("//"));
    if !has_authority {
        return Err(DownError::InvalidUrl(format!("Missing host: {}", text)));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(DownError::InvalidUrl(format!("Missing host: {}", url))),
    }
}
