// Locating an OpenAPI document
// Swagger UI pages embed the spec location in their HTML; when nothing else works a
// handful of conventional paths are probed against the origin

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use crate::{QueryBridgeError, Result};

/// Paths probed, in order, when the given URL yields no spec
pub const COMMON_SPEC_PATHS: &[&str] = &[
    "/swagger.json",
    "/openapi.json",
    "/v3/api-docs",
    "/v2/api-docs",
    "/api-docs",
    "/swagger/v1/swagger.json",
    "/api/swagger.json",
];

const SPEC_URL_PATTERNS: &[&str] = &[
    r#"(?i)url\s*[=:]\s*["']([^"']+\.json)["']"#,
    r#"(?i)url\s*[=:]\s*["']([^"']+/api-docs[^"']*)["']"#,
    r#"(?i)url\s*[=:]\s*["']([^"']+openapi[^"']*)["']"#,
    r#"(?i)url\s*[=:]\s*["']([^"']+swagger[^"']*)["']"#,
    r#"(?i)spec-url\s*=\s*["']([^"']+)["']"#,
    r#"(?i)configUrl\s*[=:]\s*["']([^"']+)["']"#,
];

fn spec_url_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        SPEC_URL_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

/// Find the spec URL a Swagger UI page points at, resolved against `page_url`
pub fn extract_spec_url_from_html(html: &str, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;

    spec_url_patterns()
        .iter()
        .find_map(|pattern| pattern.captures(html))
        .and_then(|captures| captures.get(1))
        .and_then(|spec_path| base.join(spec_path.as_str()).ok())
        .map(|url| url.to_string())
}

/// Whether a body looks like an HTML page rather than a document
pub fn looks_like_html(content_type: &str, body: &str) -> bool {
    let head = body.trim_start();
    content_type.contains("text/html")
        || head.starts_with("<!")
        || head.get(..5).map_or(false, |tag| tag.eq_ignore_ascii_case("<html"))
}

/// `scheme://host[:port]` of a URL
pub fn origin_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| QueryBridgeError::Discovery(format!("Invalid URL '{}': {}", url, e)))?;
    match parsed.origin() {
        url::Origin::Tuple(..) => Ok(parsed.origin().ascii_serialization()),
        url::Origin::Opaque(_) => Err(QueryBridgeError::Discovery(format!(
            "URL '{}' has no usable origin",
            url
        ))),
    }
}

/// Candidate spec URLs under the origin of `url`
pub fn common_spec_urls(url: &str) -> Result<Vec<String>> {
    let origin = origin_of(url)?;
    Ok(COMMON_SPEC_PATHS
        .iter()
        .map(|path| format!("{}{}", origin, path))
        .collect())
}
