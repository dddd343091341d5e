//! Shared User-Agent string for every outbound HTTP client.
//!
//! Crossref asks API users to identify their tool. The extraction, embedding
//! and feed clients send the same header.

/// Project URL for User-Agent identification (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/alertminer/alertminer";

/// Default User-Agent for all service requests.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("alertminer/{version} (research-tool; +{PROJECT_UA_URL})")
}
