//! User-Agent string sent with every playlist, key and segment request.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/hls-fetch";

/// Default User-Agent for all requests (identifies the tool as a load generator).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("hls-fetch/{version} (load-test; +{PROJECT_UA_URL})")
}
