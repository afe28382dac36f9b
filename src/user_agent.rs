//! Default User-Agent for page, API and media requests.
//!
//! Configuration may override it; this is the value used when nothing is set.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/blogfetch";

/// Default User-Agent (identifies the tool and its version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("blogfetch/{version} (media-archiver; +{PROJECT_UA_URL})")
}
