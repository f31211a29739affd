//! Normalization used for content identity and URL matching.

use unicode_normalization::UnicodeNormalization;
use url::Url;

/// NFKC, lowercase, keep alphanumerics only.
///
/// Fullwidth forms fold to ASCII first, and non-Latin letters are kept so that
/// titles in other scripts still produce distinct identities.
pub fn identity_text(s: &str) -> String {
    s.nfkc()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// URL with its query string (and anything after it) removed.
pub fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Lowercased `origin + path` without a trailing slash; used to match stored
/// records against the current page.
pub fn url_identity(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => {
            let origin = parsed.origin().ascii_serialization();
            let path = parsed.path().trim_end_matches('/');
            format!("{origin}{path}").to_lowercase()
        }
        _ => {
            let bare = strip_query(url);
            bare.split('#')
                .next()
                .unwrap_or(bare)
                .trim_end_matches('/')
                .to_lowercase()
        }
    }
}
