//! Listing identity keys.
//!
//! The marketplace decorates listing links with tracking query strings and
//! fragments, so the same ad shows up under several URLs. The canonical form
//! drops everything that does not identify the ad itself.

/// Reduces a listing URL to its identity key.
///
/// Cuts the query string, then the fragment, then any trailing slashes.
/// Returns `None` when nothing is left, in which case the listing has no
/// identity and must be dropped by the caller.
pub fn canonicalize(url: &str) -> Option<String> {
    let without_query = url.split('?').next().unwrap_or_default();
    let without_fragment = without_query.split('#').next().unwrap_or_default();
    let trimmed = without_fragment.trim().trim_end_matches('/');

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_query_fragment_and_slash() {
        assert_eq!(
            canonicalize("https://www.avito.ru/moskva/avtomobili/w124_123?context=abc#photos").as_deref(),
            Some("https://www.avito.ru/moskva/avtomobili/w124_123")
        );
        assert_eq!(canonicalize("https://x/1/").as_deref(), Some("https://x/1"));
        assert_eq!(canonicalize("https://x/1#top").as_deref(), Some("https://x/1"));
    }

    #[test]
    fn fragment_before_query_is_cut_at_fragment() {
        assert_eq!(canonicalize("https://x/1#a?b=2").as_deref(), Some("https://x/1"));
    }

    #[test]
    fn empty_input_has_no_identity() {
        assert_eq!(canonicalize(""), None);
        assert_eq!(canonicalize("?from=search"), None);
        assert_eq!(canonicalize("/"), None);
    }

    #[test]
    fn canonical_form_is_a_fixed_point() {
        let inputs = [
            "https://x/1?a=1",
            "https://x/1//",
            "https://x/1/?a=1#b",
            "https://x/2#frag/",
            "plain",
        ];
        for input in inputs {
            let once = canonicalize(input);
            let twice = once.as_deref().and_then(canonicalize);
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }
}
