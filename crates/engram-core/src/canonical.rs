//! Canonicalization of captured content.
//!
//! Raw text is normalized into a comparable form and hashed; the hash is
//! the identity used for exact-duplicate detection and queue-level dedup.
//! Everything here is pure: identical (text, bound) input always yields
//! identical output.

use sha2::{Digest, Sha256};

use crate::defaults::CANONICAL_MAX_LEN;

/// Normalized text plus its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalContent {
    pub canonical_text: String,
    /// Hex-encoded SHA-256 of the canonical text.
    pub canonical_hash: String,
}

/// Normalize raw text into canonical form.
///
/// Lowercases, replaces punctuation with spaces, collapses whitespace
/// runs, then truncates to `max_len` characters on a whole-token
/// boundary where possible. Idempotent: normalizing canonical text is
/// a no-op.
pub fn normalize_text(raw: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(raw.len().min(max_len));
    let mut emitted = 0usize;
    let mut last_was_space = true;

    for c in raw.chars() {
        if emitted >= max_len {
            break;
        }
        if c.is_alphanumeric() {
            out.push(c.to_lowercase().next().unwrap_or(c));
            emitted += 1;
            last_was_space = false;
        } else if !last_was_space {
            // Whitespace, punctuation, and symbols all collapse to one
            // separator.
            out.push(' ');
            emitted += 1;
            last_was_space = true;
        }
    }

    let trimmed = out.trim_end();
    if trimmed.len() != out.len() {
        trimmed.to_string()
    } else {
        out
    }
}

/// Canonicalize raw text with the default length bound.
pub fn canonicalize(raw: &str) -> CanonicalContent {
    canonicalize_bounded(raw, CANONICAL_MAX_LEN)
}

/// Canonicalize raw text, truncating the normalized form to `max_len`.
pub fn canonicalize_bounded(raw: &str, max_len: usize) -> CanonicalContent {
    let canonical_text = normalize_text(raw, max_len);
    let canonical_hash = content_hash(&canonical_text);
    CanonicalContent {
        canonical_text,
        canonical_hash,
    }
}

/// Hex-encoded SHA-256 over the given text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalize a URL for queue-level comparison.
///
/// Lowercases scheme and host, drops default ports, fragments, and
/// trailing slashes; the query string is preserved because it often
/// selects distinct content. Returns `None` for strings with no
/// recognizable scheme+host shape.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let (scheme, rest) = raw.split_once("://")?;
    let scheme = scheme.to_lowercase();
    if scheme.is_empty() || rest.is_empty() {
        return None;
    }

    let (host_port, path_query) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    if host_port.is_empty() {
        return None;
    }

    let host_port = host_port.to_lowercase();
    let host = match (scheme.as_str(), host_port.rsplit_once(':')) {
        ("http", Some((h, "80"))) | ("https", Some((h, "443"))) => h.to_string(),
        _ => host_port,
    };

    // Drop the fragment, keep the query.
    let path_query = match path_query.split_once('#') {
        Some((before, _)) => before,
        None => path_query,
    };
    let path_query = path_query.trim_end_matches('/');

    Some(format!("{}://{}{}", scheme, host, path_query))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_strips_punctuation() {
        assert_eq!(
            normalize_text("Hello, World! It's Rust.", 1000),
            "hello world it s rust"
        );
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_text("a\t\tb\n\n  c", 1000), "a b c");
    }

    #[test]
    fn test_normalize_idempotent() {
        let raw = "  The QUICK, brown fox --- jumps!  ";
        let once = normalize_text(raw, 1000);
        let twice = normalize_text(&once, 1000);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_canonicalize_idempotent_and_stable() {
        let raw = "Some Captured   Page, with Punctuation!";
        let first = canonicalize(raw);
        let again = canonicalize(raw);
        assert_eq!(first, again);

        // Re-canonicalizing the canonical text yields the same hash.
        let rehashed = canonicalize(&first.canonical_text);
        assert_eq!(first.canonical_hash, rehashed.canonical_hash);
    }

    #[test]
    fn test_canonicalize_distinguishes_content() {
        let a = canonicalize("completely different text");
        let b = canonicalize("another capture entirely");
        assert_ne!(a.canonical_hash, b.canonical_hash);
    }

    #[test]
    fn test_canonicalize_bounded_truncates() {
        let raw = "word ".repeat(10_000);
        let canonical = canonicalize_bounded(&raw, 100);
        assert!(canonical.canonical_text.chars().count() <= 100);
    }

    #[test]
    fn test_truncation_is_part_of_identity() {
        let raw = "word ".repeat(10_000);
        let short = canonicalize_bounded(&raw, 100);
        let long = canonicalize_bounded(&raw, 200);
        assert_ne!(short.canonical_hash, long.canonical_hash);
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let c = canonicalize("abc");
        assert_eq!(c.canonical_hash.len(), 64);
        assert!(c.canonical_hash.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_normalize_url_basic() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM/Path/"),
            Some("https://example.com/Path".to_string())
        );
    }

    #[test]
    fn test_normalize_url_default_ports() {
        assert_eq!(
            normalize_url("http://example.com:80/a"),
            Some("http://example.com/a".to_string())
        );
        assert_eq!(
            normalize_url("https://example.com:443/a"),
            Some("https://example.com/a".to_string())
        );
        // Non-default ports are kept.
        assert_eq!(
            normalize_url("http://example.com:8080/a"),
            Some("http://example.com:8080/a".to_string())
        );
    }

    #[test]
    fn test_normalize_url_drops_fragment_keeps_query() {
        assert_eq!(
            normalize_url("https://example.com/page?q=rust#section-2"),
            Some("https://example.com/page?q=rust".to_string())
        );
    }

    #[test]
    fn test_normalize_url_rejects_garbage() {
        assert_eq!(normalize_url("not a url"), None);
        assert_eq!(normalize_url(""), None);
        assert_eq!(normalize_url("://missing-scheme"), None);
    }

    #[test]
    fn test_same_page_urls_compare_equal() {
        let a = normalize_url("https://Example.com/article/");
        let b = normalize_url("https://example.com:443/article#top");
        assert_eq!(a, b);
    }
}
