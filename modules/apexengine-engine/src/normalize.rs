//! Canonical comparison keys for deduplication. Pure and total: empty input
//! maps to the empty string, which never matches any key set.

/// Normalize a URL for comparison: lowercase, strip the scheme, strip a
/// leading `www.`, strip one trailing slash, trim.
pub fn normalize_url(url: &str) -> String {
    let mut s = url.trim().to_lowercase();
    // Strip to a fixpoint so normalization is idempotent even on degenerate
    // inputs like "https://https://x" or "www.www.x".
    loop {
        let before = s.len();
        for prefix in ["https://", "http://", "www."] {
            if let Some(rest) = s.strip_prefix(prefix) {
                s = rest.to_string();
            }
        }
        if s.len() == before {
            break;
        }
    }
    s.trim_end_matches('/').trim().to_string()
}

/// Normalize a company name for comparison: lowercase, trim, collapse
/// internal whitespace runs to one space.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_strips_scheme_www_and_trailing_slash() {
        assert_eq!(normalize_url("https://www.Acme.com/"), "acme.com");
        assert_eq!(normalize_url("http://acme.com"), "acme.com");
        assert_eq!(normalize_url("acme.com/"), "acme.com");
        assert_eq!(normalize_url("  WWW.acme.com  "), "acme.com");
    }

    #[test]
    fn url_keeps_paths() {
        assert_eq!(
            normalize_url("https://linkedin.com/in/juan-garcia/"),
            "linkedin.com/in/juan-garcia"
        );
    }

    #[test]
    fn url_empty_stays_empty() {
        assert_eq!(normalize_url(""), "");
        assert_eq!(normalize_url("   "), "");
    }

    #[test]
    fn url_normalization_is_idempotent() {
        for input in [
            "https://www.Acme.com/",
            "HTTP://WWW.EXAMPLE.ES/path/",
            "",
            "weird www.string//",
            "ftp://other.scheme/",
            "https://https://doubled.com",
            "www.www.doubled.com",
        ] {
            let once = normalize_url(input);
            assert_eq!(normalize_url(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn name_lowercases_and_collapses_whitespace() {
        assert_eq!(normalize_name("  Inmobiliaria   Del  Sur "), "inmobiliaria del sur");
        assert_eq!(normalize_name("ACME"), "acme");
    }

    #[test]
    fn name_normalization_is_idempotent() {
        for input in ["  Acme   Corp ", "", "a\tb\nc", "Ñoño  S.L."] {
            let once = normalize_name(input);
            assert_eq!(normalize_name(&once), once, "input: {input:?}");
        }
    }
}
