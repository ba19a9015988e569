//! String/URL canonicalization helpers.
//!
//! Used wherever the spec requires comparing two URLs or identifiers for
//! semantic rather than textual equality: issuer identifiers (§4.2),
//! DPoP `htu` (§4.7, §9 open question (b)).

/// Canonicalize an issuer/authorization-server identifier for comparison:
/// strip a single trailing slash, lowercase the scheme and host, leave the
/// path case untouched.
#[must_use]
pub fn canonicalize_issuer(url: &str) -> String {
    let trimmed = url.strip_suffix('/').unwrap_or(url);
    lowercase_scheme_host(trimmed)
}

/// `true` if two issuer identifiers are the same after canonicalization.
#[must_use]
pub fn issuer_eq(a: &str, b: &str) -> bool {
    canonicalize_issuer(a) == canonicalize_issuer(b)
}

/// Canonicalize a request URL into the DPoP `htu` form: scheme and host
/// lowercased, query and fragment stripped, trailing slash removed unless
/// the path is just `/`.
#[must_use]
pub fn canonicalize_htu(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    let lowered = lowercase_scheme_host(without_query);

    if let Some((prefix, path)) = split_authority(&lowered) {
        if path.len() > 1 && path.ends_with('/') {
            return format!("{prefix}{}", &path[..path.len() - 1]);
        }
    }
    lowered
}

/// Lowercase the `scheme://host` portion of a URL, leaving the path, query,
/// and fragment untouched.
fn lowercase_scheme_host(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let (scheme, rest) = url.split_at(scheme_end);
    let rest = &rest[3..];
    let host_end = rest.find('/').unwrap_or(rest.len());
    let (host, tail) = rest.split_at(host_end);
    format!("{}://{}{}", scheme.to_lowercase(), host.to_lowercase(), tail)
}

/// Split a URL into `(scheme://host, path-and-rest)`.
fn split_authority(url: &str) -> Option<(&str, &str)> {
    let scheme_end = url.find("://")?;
    let rest = &url[scheme_end + 3..];
    let host_end = rest.find('/').unwrap_or(rest.len());
    let prefix_len = scheme_end + 3 + host_end;
    Some((&url[..prefix_len], &url[prefix_len..]))
}

/// Constant-time byte-slice comparison, used wherever the spec requires it
/// (§5): pre-authorized code, tx_code, PKCE challenge recomputation, `jti`
/// lookups.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuer_trailing_slash_and_case() {
        assert!(issuer_eq("HTTPS://Issuer.Example.com/", "https://issuer.example.com"));
        assert!(!issuer_eq("https://issuer.example.com/path", "https://issuer.example.com"));
    }

    #[test]
    fn htu_strips_query_and_fragment() {
        assert_eq!(
            canonicalize_htu("HTTPS://AS.Example.com/Token?foo=bar#frag"),
            "https://as.example.com/Token"
        );
    }

    #[test]
    fn htu_strips_trailing_slash_except_root() {
        assert_eq!(canonicalize_htu("https://as.example.com/token/"), "https://as.example.com/token");
        assert_eq!(canonicalize_htu("https://as.example.com/"), "https://as.example.com/");
    }
}
