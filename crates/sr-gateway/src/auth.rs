//! Bearer-token request authentication.

/// Check an `Authorization` header against an optionally-configured token.
///
/// With no token configured, every request passes. With one configured,
/// the header must be exactly `Bearer <token>`.
pub fn bearer_token_matches(expected: Option<&str>, header: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let Some(header) = header else {
        return false;
    };
    match header.strip_prefix("Bearer ") {
        Some(presented) => presented == expected,
        None => false,
    }
}
