use std::net::IpAddr;

/// Returns true if `token` (ignoring surrounding whitespace) is a
/// well-formed IPv4 or IPv6 address.
pub fn is_valid_address(token: &str) -> bool {
    token.trim().parse::<IpAddr>().is_ok()
}
