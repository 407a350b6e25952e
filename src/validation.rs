use std::net::SocketAddr;
use std::ops::RangeInclusive;

/// Validates if a given string is a resolvable `host:port` socket address.
///
/// # Arguments
///
/// * `addr` - The string to validate.
///
/// # Returns
///
/// * `Ok(())` if the address is valid.
/// * `Err(&'static str)` if the address is invalid.
pub fn is_valid_socket_addr(addr: &str) -> Result<(), &'static str> {
    if addr.parse::<SocketAddr>().is_ok() {
        return Ok(());
    }
    // Hostnames cannot be parsed offline; accept any non-empty host with a
    // valid port suffix.
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => port
            .parse::<u16>()
            .ok()
            .filter(|p| *p > 0)
            .map(|_| ())
            .ok_or("Port must be a number between 1 and 65535"),
        _ => Err("Address must be in host:port form"),
    }
}

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates if a given string is not empty.
///
/// # Arguments
///
/// * `value` - The string to validate.
///
/// # Returns
///
/// * `Ok(())` if the string is not empty.
/// * `Err(&'static str)` if the string is empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_addr_accepts_ip_and_hostname_forms() {
        assert!(is_valid_socket_addr("127.0.0.1:7777").is_ok());
        assert!(is_valid_socket_addr("trainer.local:9000").is_ok());
        assert!(is_valid_socket_addr("[::1]:7777").is_ok());
    }

    #[test]
    fn socket_addr_rejects_malformed_forms() {
        assert!(is_valid_socket_addr("no-port").is_err());
        assert!(is_valid_socket_addr(":7777").is_err());
        assert!(is_valid_socket_addr("host:0").is_err());
        assert!(is_valid_socket_addr("host:notaport").is_err());
    }

    #[test]
    fn range_and_emptiness_checks() {
        assert!(is_in_range(5, 2..=10).is_ok());
        assert!(is_in_range(1, 2..=10).is_err());
        assert!(is_not_empty("models").is_ok());
        assert!(is_not_empty("").is_err());
    }
}
