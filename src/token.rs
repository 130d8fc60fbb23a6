// (c) 2026 rupd contributors

//! Connection tokens
//!
//! A client proves that it knows which connection it is speaking on by sending a token
//! derived from its own end of that connection: the local address and port, joined by `:`,
//! passed through a fixed character substitution, then base64 encoded.
//!
//! The substitution swaps pairs of characters, so applying it twice is the identity.
//! This is an obfuscation, not a security mechanism.

use std::net::SocketAddr;

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Character pairs swapped by the substitution
const SUBSTITUTIONS: [(char, char); 15] = [
    ('0', 'r'),
    ('1', 'e'),
    ('2', 'n'),
    ('3', 'd'),
    ('4', 's'),
    ('5', 'h'),
    ('6', 'a'),
    ('7', 'i'),
    ('8', 'o'),
    ('9', 'u'),
    ('.', 'P'),
    (':', 'S'),
    ('-', 'T'),
    ('/', 'L'),
    (' ', 'D'),
];

const SEPARATOR: char = ':';

/// Reasons a token could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Not valid base64
    #[error("token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Decoded to something other than UTF-8
    #[error("token is not valid text")]
    Utf8(#[from] std::string::FromUtf8Error),
    /// No address/port separator present
    #[error("token has no address/port separator")]
    MissingSeparator,
    /// Port part did not decode to a port number
    #[error("token port is not valid: {0}")]
    Port(#[from] std::num::ParseIntError),
}

fn substitute(c: char) -> char {
    for &(a, b) in &SUBSTITUTIONS {
        if c == a {
            return b;
        }
        if c == b {
            return a;
        }
    }
    c
}

fn transform(text: &str) -> String {
    text.chars().map(substitute).collect()
}

/// Builds the token for a given address and port
#[must_use]
pub fn encode(address: &str, port: u16) -> String {
    let plain = format!(
        "{}{SEPARATOR}{}",
        transform(address),
        transform(&port.to_string())
    );
    STANDARD.encode(plain)
}

/// Builds the token for a socket address
#[must_use]
pub fn encode_socket(addr: SocketAddr) -> String {
    encode(&addr.ip().to_string(), addr.port())
}

/// Recovers the address and port from a token.
///
/// The port is taken from after the last separator, so addresses which themselves
/// contain the separator (IPv6) survive the trip.
pub fn decode(token: &str) -> Result<(String, u16), TokenError> {
    let plain = String::from_utf8(STANDARD.decode(token.trim())?)?;
    let (address, port) = plain
        .rsplit_once(SEPARATOR)
        .ok_or(TokenError::MissingSeparator)?;
    Ok((transform(address), transform(port).parse()?))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{decode, encode, encode_socket, transform, TokenError};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn known_vector() {
        let token = encode("192.168.0.72", 21911);
        assert_eq!(token, "ZXVuUGVhb1ByUGluOm5ldWVl");
        let plain = String::from_utf8(STANDARD.decode(&token).unwrap()).unwrap();
        assert_eq!(plain, "eunPeaoPrPin:neuee");
    }

    #[rstest]
    #[case("192.168.0.72", 21911)]
    #[case("127.0.0.1", 0)]
    #[case("127.0.0.1", 1)]
    #[case("10.0.0.254", 65535)]
    #[case("::1", 40000)]
    #[case("fe80::1ff:fe23:4567:890a", 12341)]
    fn decode_recovers_address_and_port(#[case] address: &str, #[case] port: u16) {
        assert_eq!(decode(&encode(address, port)).unwrap(), (address.to_string(), port));
    }

    #[test]
    fn every_port() {
        for port in 0..=u16::MAX {
            assert_eq!(decode(&encode("192.168.0.72", port)).unwrap().1, port);
        }
    }

    #[test]
    fn socket_form() {
        let addr: std::net::SocketAddr = "192.168.0.72:21911".parse().unwrap();
        assert_eq!(encode_socket(addr), "ZXVuUGVhb1ByUGluOm5ldWVl");
    }

    #[test]
    fn substitution_is_an_involution() {
        let all = "0123456789.:-/ rendshaiouPSTLDxyz";
        assert_eq!(transform(&transform(all)), all);
    }

    #[test]
    fn garbage() {
        assert!(matches!(decode("!!!"), Err(TokenError::Base64(_))));
        let no_sep = STANDARD.encode("eunPeaoPrPin");
        assert!(matches!(decode(&no_sep), Err(TokenError::MissingSeparator)));
        let bad_port = STANDARD.encode("eunPeaoPrPin:zzz");
        assert!(matches!(decode(&bad_port), Err(TokenError::Port(_))));
        let too_big = STANDARD.encode("eunPeaoPrPin:aaaaa");
        assert!(matches!(decode(&too_big), Err(TokenError::Port(_))));
    }
}
