use std::fmt;
use std::fmt::{Display, Formatter};

/// Digest hash algorithm named by the challenge.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Algorithm {
    Md5,
    Md5Sess,
    /// Anything else; the challenge will be rejected.
    Unknown,
}

impl Algorithm {
    /// Parse an `algorithm` directive value. Absence of the directive means MD5.
    pub(crate) fn from_directive(s: &str) -> Algorithm {
        if s.eq_ignore_ascii_case("md5") {
            Algorithm::Md5
        } else if s.eq_ignore_ascii_case("md5-sess") {
            Algorithm::Md5Sess
        } else {
            Algorithm::Unknown
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Md5
    }
}

impl Display for Algorithm {
    /// Format to the form used in HTTP headers
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Algorithm::Md5 => "MD5",
            Algorithm::Md5Sess => "MD5-sess",
            Algorithm::Unknown => "unknown",
        })
    }
}

/// Quality of protection the client applies to its responses.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum Qop {
    /// Pre-2617 server; plain request digest with no cnonce or nonce count.
    None,
    Auth,
}

/// Result of the post-send dispatch, handed back to the HTTP engine.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Outcome {
    /// Nothing more to do for this response; pass it through.
    Ok,
    /// A challenge was accepted; re-dispatch the same request.
    Retry,
    /// No server challenge could be satisfied.
    AuthFailed,
    /// No proxy challenge could be satisfied.
    ProxyAuthFailed,
    /// Mutual authentication failed; the response must not be trusted.
    MutualAuthFailed,
}

#[cfg(test)]
mod tests {
    use super::Algorithm;

    #[test]
    fn test_algorithm_directive() {
        assert_eq!(Algorithm::from_directive("md5"), Algorithm::Md5);
        assert_eq!(Algorithm::from_directive("MD5"), Algorithm::Md5);
        assert_eq!(Algorithm::from_directive("MD5-sess"), Algorithm::Md5Sess);
        assert_eq!(Algorithm::from_directive("SHA-256"), Algorithm::Unknown);
        assert_eq!(Algorithm::default(), Algorithm::Md5);
    }

    #[test]
    fn test_algorithm_display() {
        assert_eq!(Algorithm::Md5.to_string(), "MD5");
        assert_eq!(Algorithm::Md5Sess.to_string(), "MD5-sess");
    }
}
