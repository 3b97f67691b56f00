use std::fmt::{self, Display, Formatter};
use std::result;

/// Reasons a challenge is rejected or a mutual-authentication check fails.
///
/// The most recent error is also kept in the session's error slot so the
/// application can show it after a failed request.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Error {
    /// `realm` or `nonce` missing from a Digest challenge.
    MissingDigestParams,
    /// The Digest challenge named an algorithm other than MD5 or MD5-sess.
    UnknownDigestAlgorithm,
    /// MD5-sess offered without the `auth` quality of protection.
    IncompatibleDigestAlgorithm,
    MutualMissingParams,
    MutualCnonceMismatch,
    /// Parsed vs expected nonce count.
    MutualNonceCountMismatch(u32, u32),
    MutualDigestMismatch,
    /// Diagnostics from the Negotiate provider, verbatim.
    Negotiate(String),
    /// A `=` with no directive name before it.
    InvalidHeaderSyntax,
}

pub type Result<T> = result::Result<T, Error>;

use Error::*;

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MissingDigestParams => {
                write!(f, "Missing nonce or realm in Digest authentication challenge")
            }
            UnknownDigestAlgorithm => {
                write!(f, "Unknown algorithm in Digest authentication challenge")
            }
            IncompatibleDigestAlgorithm => {
                write!(f, "Incompatible algorithm in Digest authentication challenge")
            }
            MutualMissingParams => {
                write!(f, "Digest mutual authentication failure: missing parameters")
            }
            MutualCnonceMismatch => {
                write!(f, "Digest mutual authentication failure: client nonce mismatch")
            }
            MutualNonceCountMismatch(got, want) => write!(
                f,
                "Digest mutual authentication failure: nonce count mismatch ({} not {})",
                got, want
            ),
            MutualDigestMismatch => {
                write!(f, "Digest mutual authentication failure: request-digest mismatch")
            }
            Negotiate(ctx) => write!(f, "Negotiate authentication error ({})", ctx),
            InvalidHeaderSyntax => write!(f, "Invalid authentication header syntax"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::MutualDigestMismatch.to_string(),
            "Digest mutual authentication failure: request-digest mismatch"
        );
        assert_eq!(
            Error::MutualNonceCountMismatch(2, 1).to_string(),
            "Digest mutual authentication failure: nonce count mismatch (2 not 1)"
        );
        assert_eq!(
            Error::Negotiate("no ticket".into()).to_string(),
            "Negotiate authentication error (no ticket)"
        );
    }
}
