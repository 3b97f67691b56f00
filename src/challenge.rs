//! Challenge-header parsing and the scheme table.
//!
//! A `WWW-Authenticate`/`Proxy-Authenticate` value carries one or more
//! challenges. Parsing splits it into directives, binds them to the scheme
//! leader they follow, and produces a candidate list ordered by descending
//! scheme strength for the session to try in turn.

use log::debug;

use crate::enums::Algorithm;
use crate::scanner::Tokenizer;
use crate::session::Handler;
use crate::utils::shave;

/// Protocol identifiers for handler registration masks.
pub const PROTO_BASIC: u32 = 0x0001;
pub const PROTO_DIGEST: u32 = 0x0002;
pub const PROTO_NEGOTIATE: u32 = 0x0004;

/// The scheme takes an unquoted non-pair parameter in the challenge.
pub(crate) const AUTH_FLAG_OPAQUE_PARAM: u32 = 0x0001;
/// The scheme's verifier runs on the challenge header of 2xx/3xx responses.
pub(crate) const AUTH_FLAG_VERIFY_NON40X: u32 = 0x0002;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum SchemeKind {
    Basic,
    Digest,
    Negotiate,
}

/// One row of the scheme table.
#[derive(Debug)]
pub(crate) struct Scheme {
    pub id: u32,
    /// Sort order for the candidate list; highest first.
    pub strength: u8,
    pub name: &'static str,
    pub kind: SchemeKind,
    pub flags: u32,
}

impl Scheme {
    pub(crate) fn has_verifier(&self) -> bool {
        !matches!(self.kind, SchemeKind::Basic)
    }
}

pub(crate) static SCHEMES: &[Scheme] = &[
    Scheme { id: PROTO_BASIC, strength: 10, name: "Basic", kind: SchemeKind::Basic, flags: 0 },
    Scheme { id: PROTO_DIGEST, strength: 20, name: "Digest", kind: SchemeKind::Digest, flags: 0 },
    Scheme {
        id: PROTO_NEGOTIATE,
        strength: 30,
        name: "Negotiate",
        kind: SchemeKind::Negotiate,
        flags: AUTH_FLAG_OPAQUE_PARAM | AUTH_FLAG_VERIFY_NON40X,
    },
    Scheme {
        id: PROTO_NEGOTIATE,
        strength: 30,
        name: "NTLM",
        kind: SchemeKind::Negotiate,
        flags: AUTH_FLAG_OPAQUE_PARAM | AUTH_FLAG_VERIFY_NON40X,
    },
];

/// One parsed challenge, bound to the handler whose mask matched its scheme.
/// String fields borrow from the header value being parsed.
#[derive(Debug)]
pub(crate) struct Challenge<'a> {
    pub scheme: &'static Scheme,
    pub handler: usize,
    pub realm: Option<&'a str>,
    pub nonce: Option<&'a str>,
    pub opaque: Option<&'a str>,
    pub stale: bool,
    pub got_qop: bool,
    pub qop_auth: bool,
    pub alg: Algorithm,
}

impl<'a> Challenge<'a> {
    fn new(scheme: &'static Scheme, handler: usize) -> Challenge<'a> {
        Challenge {
            scheme,
            handler,
            realm: None,
            nonce: None,
            opaque: None,
            stale: false,
            got_qop: false,
            qop_auth: false,
            alg: Algorithm::default(),
        }
    }
}

/// Match a scheme leader against the table, scanning handlers in registration
/// order so the earliest-registered handler wins the binding.
fn match_scheme(name: &str, handlers: &[Handler]) -> Option<(&'static Scheme, usize)> {
    for (idx, handler) in handlers.iter().enumerate() {
        for scheme in SCHEMES {
            if scheme.id & handler.protomask != 0 && name.eq_ignore_ascii_case(scheme.name) {
                return Some((scheme, idx));
            }
        }
    }
    None
}

/// Insert keeping the list sorted by descending strength; equal strengths
/// stay in arrival order. Returns the insertion index.
fn insert_challenge<'a>(list: &mut Vec<Challenge<'a>>, chall: Challenge<'a>) -> usize {
    let pos = list
        .iter()
        .position(|c| chall.scheme.strength > c.scheme.strength)
        .unwrap_or(list.len());
    list.insert(pos, chall);
    pos
}

/// Split a challenge header value into a strength-ordered candidate list.
/// Directives ahead of any recognized scheme leader are ignored, as are
/// challenges for schemes no registered handler allows.
pub(crate) fn parse_challenges<'a>(value: &'a str, handlers: &[Handler]) -> Vec<Challenge<'a>> {
    let mut candidates: Vec<Challenge<'a>> = Vec::new();
    let mut cur: Option<usize> = None;

    let mut scanner = Tokenizer::new(value, true);
    while let Some(Ok(tok)) = scanner.next() {
        let Some(val) = tok.value else {
            // A scheme leader.
            let Some((scheme, handler)) = match_scheme(tok.key, handlers) else {
                debug!("auth: ignoring '{}' challenge", tok.key);
                cur = None;
                continue;
            };

            debug!("auth: got '{}' challenge", scheme.name);
            let pos = insert_challenge(&mut candidates, Challenge::new(scheme, handler));

            if scheme.flags & AUTH_FLAG_OPAQUE_PARAM != 0 && tok.sep == Some(' ') {
                // The unquoted base64 parameter token does not match the
                // 2617 auth-param grammar; take it whole up to the next comma.
                let blob = shave(scanner.take_until_comma(), &[' ', '\t']);
                debug!("auth: {} opaque parameter '{}'", scheme.name, blob);
                candidates[pos].opaque = Some(blob);
            }
            cur = Some(pos);
            continue;
        };

        let Some(idx) = cur else {
            // Directive for an unknown challenge.
            debug!("auth: ignored parameter: {} = {}", tok.key, val);
            continue;
        };
        let chall = &mut candidates[idx];

        let val = shave(val, &['"', '\'']);
        let key = tok.key;
        if key.eq_ignore_ascii_case("realm") {
            chall.realm = Some(val);
        } else if key.eq_ignore_ascii_case("nonce") {
            chall.nonce = Some(val);
        } else if key.eq_ignore_ascii_case("opaque") {
            chall.opaque = Some(val);
        } else if key.eq_ignore_ascii_case("stale") {
            chall.stale = val.eq_ignore_ascii_case("true");
        } else if key.eq_ignore_ascii_case("algorithm") {
            chall.alg = Algorithm::from_directive(val);
        } else if key.eq_ignore_ascii_case("qop") {
            for tok in val.split(',') {
                if shave(tok, &[' ', '\t']).eq_ignore_ascii_case("auth") {
                    chall.qop_auth = true;
                }
            }
            // A qop directive without a mode we can use is no qop at all.
            chall.got_qop = chall.qop_auth;
        }
    }

    candidates
}
