//! Digest authentication (RFC 2617, `auth` quality of protection, MD5 and
//! MD5-sess), with 2069-style `Authentication-Info` compatibility.
//!
//! The request digest is built up incrementally so the context can be
//! duplicated mid-stream: the server's `rspauth` reuses everything up to and
//! including the `cnonce`, replacing H(A2) with a variant that omits the
//! method. The duplicate is held until the matching `Authentication-Info`
//! arrives and is consumed exactly once.

use log::debug;
use md5::{Digest, Md5};
use rand::Rng;

use crate::challenge::Challenge;
use crate::enums::{Algorithm, Qop};
use crate::error::{Error, Result};
use crate::scanner::Tokenizer;
use crate::session::AuthSession;
use crate::utils::shave;

/// Digest state carried across requests on one session.
pub(crate) struct DigestState {
    pub nonce: String,
    pub cnonce: String,
    pub opaque: Option<String>,
    pub qop: Qop,
    pub alg: Algorithm,
    pub nonce_count: u32,
    /// Lowercase 32-hex H(A1).
    pub h_a1: String,
    /// Duplicate of the request-digest context, kept for verifying the
    /// server's `rspauth`.
    pub stored_rdig: Option<Md5>,
}

/// Client nonce: 32 hex chars derived from 256 bytes of CSPRNG output.
/// Not a secret, just a value the server cannot predict for us.
pub(crate) fn cnonce() -> String {
    let mut data = [0u8; 256];
    rand::thread_rng().fill(&mut data[..]);
    let mut hash = Md5::new();
    hash.update(data);
    hex::encode(hash.finalize())
}

/// Examine a Digest challenge; returns true if it was accepted.
pub(crate) fn challenge(sess: &mut AuthSession, attempt: u32, chall: &Challenge<'_>) -> bool {
    if chall.alg == Algorithm::Unknown {
        sess.error = Some(Error::UnknownDigestAlgorithm);
        return false;
    }
    if chall.alg == Algorithm::Md5Sess && !chall.qop_auth {
        sess.error = Some(Error::IncompatibleDigestAlgorithm);
        return false;
    }
    let (Some(realm), Some(nonce)) = (chall.realm, chall.nonce) else {
        debug!("auth: digest challenge missing parms");
        sess.error = Some(Error::MissingDigestParams);
        return false;
    };

    // stale=true with no prior state cannot reuse anything.
    let stale = chall.stale && sess.digest.is_some();

    let mut password = None;
    if !stale {
        // Forget the old session details; really need user authentication.
        sess.clean();
        sess.realm = Some(realm.to_owned());
        password = match sess.credentials(chall.handler, attempt) {
            Some(pw) => Some(pw),
            None => return false,
        };
    }

    let mut st = match sess.digest.take() {
        Some(st) if stale => st,
        _ => DigestState {
            nonce: String::new(),
            cnonce: String::new(),
            opaque: None,
            qop: Qop::None,
            alg: chall.alg,
            nonce_count: 0,
            h_a1: String::new(),
            stored_rdig: None,
        },
    };

    st.alg = chall.alg;
    st.nonce = nonce.to_owned();
    st.cnonce = cnonce();
    if let Some(opaque) = chall.opaque {
        st.opaque = Some(opaque.to_owned());
    }

    if chall.got_qop {
        debug!("auth: got qop, using 2617-style");
        st.nonce_count = 0;
        st.qop = Qop::Auth;
    } else {
        st.qop = Qop::None;
    }

    if !stale {
        // H(A1) = H(unq(username) ":" unq(realm) ":" passwd)
        let password = password.unwrap();
        let mut tmp = Md5::new();
        tmp.update(sess.username.as_bytes());
        tmp.update(b":");
        tmp.update(realm.as_bytes());
        tmp.update(b":");
        tmp.update(password.as_bytes());
        drop(password); // done with that; wiped on drop

        if st.alg == Algorithm::Md5Sess {
            // Session A1 = H(...above...) ":" unq(nonce) ":" unq(cnonce)
            let tmp_hex = hex::encode(tmp.finalize());
            let mut a1 = Md5::new();
            a1.update(tmp_hex.as_bytes());
            a1.update(b":");
            a1.update(st.nonce.as_bytes());
            a1.update(b":");
            a1.update(st.cnonce.as_bytes());
            st.h_a1 = hex::encode(a1.finalize());
            debug!("auth: session H(A1) is [{}]", st.h_a1);
        } else {
            st.h_a1 = hex::encode(tmp.finalize());
            debug!("auth: H(A1) is [{}]", st.h_a1);
        }
    }

    sess.digest = Some(st);
    debug!("auth: accepting digest challenge");
    true
}

/// Build the Digest `Authorization`/`Proxy-Authorization` value for a request.
pub(crate) fn response(sess: &mut AuthSession, method: &str, uri: &str) -> Option<String> {
    let username = sess.username.clone();
    let realm = sess.realm.clone()?;
    let st = sess.digest.as_mut()?;

    let mut nc_value = String::new();
    if st.qop != Qop::None {
        st.nonce_count += 1;
        nc_value = format!("{:08x}", st.nonce_count);
    }

    // H(A2) = H(method ":" request-uri)
    let mut a2 = Md5::new();
    a2.update(method.as_bytes());
    a2.update(b":");
    a2.update(uri.as_bytes());
    let a2_hex = hex::encode(a2.finalize());
    debug!("auth: H(A2): {}", a2_hex);

    // Request-digest prefix common to both qop modes:
    //   H(A1) ":" unq(nonce) ":"
    let mut rdig = Md5::new();
    rdig.update(st.h_a1.as_bytes());
    rdig.update(b":");
    rdig.update(st.nonce.as_bytes());
    rdig.update(b":");
    if st.qop != Qop::None {
        // nc-value ":" unq(cnonce) ":" unq(qop-value) ":"
        rdig.update(nc_value.as_bytes());
        rdig.update(b":");
        rdig.update(st.cnonce.as_bytes());
        rdig.update(b":");
        // The server's rspauth is computed from this same prefix.
        st.stored_rdig = Some(rdig.clone());
        rdig.update(b"auth");
        rdig.update(b":");
    }
    rdig.update(a2_hex.as_bytes());
    let rdig_hex = hex::encode(rdig.finalize());

    let mut ret = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", \
         response=\"{}\", algorithm=\"{}\"",
        username, realm, st.nonce, uri, rdig_hex, st.alg
    );
    if let Some(opaque) = &st.opaque {
        ret.push_str(", opaque=\"");
        ret.push_str(opaque);
        ret.push('"');
    }
    if st.qop != Qop::None {
        ret.push_str(", cnonce=\"");
        ret.push_str(&st.cnonce);
        ret.push_str("\", nc=");
        ret.push_str(&nc_value);
        ret.push_str(", qop=\"auth\"");
    }
    ret.push_str("\r\n");

    Some(ret)
}

/// Check an `Authentication-Info`/`Proxy-Authentication-Info` value against
/// the stored half of the request digest. A header without `qop` is the
/// 2069-style variant and carries nothing to verify; `nextnonce` is honored
/// either way.
pub(crate) fn verify(sess: &mut AuthSession, uri: &str, value: &str) -> Result<()> {
    let mut qop = Qop::None;
    let mut qop_value = None;
    let mut nextnonce = None;
    let mut rspauth = None;
    let mut cnonce = None;
    let mut nc = None;
    let mut nonce_count = 0u32;

    debug!("auth: got Auth-Info header: {}", value);

    for tok in Tokenizer::new(value, false) {
        let Ok(tok) = tok else { break };
        let Some(val) = tok.value else { continue };
        let val = shave(val, &['"']);
        let key = tok.key;

        if key.eq_ignore_ascii_case("qop") {
            qop_value = Some(val);
            qop = if val.eq_ignore_ascii_case("auth") { Qop::Auth } else { Qop::None };
        } else if key.eq_ignore_ascii_case("nextnonce") {
            nextnonce = Some(val);
        } else if key.eq_ignore_ascii_case("rspauth") {
            rspauth = Some(val);
        } else if key.eq_ignore_ascii_case("cnonce") {
            cnonce = Some(val);
        } else if key.eq_ignore_ascii_case("nc") {
            nc = Some(val);
            match u32::from_str_radix(val, 16) {
                Ok(n) => {
                    debug!("auth: got nonce_count: {}", n);
                    nonce_count = n;
                }
                Err(_) => debug!("auth: couldn't parse nonce count"),
            }
        }
    }

    let ret = {
        let Some(st) = sess.digest.as_mut() else {
            return Ok(());
        };

        let ret = if qop == Qop::None {
            // The 2069-style A-I header only has the entity and nextnonce
            // parameters.
            debug!("auth: 2069-style A-I header");
            Ok(())
        } else if rspauth.is_none() || cnonce.is_none() || nc.is_none() {
            Err(Error::MutualMissingParams)
        } else if cnonce != Some(st.cnonce.as_str()) {
            Err(Error::MutualCnonceMismatch)
        } else if nonce_count != st.nonce_count {
            Err(Error::MutualNonceCountMismatch(nonce_count, st.nonce_count))
        } else {
            match st.stored_rdig.take() {
                // A qop-carrying A-I for a request we signed without qop.
                None => Err(Error::MutualMissingParams),
                Some(mut rdig) => {
                    // Modified H(A2), method omitted: H(":" request-uri)
                    let mut a2 = Md5::new();
                    a2.update(b":");
                    a2.update(uri.as_bytes());
                    let a2_hex = hex::encode(a2.finalize());

                    // stored_rdig holds the digest-so-far of
                    //   H(A1) ":" nonce ":" nc ":" cnonce ":"
                    rdig.update(qop_value.unwrap().as_bytes());
                    rdig.update(b":");
                    rdig.update(a2_hex.as_bytes());
                    let expected = hex::encode(rdig.finalize());

                    if expected.eq_ignore_ascii_case(rspauth.unwrap()) {
                        debug!("auth: response-digest match");
                        Ok(())
                    } else {
                        debug!(
                            "auth: response-digest mismatch (expected [{}] vs actual [{}])",
                            expected,
                            rspauth.unwrap()
                        );
                        Err(Error::MutualDigestMismatch)
                    }
                }
            }
        };

        if let Some(next) = nextnonce {
            debug!("auth: found nextnonce of [{}]", next);
            st.nonce = next.to_owned();
            // A fresh nonce begins a new counting context.
            st.nonce_count = 0;
        }

        ret
    };

    if let Err(e) = &ret {
        sess.error = Some(e.clone());
    }
    ret
}
