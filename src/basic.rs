//! Basic authentication (RFC 7617): credentials are sent as
//! `base64(username ":" password)` with no challenge state beyond the realm.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use zeroize::Zeroizing;

use crate::challenge::Challenge;
use crate::session::AuthSession;

/// Examine a Basic challenge; returns true if it was accepted.
pub(crate) fn challenge(sess: &mut AuthSession, attempt: u32, chall: &Challenge<'_>) -> bool {
    // Must have a realm.
    let Some(realm) = chall.realm else {
        return false;
    };

    sess.clean();
    sess.realm = Some(realm.to_owned());

    let Some(password) = sess.credentials(chall.handler, attempt) else {
        return false;
    };

    let blob = Zeroizing::new(format!("{}:{}", sess.username, password.as_str()));
    sess.basic = Some(STANDARD.encode(blob.as_bytes()));

    true
}

/// The `Authorization`/`Proxy-Authorization` value for the stored credentials.
pub(crate) fn response(sess: &AuthSession) -> Option<String> {
    sess.basic.as_ref().map(|b| format!("Basic {}\r\n", b))
}
