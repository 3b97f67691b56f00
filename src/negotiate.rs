//! Negotiate authentication: an opaque base64 token exchange driven by a
//! platform security provider (GSS-API, SSPI), terminating when the provider
//! reports the context established. Covers the `NTLM` scheme-name variant
//! with the same machinery.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::debug;

use crate::challenge::Challenge;
use crate::error::{Error, Result};
use crate::session::AuthSession;

/// Outcome of advancing a [`NegotiateProvider`] context one leg.
#[derive(Debug)]
pub enum Step {
    /// More legs to come: send this token and expect another challenge.
    Continue(Vec<u8>),
    /// The context is established; a final output token may remain to send.
    Complete(Option<Vec<u8>>),
}

/// A pluggable security context, one per authentication target.
///
/// [`GssProvider`] implements this over GSS-API (feature `gssapi`); an SSPI
/// or test implementation plugs in through the same seam.
pub trait NegotiateProvider {
    /// Advance the context with the peer's token, if any. `Err` carries the
    /// provider's diagnostics verbatim.
    fn step(&mut self, input: Option<&[u8]>) -> std::result::Result<Step, String>;

    /// Discard any partially established context. A no-op on a fresh provider.
    fn reset(&mut self);
}

/// Per-session Negotiate state: the provider and the staged outbound token.
#[derive(Default)]
pub(crate) struct NegotiateState {
    pub provider: Option<Box<dyn NegotiateProvider>>,
    /// Base64 token for the next request; single-use.
    pub token: Option<String>,
}

/// Advance the exchange with an optional base64 input token; returns true if
/// the provider accepted the leg. A new output token, if any, is staged for
/// the next request.
fn continue_exchange(sess: &mut AuthSession, token: Option<&str>) -> bool {
    let Some(provider) = sess.negotiate.provider.as_mut() else {
        debug!("negotiate: no provider available");
        return false;
    };

    let input = match token {
        Some(t) => match STANDARD.decode(t.trim()) {
            Ok(bin) if !bin.is_empty() => {
                debug!("negotiate: continuation token [{}]", t);
                Some(bin)
            }
            _ => {
                debug!("negotiate: invalid input [{}]", t);
                return false;
            }
        },
        None => {
            // Starting over: drop any incomplete context.
            provider.reset();
            None
        }
    };

    match provider.step(input.as_deref()) {
        Err(diag) => {
            debug!("negotiate: provider error: {}", diag);
            sess.error = Some(Error::Negotiate(diag));
            false
        }
        Ok(step) => {
            let output = match step {
                Step::Continue(tok) => Some(tok),
                Step::Complete(tok) => {
                    // Context no longer needed.
                    provider.reset();
                    tok
                }
            };
            match output {
                Some(tok) if !tok.is_empty() => {
                    let b64 = STANDARD.encode(&tok);
                    debug!("negotiate: output token [{}]", b64);
                    sess.negotiate.token = Some(b64);
                }
                _ => debug!("negotiate: no output token"),
            }
            true
        }
    }
}

/// Examine a Negotiate challenge; returns true if it was accepted.
pub(crate) fn challenge(sess: &mut AuthSession, attempt: u32, chall: &Challenge<'_>) -> bool {
    let token = chall.opaque;

    // Respect an initial challenge, which must have no input token, or a
    // continuation, which must have one.
    if attempt == 0 || token.is_some() {
        continue_exchange(sess, token)
    } else {
        debug!("negotiate: ignoring empty challenge (attempt={})", attempt);
        false
    }
}

/// The `Authorization`/`Proxy-Authorization` value; suppressed when no token
/// is staged.
pub(crate) fn response(sess: &AuthSession) -> Option<String> {
    let name = sess.scheme?.name;
    sess.negotiate.token.as_ref().map(|t| format!("{} {}\r\n", name, t))
}

/// Mutual authentication: feed the token from a 2xx/3xx response's challenge
/// header back into the provider and expect it to succeed.
pub(crate) fn verify(sess: &mut AuthSession, value: &str) -> Result<()> {
    let scheme_name = sess.scheme.map(|s| s.name).unwrap_or("Negotiate");

    let mut parts = value.splitn(2, ' ');
    let name = parts.next().unwrap_or("");
    if !name.eq_ignore_ascii_case(scheme_name) {
        debug!("negotiate: not a {} response", scheme_name);
        let err = Error::Negotiate(format!("unexpected '{}' scheme in response", name));
        sess.error = Some(err.clone());
        return Err(err);
    }

    let rest = parts.next().unwrap_or("").trim_start();
    if rest.is_empty() {
        debug!("negotiate: no token in response");
        return Ok(());
    }

    let token = rest.split(|c| c == ',' || c == ' ').next().unwrap_or("");
    debug!("negotiate: response token [{}]", token);

    if continue_exchange(sess, Some(token)) {
        Ok(())
    } else {
        debug!("negotiate: mutual auth failed");
        let err = sess
            .error
            .clone()
            .unwrap_or_else(|| Error::Negotiate("mutual authentication failure".to_owned()));
        Err(err)
    }
}

/// GSS-API backed provider targeting the `HTTP@hostname` service.
#[cfg(feature = "gssapi")]
pub mod gss {
    use libgssapi::context::{ClientCtx, CtxFlags, SecurityContext};
    use libgssapi::credential::{Cred, CredUsage};
    use libgssapi::name::Name;
    use libgssapi::oid::{OidSet, GSS_MECH_KRB5, GSS_NT_HOSTBASED_SERVICE};
    use log::debug;

    use super::{NegotiateProvider, Step};

    pub struct GssProvider {
        spn: String,
        ctx: Option<ClientCtx>,
    }

    impl GssProvider {
        pub fn new(hostname: &str) -> GssProvider {
            GssProvider { spn: format!("HTTP@{}", hostname), ctx: None }
        }

        fn create_ctx(&self) -> Result<ClientCtx, String> {
            let name = Name::new(self.spn.as_bytes(), Some(&GSS_NT_HOSTBASED_SERVICE))
                .map_err(|e| e.to_string())?;
            let mut mechs = OidSet::new().map_err(|e| e.to_string())?;
            mechs.add(&GSS_MECH_KRB5).map_err(|e| e.to_string())?;
            let cred = Cred::acquire(None, None, CredUsage::Initiate, Some(&mechs))
                .map_err(|e| e.to_string())?;
            debug!("gssapi: initiating context for {}", self.spn);
            Ok(ClientCtx::new(
                Some(cred),
                name,
                CtxFlags::GSS_C_MUTUAL_FLAG,
                Some(&GSS_MECH_KRB5),
            ))
        }
    }

    impl NegotiateProvider for GssProvider {
        fn step(&mut self, input: Option<&[u8]>) -> Result<Step, String> {
            if self.ctx.is_none() {
                self.ctx = Some(self.create_ctx()?);
            }
            let ctx = self.ctx.as_mut().unwrap();
            let output = ctx.step(input, None).map_err(|e| e.to_string())?;
            let token = output.map(|buf| buf.to_vec());
            if ctx.is_complete() {
                Ok(Step::Complete(token))
            } else {
                Ok(Step::Continue(token.unwrap_or_default()))
            }
        }

        fn reset(&mut self) {
            self.ctx = None;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{NegotiateProvider, Step};
    use crate::challenge::parse_challenges;
    use crate::error::Error;
    use crate::session::{AuthSession, Handler, Role};

    /// Scripted provider: pops one step result per call and records inputs.
    pub(crate) struct MockProvider {
        pub script: Vec<Result<Step, String>>,
        pub inputs: Rc<RefCell<Vec<Option<Vec<u8>>>>>,
        pub resets: Rc<RefCell<usize>>,
    }

    impl MockProvider {
        pub fn new(script: Vec<Result<Step, String>>) -> MockProvider {
            MockProvider {
                script,
                inputs: Rc::new(RefCell::new(Vec::new())),
                resets: Rc::new(RefCell::new(0)),
            }
        }
    }

    impl NegotiateProvider for MockProvider {
        fn step(&mut self, input: Option<&[u8]>) -> Result<Step, String> {
            self.inputs.borrow_mut().push(input.map(|b| b.to_vec()));
            self.script.remove(0)
        }

        fn reset(&mut self) {
            *self.resets.borrow_mut() += 1;
        }
    }

    fn negotiate_session(script: Vec<Result<Step, String>>) -> (AuthSession, Rc<RefCell<Vec<Option<Vec<u8>>>>>) {
        let provider = MockProvider::new(script);
        let inputs = provider.inputs.clone();
        let mut sess = AuthSession::for_tests(Role::Server);
        sess.handlers.push(Handler {
            protomask: crate::PROTO_NEGOTIATE,
            creds: Box::new(|_, _| panic!("negotiate takes no password prompt")),
        });
        sess.negotiate.provider = Some(Box::new(provider));
        (sess, inputs)
    }

    fn accept(sess: &mut AuthSession, header: &str, attempt: u32) -> bool {
        let challs = parse_challenges(header, &sess.handlers);
        assert_eq!(challs.len(), 1);
        let ok = super::challenge(sess, attempt, &challs[0]);
        if ok {
            sess.scheme = Some(challs[0].scheme);
        }
        ok
    }

    #[test]
    fn test_initial_and_continuation() {
        let (mut sess, inputs) = negotiate_session(vec![
            Ok(Step::Continue(b"tok1".to_vec())),
            Ok(Step::Complete(Some(b"tok3".to_vec()))),
        ]);

        // Initial challenge: no input token.
        assert!(accept(&mut sess, "Negotiate", 0));
        assert_eq!(inputs.borrow().as_slice(), &[None]);
        assert_eq!(sess.negotiate.token.as_deref(), Some("dG9rMQ=="));
        assert_eq!(super::response(&sess).as_deref(), Some("Negotiate dG9rMQ==\r\n"));

        // Continuation carries the server's token ("tok2" in base64).
        sess.negotiate.token = None;
        assert!(accept(&mut sess, "Negotiate dG9rMg==", 1));
        assert_eq!(inputs.borrow()[1].as_deref(), Some(b"tok2".as_slice()));
        assert_eq!(sess.negotiate.token.as_deref(), Some("dG9rMw=="));
    }

    #[test]
    fn test_empty_continuation_ignored() {
        let (mut sess, inputs) = negotiate_session(vec![]);
        assert!(!accept(&mut sess, "Negotiate", 1));
        assert!(inputs.borrow().is_empty());
    }

    #[test]
    fn test_provider_error_surfaces() {
        let (mut sess, _) = negotiate_session(vec![Err("no credentials cache".to_owned())]);
        assert!(!accept(&mut sess, "Negotiate", 0));
        assert_eq!(sess.error, Some(Error::Negotiate("no credentials cache".to_owned())));
    }

    #[test]
    fn test_response_suppressed_without_token() {
        let (mut sess, _) = negotiate_session(vec![Ok(Step::Continue(b"t".to_vec()))]);
        assert!(accept(&mut sess, "Negotiate", 0));
        sess.negotiate.token = None;
        assert_eq!(super::response(&sess), None);
    }

    #[test]
    fn test_mutual_verify() {
        let (mut sess, inputs) = negotiate_session(vec![
            Ok(Step::Continue(b"tok1".to_vec())),
            Ok(Step::Complete(None)),
        ]);
        assert!(accept(&mut sess, "Negotiate", 0));

        // Server's final token arrives on the 2xx response header.
        assert_eq!(super::verify(&mut sess, "Negotiate c3J2ZmluYWw="), Ok(()));
        assert_eq!(inputs.borrow()[1].as_deref(), Some(b"srvfinal".as_slice()));

        // A token-less response header verifies trivially.
        assert_eq!(super::verify(&mut sess, "Negotiate"), Ok(()));
    }

    #[test]
    fn test_mutual_verify_failure() {
        let (mut sess, _) = negotiate_session(vec![
            Ok(Step::Continue(b"tok1".to_vec())),
            Err("token out of sequence".to_owned()),
        ]);
        assert!(accept(&mut sess, "Negotiate", 0));
        assert_eq!(
            super::verify(&mut sess, "Negotiate c3J2ZmluYWw="),
            Err(Error::Negotiate("token out of sequence".to_owned()))
        );
    }

    #[test]
    fn test_mutual_verify_wrong_scheme() {
        let (mut sess, _) = negotiate_session(vec![Ok(Step::Continue(b"tok1".to_vec()))]);
        assert!(accept(&mut sess, "Negotiate", 0));
        assert!(super::verify(&mut sess, "Basic realm=\"r\"").is_err());
    }

    #[test]
    fn test_ntlm_name_reused_in_response() {
        let (mut sess, _) = negotiate_session(vec![Ok(Step::Continue(b"tok1".to_vec()))]);
        assert!(accept(&mut sess, "NTLM", 0));
        assert_eq!(super::response(&sess).as_deref(), Some("NTLM dG9rMQ==\r\n"));
    }
}
