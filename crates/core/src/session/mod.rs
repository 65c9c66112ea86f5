//! Session and login handling.
//!
//! Each site gets one [`SessionStateMachine`] owning its cookies and login
//! lifecycle. Request dispatch reads snapshots; everything that mutates the
//! session goes through the machine's single-flight lock, so concurrent
//! searches trigger exactly one login and the rest await its outcome.

mod machine;

pub use machine::SessionStateMachine;

use crate::http::Cookie;

/// Where the login lifecycle currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    /// A login attempt holds the lock right now.
    Authenticating,
    Authenticated,
    /// Login needs an interactive captcha answer before the next attempt.
    CaptchaPending,
    Failed {
        message: String,
    },
}

/// An interactive challenge captured during a login attempt. The caller
/// presents it, then hands the answer back via
/// [`SessionStateMachine::supply_captcha_answer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    /// Image bytes, or the challenge text for text captchas.
    pub image: Vec<u8>,
    pub content_type: Option<String>,
    /// Cookies live when the challenge was fetched; the answer is only valid
    /// together with them.
    pub cookies: Vec<Cookie>,
}

/// Point-in-time view of a session for request dispatch.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub cookies: Vec<Cookie>,
}

/// A diagnostic suffix when a response lands on a different host than the
/// one configured, which usually means the site moved domains.
pub fn foreign_domain_hint(configured: &str, landed: &str) -> Option<String> {
    let configured_host = reqwest::Url::parse(configured).ok()?.host_str()?.to_string();
    let landed_host = reqwest::Url::parse(landed).ok()?.host_str()?.to_string();
    if configured_host.eq_ignore_ascii_case(&landed_host) {
        return None;
    }
    Some(format!(
        "redirected from {configured_host} to {landed_host}; the site may have moved domains"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_domain_hint() {
        let hint = foreign_domain_hint("https://old.example/browse", "https://new.example/login");
        assert!(hint.unwrap().contains("old.example to new.example"));

        assert_eq!(
            foreign_domain_hint("https://same.example/a", "https://same.example/b"),
            None
        );
        // Host comparison ignores case.
        assert_eq!(
            foreign_domain_hint("https://Same.example/", "https://same.EXAMPLE/"),
            None
        );
    }
}
