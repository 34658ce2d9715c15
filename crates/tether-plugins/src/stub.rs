// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub provider for desktop/CI builds where no platform sign-in SDK exists.
//
// Interactive requests fail with code `Unavailable`; state queries report
// "nobody signed in".

use tether_core::error::{BridgeError, Result};

use crate::provider::{GoogleAuthOptions, GoogleUser, SignInCallback, SignInProvider, TokenPair};

/// Wire code for requests this platform cannot serve.
pub const UNAVAILABLE: &str = "Unavailable";

fn unavailable() -> BridgeError {
    BridgeError::rejected(
        "Google sign-in is not available on this platform",
        Some(UNAVAILABLE),
    )
}

/// Provider returned on platforms without a sign-in SDK.
pub struct UnavailableProvider;

impl SignInProvider for UnavailableProvider {
    fn configure(&self, options: &GoogleAuthOptions) -> Result<()> {
        tracing::debug!(scopes = ?options.scopes, "sign-in configured on stub provider");
        Ok(())
    }

    fn sign_in(&self, done: SignInCallback) {
        tracing::warn!("SignInProvider::sign_in called on stub provider");
        done(Err(unavailable()));
    }

    fn sign_out(&self) {}

    fn disconnect(&self) -> Result<()> {
        tracing::warn!("SignInProvider::disconnect called on stub provider");
        Err(unavailable())
    }

    fn has_previous_sign_in(&self) -> bool {
        false
    }

    fn current_user(&self) -> Option<GoogleUser> {
        None
    }

    fn restore_previous_sign_in(&self) -> Result<Option<GoogleUser>> {
        Ok(None)
    }

    fn refresh_tokens(&self) -> Result<TokenPair> {
        Err(unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn sign_in_reports_unavailable() {
        let (tx, rx) = mpsc::channel();
        UnavailableProvider.sign_in(Box::new(move |result| {
            tx.send(result).expect("send");
        }));
        let err = rx.recv().expect("callback ran").expect_err("unavailable");
        assert_eq!(err.code(), Some(UNAVAILABLE));
    }

    #[test]
    fn nobody_is_signed_in() {
        assert!(!UnavailableProvider.has_previous_sign_in());
        assert!(UnavailableProvider.current_user().is_none());
        assert!(UnavailableProvider.restore_previous_sign_in().expect("restore").is_none());
        assert!(UnavailableProvider.refresh_tokens().is_err());
    }
}
