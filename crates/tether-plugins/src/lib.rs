// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tether: Bundled plugins.

pub mod google_auth;
pub mod provider;
pub mod stub;

pub use google_auth::GoogleAuthPlugin;
pub use provider::{GoogleAuthOptions, GoogleUser, SignInProvider, TokenPair};
pub use stub::UnavailableProvider;
