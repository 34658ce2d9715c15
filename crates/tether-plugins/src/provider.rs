// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sign-in provider abstraction.
//
// The GoogleAuth plugin only shapes calls and results; the OAuth work is done
// by a host-supplied provider (the platform SDK on device, a stub elsewhere).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tether_core::error::Result;

/// `plugins.GoogleAuth` section of the app descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleAuthOptions {
    pub scopes: Vec<String>,
    pub client_id: Option<String>,
    pub server_client_id: Option<String>,
    pub ios_client_id: Option<String>,
    pub force_code_for_refresh_token: bool,
}

/// A signed-in account as reported to the web layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl GoogleUser {
    /// `{ isSignedIn: true, ...user fields }`.
    pub fn signed_in_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("isSignedIn".into(), Value::Bool(true));
        if let Ok(Value::Object(fields)) = serde_json::to_value(self) {
            payload.extend(fields);
        }
        Value::Object(payload)
    }
}

/// Fresh tokens returned by a refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub id_token: String,
    pub access_token: String,
}

/// Completion for an interactive sign-in.
pub type SignInCallback = Box<dyn FnOnce(Result<GoogleUser>) + Send + 'static>;

/// Platform sign-in backend.
///
/// `sign_in` is called on the primary context and must not block it; it
/// hands the outcome to `done` whenever the user finishes. Everything else
/// may block and is called from background or caller contexts.
pub trait SignInProvider: Send + Sync {
    fn configure(&self, options: &GoogleAuthOptions) -> Result<()>;

    fn sign_in(&self, done: SignInCallback);

    fn sign_out(&self);

    /// Revoke the app's access for the current account.
    fn disconnect(&self) -> Result<()>;

    fn has_previous_sign_in(&self) -> bool;

    fn current_user(&self) -> Option<GoogleUser>;

    /// Restore the last session, if any.
    fn restore_previous_sign_in(&self) -> Result<Option<GoogleUser>>;

    /// Refresh the current user's tokens if they are about to expire.
    fn refresh_tokens(&self) -> Result<TokenPair>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn options_accept_app_config_keys() {
        let opts: GoogleAuthOptions = serde_json::from_value(json!({
            "scopes": ["profile", "email"],
            "serverClientId": "server.apps.googleusercontent.com",
            "iosClientId": "ios.apps.googleusercontent.com",
            "forceCodeForRefreshToken": true
        }))
        .expect("options");
        assert_eq!(opts.scopes, vec!["profile", "email"]);
        assert!(opts.force_code_for_refresh_token);
        assert!(opts.client_id.is_none());
    }

    #[test]
    fn signed_in_payload_leads_with_flag_and_skips_missing_fields() {
        let user = GoogleUser {
            id_token: Some("abc".into()),
            access_token: "tok".into(),
            email: Some("ada@example.com".into()),
            ..GoogleUser::default()
        };
        let payload = user.signed_in_payload();
        assert_eq!(
            payload,
            json!({ "isSignedIn": true, "idToken": "abc", "accessToken": "tok", "email": "ada@example.com" })
        );
        let keys: Vec<&String> = payload.as_object().expect("object").keys().collect();
        assert_eq!(keys[0], "isSignedIn");
    }
}
