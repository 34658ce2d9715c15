// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// GoogleAuth plugin: the bridged sign-in surface.
//
//   method              context     result
//   signIn              primary     user (idToken, accessToken, profile)
//   signInWithSupabase  primary     same as signIn
//   signOut             caller      { success: true }
//   isSignedIn          caller      { isSignedIn }
//   getCurrentUser      caller      { isSignedIn, ...user }
//   disconnect          background  { success: true }
//   refresh             background  { idToken, accessToken }
//   checkSignInState    background  { isSignedIn, ...user }, emits signInRestored

use std::sync::{Arc, OnceLock};

use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use tether_bridge::{MethodDescriptor, Plugin, PluginCall, PluginContext};
use tether_core::error::{BridgeError, Result};
use tether_core::types::ExecutionContext;

use crate::provider::{GoogleAuthOptions, SignInProvider};

pub const PLUGIN_NAME: &str = "GoogleAuth";

/// Event pushed when a previous session is restored.
pub const SIGN_IN_RESTORED: &str = "signInRestored";

/// Rejection code when an operation needs a signed-in user.
pub const NOT_SIGNED_IN: &str = "NotSignedIn";

pub struct GoogleAuthPlugin {
    provider: Arc<dyn SignInProvider>,
    options: OnceLock<GoogleAuthOptions>,
    context: OnceLock<PluginContext>,
}

impl GoogleAuthPlugin {
    pub fn new(provider: Arc<dyn SignInProvider>) -> Self {
        Self {
            provider,
            options: OnceLock::new(),
            context: OnceLock::new(),
        }
    }

    /// Options read from the app descriptor at load.
    pub fn options(&self) -> Option<&GoogleAuthOptions> {
        self.options.get()
    }

    fn sign_in(&self, call: PluginCall) -> Result<()> {
        debug!(callback_id = %call.callback_id(), "presenting sign-in");
        self.provider.sign_in(Box::new(move |outcome| {
            let delivered = match outcome {
                Ok(user) => serde_json::to_value(&user)
                    .map_err(BridgeError::from)
                    .and_then(|payload| call.resolve(payload)),
                Err(err) => call.reject_with(err.into_failure()),
            };
            if let Err(err) = delivered {
                debug!(callback_id = %call.callback_id(), error = %err, "sign-in result not delivered");
            }
        }));
        Ok(())
    }

    fn sign_out(&self, call: PluginCall) -> Result<()> {
        self.provider.sign_out();
        call.resolve(json!({ "success": true }))
    }

    fn disconnect(&self, call: PluginCall) -> Result<()> {
        self.provider.disconnect()?;
        call.resolve(json!({ "success": true }))
    }

    fn is_signed_in(&self, call: PluginCall) -> Result<()> {
        call.resolve(json!({ "isSignedIn": self.provider.has_previous_sign_in() }))
    }

    fn get_current_user(&self, call: PluginCall) -> Result<()> {
        let user = self
            .provider
            .has_previous_sign_in()
            .then(|| self.provider.current_user())
            .flatten();
        match user {
            Some(user) => call.resolve(user.signed_in_payload()),
            None => call.resolve(signed_out()),
        }
    }

    fn refresh(&self, call: PluginCall) -> Result<()> {
        if self.provider.current_user().is_none() {
            return call.reject("No user signed in", Some(NOT_SIGNED_IN));
        }
        let tokens = self.provider.refresh_tokens()?;
        call.resolve(serde_json::to_value(tokens)?)
    }

    fn check_sign_in_state(&self, call: PluginCall) -> Result<()> {
        if !self.provider.has_previous_sign_in() {
            return call.resolve(signed_out());
        }
        let restored = match self.provider.restore_previous_sign_in() {
            Ok(user) => user,
            Err(err) => {
                return call.reject(format!("Error checking sign-in state: {err}"), err.code());
            }
        };

        match restored.filter(|user| user.id_token.is_some()) {
            Some(user) => {
                let payload = user.signed_in_payload();
                call.resolve(payload.clone())?;
                if let Some(context) = self.context.get() {
                    let delivered =
                        context.notify_retained(SIGN_IN_RESTORED, json!({ "user": payload }))?;
                    debug!(listeners = delivered, "sign-in restored");
                }
                Ok(())
            }
            None => call.resolve(signed_out()),
        }
    }
}

fn signed_out() -> Value {
    json!({ "isSignedIn": false })
}

impl Plugin for GoogleAuthPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn methods(self: Arc<Self>) -> Vec<MethodDescriptor> {
        use ExecutionContext::{Background, Caller, Primary};
        vec![
            MethodDescriptor::bind("signIn", Primary, &self, Self::sign_in),
            MethodDescriptor::bind("signInWithSupabase", Primary, &self, Self::sign_in),
            MethodDescriptor::bind("signOut", Caller, &self, Self::sign_out),
            MethodDescriptor::bind("isSignedIn", Caller, &self, Self::is_signed_in),
            MethodDescriptor::bind("getCurrentUser", Caller, &self, Self::get_current_user),
            MethodDescriptor::bind("disconnect", Background, &self, Self::disconnect),
            MethodDescriptor::bind("refresh", Background, &self, Self::refresh),
            MethodDescriptor::bind("checkSignInState", Background, &self, Self::check_sign_in_state),
        ]
    }

    #[instrument(skip_all, fields(plugin = PLUGIN_NAME))]
    fn load(&self, context: &PluginContext) -> Result<()> {
        // One instance serves one bridge; a second load would keep the first
        // bridge's context for event delivery.
        if self.context.set(context.clone()).is_err() {
            warn!("GoogleAuth instance loaded twice");
            return Err(BridgeError::Config(format!(
                "{PLUGIN_NAME} instance is already loaded into a bridge"
            )));
        }
        let options: GoogleAuthOptions = context.decode_config()?;
        self.provider.configure(&options)?;
        info!(scopes = options.scopes.len(), "sign-in provider configured");
        self.options.get_or_init(|| options);
        Ok(())
    }

    fn teardown(&self) {
        debug!("GoogleAuth torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{GoogleUser, SignInCallback, TokenPair};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tether_bridge::{Bridge, InlineExecutor, MemorySink, Scheduler, listener_fn};
    use tether_core::config::InstanceDescriptor;
    use tether_core::types::{CallEnvelope, ResultStatus};

    #[derive(Default)]
    struct FakeProvider {
        user: Mutex<Option<GoogleUser>>,
        configured: Mutex<Option<GoogleAuthOptions>>,
        pending: Mutex<Option<SignInCallback>>,
        signed_out: AtomicBool,
    }

    impl FakeProvider {
        fn signed_in() -> Self {
            let p = Self::default();
            *p.user.lock() = Some(GoogleUser {
                id_token: Some("abc".into()),
                access_token: "tok".into(),
                display_name: Some("Ada".into()),
                ..GoogleUser::default()
            });
            p
        }

        /// Finish the interactive sign-in that is waiting, if any.
        fn complete(&self, outcome: Result<GoogleUser>) {
            if let Some(done) = self.pending.lock().take() {
                done(outcome);
            }
        }
    }

    impl SignInProvider for FakeProvider {
        fn configure(&self, options: &GoogleAuthOptions) -> Result<()> {
            if options.client_id.as_deref() == Some("bad") {
                return Err(BridgeError::Config("unknown client".into()));
            }
            *self.configured.lock() = Some(options.clone());
            Ok(())
        }

        fn sign_in(&self, done: SignInCallback) {
            *self.pending.lock() = Some(done);
        }

        fn sign_out(&self) {
            self.signed_out.store(true, Ordering::SeqCst);
            self.user.lock().take();
        }

        fn disconnect(&self) -> Result<()> {
            Ok(())
        }

        fn has_previous_sign_in(&self) -> bool {
            self.user.lock().is_some()
        }

        fn current_user(&self) -> Option<GoogleUser> {
            self.user.lock().clone()
        }

        fn restore_previous_sign_in(&self) -> Result<Option<GoogleUser>> {
            Ok(self.user.lock().clone())
        }

        fn refresh_tokens(&self) -> Result<TokenPair> {
            Ok(TokenPair {
                id_token: "new-id".into(),
                access_token: "new-access".into(),
            })
        }
    }

    fn bridge(provider: Arc<FakeProvider>, descriptor: InstanceDescriptor) -> (Bridge, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let bridge = Bridge::builder(sink.clone())
            .descriptor(descriptor)
            .scheduler(Scheduler::new(Arc::new(InlineExecutor), Arc::new(InlineExecutor)))
            .plugin(Arc::new(GoogleAuthPlugin::new(provider)))
            .build()
            .expect("build");
        (bridge, sink)
    }

    fn call(bridge: &Bridge, sink: &MemorySink, id: &str, method: &str) -> Value {
        bridge
            .dispatch(CallEnvelope::new(id, PLUGIN_NAME, method))
            .expect("dispatch");
        let results = sink.results_for(&id.into());
        assert_eq!(results.len(), 1, "{method} should answer exactly once");
        serde_json::to_value(&results[0]).expect("serialize")
    }

    #[test]
    fn load_configures_provider_from_descriptor() {
        let provider = Arc::new(FakeProvider::default());
        let descriptor: InstanceDescriptor = serde_json::from_value(json!({
            "plugins": { "GoogleAuth": { "scopes": ["profile", "email"], "forceCodeForRefreshToken": true } }
        }))
        .expect("descriptor");
        let (_bridge, _) = bridge(provider.clone(), descriptor);

        let configured = provider.configured.lock().clone().expect("configured");
        assert_eq!(configured.scopes, vec!["profile", "email"]);
        assert!(configured.force_code_for_refresh_token);
    }

    #[test]
    fn provider_refusing_config_fails_the_load() {
        let descriptor: InstanceDescriptor = serde_json::from_value(json!({
            "plugins": { "GoogleAuth": { "clientId": "bad" } }
        }))
        .expect("descriptor");
        let result = Bridge::builder(Arc::new(MemorySink::new()))
            .descriptor(descriptor)
            .scheduler(Scheduler::new(Arc::new(InlineExecutor), Arc::new(InlineExecutor)))
            .plugin(Arc::new(GoogleAuthPlugin::new(Arc::new(FakeProvider::default()))))
            .build();
        assert!(matches!(result, Err(BridgeError::PluginLoad { .. })));
    }

    #[test]
    fn instance_cannot_be_loaded_into_a_second_bridge() {
        let plugin = Arc::new(GoogleAuthPlugin::new(Arc::new(FakeProvider::default())));
        let build = || {
            Bridge::builder(Arc::new(MemorySink::new()))
                .scheduler(Scheduler::new(Arc::new(InlineExecutor), Arc::new(InlineExecutor)))
                .plugin(plugin.clone())
                .build()
        };
        let _first = build().expect("first bridge");
        match build() {
            Err(BridgeError::PluginLoad { plugin, reason }) => {
                assert_eq!(plugin, PLUGIN_NAME);
                assert!(reason.contains("already loaded"), "{reason}");
            }
            other => panic!("expected PluginLoad, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn sign_in_resolves_when_the_provider_finishes() {
        let provider = Arc::new(FakeProvider::default());
        let (bridge, sink) = bridge(provider.clone(), InstanceDescriptor::default());
        bridge
            .dispatch(CallEnvelope::new("cb-1", PLUGIN_NAME, "signIn"))
            .expect("dispatch");
        assert!(sink.is_empty());

        provider.complete(Ok(GoogleUser {
            id_token: Some("abc".into()),
            access_token: "tok".into(),
            ..GoogleUser::default()
        }));
        let results = sink.results_for(&"cb-1".into());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload, Some(json!({ "idToken": "abc", "accessToken": "tok" })));
    }

    #[test]
    fn sign_in_failure_is_rejected() {
        let provider = Arc::new(FakeProvider::default());
        let (bridge, sink) = bridge(provider.clone(), InstanceDescriptor::default());
        bridge
            .dispatch(CallEnvelope::new("cb", PLUGIN_NAME, "signInWithSupabase"))
            .expect("dispatch");
        provider.complete(Err(BridgeError::rejected("The user canceled the sign-in flow.", Some("-5"))));

        let results = sink.results_for(&"cb".into());
        assert_eq!(results[0].status, ResultStatus::Error);
        assert_eq!(results[0].code.as_deref(), Some("-5"));
    }

    #[test]
    fn current_user_and_sign_out() {
        let provider = Arc::new(FakeProvider::signed_in());
        let (bridge, sink) = bridge(provider.clone(), InstanceDescriptor::default());

        let user = call(&bridge, &sink, "u1", "getCurrentUser");
        assert_eq!(user["payload"]["isSignedIn"], true);
        assert_eq!(user["payload"]["displayName"], "Ada");

        let out = call(&bridge, &sink, "o1", "signOut");
        assert_eq!(out["payload"], json!({ "success": true }));
        assert!(provider.signed_out.load(Ordering::SeqCst));

        let after = call(&bridge, &sink, "u2", "getCurrentUser");
        assert_eq!(after["payload"], json!({ "isSignedIn": false }));
        let flag = call(&bridge, &sink, "s1", "isSignedIn");
        assert_eq!(flag["payload"], json!({ "isSignedIn": false }));
    }

    #[test]
    fn refresh_requires_a_user() {
        let (bridge, sink) = bridge(Arc::new(FakeProvider::default()), InstanceDescriptor::default());
        let result = call(&bridge, &sink, "r1", "refresh");
        assert_eq!(result["status"], "error");
        assert_eq!(result["code"], NOT_SIGNED_IN);

        let (bridge, sink) = self::bridge(Arc::new(FakeProvider::signed_in()), InstanceDescriptor::default());
        let result = call(&bridge, &sink, "r2", "refresh");
        assert_eq!(
            result["payload"],
            json!({ "idToken": "new-id", "accessToken": "new-access" })
        );
    }

    #[test]
    fn check_sign_in_state_emits_restored_event() {
        let (bridge, sink) = bridge(Arc::new(FakeProvider::signed_in()), InstanceDescriptor::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        bridge
            .add_listener(
                PLUGIN_NAME,
                SIGN_IN_RESTORED,
                listener_fn(move |_, _, payload| log.lock().push(payload.clone())),
            )
            .expect("listen");

        let state = call(&bridge, &sink, "c1", "checkSignInState");
        assert_eq!(state["payload"]["idToken"], "abc");

        let events = seen.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["user"]["isSignedIn"], true);
    }

    #[test]
    fn check_sign_in_state_without_session() {
        let (bridge, sink) = bridge(Arc::new(FakeProvider::default()), InstanceDescriptor::default());
        let state = call(&bridge, &sink, "c1", "checkSignInState");
        assert_eq!(state["payload"], json!({ "isSignedIn": false }));
    }
}
