// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The call object a handler receives: the envelope it was invoked with and
// the channel it answers on.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use tether_core::error::{BridgeError, Result};
use tether_core::types::{Arguments, CallEnvelope, CallFailure, CallbackId, Emission};

use crate::channel::ResultChannel;

#[derive(Clone, Debug)]
pub struct PluginCall {
    envelope: Arc<CallEnvelope>,
    channel: ResultChannel,
}

impl PluginCall {
    pub(crate) fn new(envelope: Arc<CallEnvelope>, channel: ResultChannel) -> Self {
        Self { envelope, channel }
    }

    pub fn callback_id(&self) -> &CallbackId {
        &self.envelope.callback_id
    }

    pub fn plugin_name(&self) -> &str {
        &self.envelope.plugin_name
    }

    pub fn method_name(&self) -> &str {
        &self.envelope.method_name
    }

    pub fn arguments(&self) -> &Arguments {
        &self.envelope.arguments
    }

    pub fn channel(&self) -> &ResultChannel {
        &self.channel
    }

    // -- Argument access --

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.envelope.arguments.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(Value::as_object)
    }

    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.get(key).and_then(Value::as_array)
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key).ok_or_else(|| missing(key, "a string"))
    }

    pub fn require_bool(&self, key: &str) -> Result<bool> {
        self.get_bool(key).ok_or_else(|| missing(key, "a boolean"))
    }

    pub fn require_i64(&self, key: &str) -> Result<i64> {
        self.get_i64(key).ok_or_else(|| missing(key, "an integer"))
    }

    pub fn require_f64(&self, key: &str) -> Result<f64> {
        self.get_f64(key).ok_or_else(|| missing(key, "a number"))
    }

    pub fn require_object(&self, key: &str) -> Result<&Map<String, Value>> {
        self.get_object(key).ok_or_else(|| missing(key, "an object"))
    }

    pub fn require_array(&self, key: &str) -> Result<&Vec<Value>> {
        self.get_array(key).ok_or_else(|| missing(key, "an array"))
    }

    /// Decode the whole argument mapping into a typed struct.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.envelope.arguments.clone()))
            .map_err(|e| BridgeError::BadArguments(e.to_string()))
    }

    // -- Results --

    pub fn resolve(&self, payload: Value) -> Result<()> {
        self.channel.emit(Emission::Success(payload))
    }

    /// Resolve with an empty object.
    pub fn resolve_empty(&self) -> Result<()> {
        self.resolve(Value::Object(Map::new()))
    }

    pub fn reject(&self, message: impl Into<String>, code: Option<&str>) -> Result<()> {
        self.reject_with(CallFailure::new(message, code))
    }

    pub fn reject_with(&self, failure: CallFailure) -> Result<()> {
        self.channel.emit(Emission::Failure(failure))
    }

    /// Non-terminal result; streaming methods only.
    pub fn partial(&self, payload: Value) -> Result<()> {
        self.channel.emit(Emission::Partial(payload))
    }

    /// Close a stream without a final payload.
    pub fn end(&self) -> Result<()> {
        self.channel.emit(Emission::End)
    }

    pub fn is_cancelled(&self) -> bool {
        self.channel.is_cancelled()
    }
}

fn missing(key: &str, expected: &str) -> BridgeError {
    BridgeError::BadArguments(format!("`{key}` must be {expected}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use serde::Deserialize;
    use serde_json::json;
    use tether_core::types::{ResultMode, ResultStatus};

    fn call(envelope: CallEnvelope) -> (PluginCall, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let channel = ResultChannel::detached(
            envelope.callback_id.clone(),
            ResultMode::Single,
            sink.clone(),
        );
        (PluginCall::new(Arc::new(envelope), channel), sink)
    }

    #[test]
    fn typed_accessors() {
        let (call, _) = call(
            CallEnvelope::new("cb", "P", "m")
                .with_arg("name", "ada")
                .with_arg("force", true)
                .with_arg("count", 3)
                .with_arg("ratio", 0.5)
                .with_arg("scopes", json!(["email", "profile"]))
                .with_arg("extra", json!({"k": "v"})),
        );
        assert_eq!(call.get_str("name"), Some("ada"));
        assert_eq!(call.get_bool("force"), Some(true));
        assert_eq!(call.get_i64("count"), Some(3));
        assert_eq!(call.get_f64("ratio"), Some(0.5));
        assert_eq!(call.get_array("scopes").map(Vec::len), Some(2));
        assert_eq!(call.get_object("extra").expect("object")["k"], "v");
        assert!(call.get_str("count").is_none());
    }

    #[test]
    fn require_reports_bad_arguments() {
        let (call, _) = call(CallEnvelope::new("cb", "P", "m").with_arg("n", "x"));
        let err = call.require_i64("n").expect_err("wrong type");
        assert!(matches!(err, BridgeError::BadArguments(ref m) if m.contains("`n`")));
        assert!(call.require_str("missing").is_err());
    }

    #[test]
    fn decode_into_struct() {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Args {
            event_name: String,
        }
        let (call, _) = call(CallEnvelope::new("cb", "P", "m").with_arg("eventName", "ready"));
        let args: Args = call.decode().expect("decode");
        assert_eq!(args.event_name, "ready");

        let (bad, _) = self::call(CallEnvelope::new("cb", "P", "m"));
        assert!(matches!(bad.decode::<Args>(), Err(BridgeError::BadArguments(_))));
    }

    #[test]
    fn reject_sends_error_with_code() {
        let (call, sink) = call(CallEnvelope::new("cb", "P", "m"));
        call.reject("nope", Some("NotSignedIn")).expect("reject");
        let results = sink.results_for(&"cb".into());
        assert_eq!(results[0].status, ResultStatus::Error);
        assert_eq!(results[0].code.as_deref(), Some("NotSignedIn"));
        assert!(call.resolve_empty().is_err());
    }
}
