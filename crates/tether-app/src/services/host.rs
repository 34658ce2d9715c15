// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// JSON-lines transport.
//
// Each input line is one call envelope; each output line is one outbound
// message (`{"type":"result",...}` or `{"type":"event",...}`). Input EOF
// means the web layer went away: the bridge is torn down and whatever was
// already queued is flushed.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use tether_bridge::Bridge;
use tether_core::error::{BridgeError, Result};
use tether_core::types::{CallEnvelope, CallbackId, OutboundMessage, ResultMessage};

/// Pump envelopes from `input` into the bridge and outbound messages from
/// `outbound` to `output` until input closes.
pub async fn serve<R, W>(
    bridge: &Bridge,
    input: R,
    mut output: W,
    mut outbound: UnboundedReceiver<OutboundMessage>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut received = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                received += 1;
                if let Some(reply) = handle_line(bridge, &line) {
                    write_message(&mut output, &reply).await?;
                }
            }
            Some(message) = outbound.recv() => {
                write_message(&mut output, &message).await?;
            }
        }
    }

    info!(received, "input closed; tearing bridge down");
    bridge.teardown();
    while let Ok(message) = outbound.try_recv() {
        write_message(&mut output, &message).await?;
    }
    output.flush().await?;
    Ok(())
}

/// Dispatch one input line. Returns a reply only when the line itself is
/// answered here instead of by the bridge.
fn handle_line(bridge: &Bridge, line: &str) -> Option<OutboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let envelope: CallEnvelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => return malformed(line, &e),
    };

    let callback_id = envelope.callback_id.clone();
    match bridge.dispatch(envelope) {
        Ok(_) => debug!(%callback_id, "envelope dispatched"),
        Err(err) => warn!(%callback_id, error = %err, "envelope refused"),
    }
    None
}

/// An envelope that does not decode is answered with `BadArguments` when its
/// callback id can still be read, and dropped otherwise.
fn malformed(line: &str, error: &serde_json::Error) -> Option<OutboundMessage> {
    let callback_id = serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.get("callback_id")?.as_str().map(CallbackId::from));
    match callback_id {
        Some(callback_id) => {
            warn!(%callback_id, error = %error, "malformed envelope");
            let failure = BridgeError::BadArguments(error.to_string()).into_failure();
            Some(OutboundMessage::Result(ResultMessage::error(callback_id, failure)))
        }
        None => {
            warn!(error = %error, "unreadable input line dropped");
            None
        }
    }
}

async fn write_message<W>(output: &mut W, message: &OutboundMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    output.write_all(&bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use tether_bridge::{ChannelSink, InlineExecutor, Scheduler};
    use tether_plugins::{GoogleAuthPlugin, UnavailableProvider};

    async fn run(input: &str) -> HashMap<String, Value> {
        let (sink, rx) = ChannelSink::new();
        let bridge = Bridge::builder(Arc::new(sink))
            .scheduler(Scheduler::new(Arc::new(InlineExecutor), Arc::new(InlineExecutor)))
            .plugin(Arc::new(GoogleAuthPlugin::new(Arc::new(UnavailableProvider))))
            .build()
            .expect("build");

        let mut output = Vec::new();
        serve(&bridge, input.as_bytes(), &mut output, rx)
            .await
            .expect("serve");
        assert!(bridge.is_torn_down());

        String::from_utf8(output)
            .expect("utf-8")
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).expect("json line"))
            .filter_map(|v| Some((v.get("callback_id")?.as_str()?.to_owned(), v)))
            .collect()
    }

    #[tokio::test]
    async fn answers_every_readable_envelope() {
        let input = [
            r#"{"callback_id":"1","plugin_name":"GoogleAuth","method_name":"isSignedIn"}"#,
            "",
            r#"{"callback_id":"2","plugin_name":"GoogleAuth","method_name":"doesNotExist"}"#,
            r#"{"callback_id":"3","plugin_name":42}"#,
            "not json at all",
            r#"{"callback_id":"4","plugin_name":"GoogleAuth","method_name":"signIn"}"#,
        ]
        .join("\n");

        let out = run(&input).await;
        assert_eq!(out.len(), 4);

        assert_eq!(out["1"]["type"], "result");
        assert_eq!(out["1"]["status"], "success");
        assert_eq!(out["1"]["payload"]["isSignedIn"], false);
        assert_eq!(out["2"]["code"], "MethodNotFound");
        assert_eq!(out["3"]["code"], "BadArguments");
        assert_eq!(out["4"]["status"], "error");
        assert_eq!(out["4"]["code"], "Unavailable");
    }

    #[tokio::test]
    async fn add_listener_round_trip() {
        let input = r#"{"callback_id":"l","plugin_name":"GoogleAuth","method_name":"addListener","arguments":{"eventName":"signInRestored"}}"#;
        let out = run(input).await;
        assert!(out["l"]["payload"]["listenerId"].is_string());
    }

    #[tokio::test]
    async fn empty_input_just_tears_down() {
        assert!(run("").await.is_empty());
    }
}
