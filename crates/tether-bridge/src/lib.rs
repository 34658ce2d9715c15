// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tether: Plugin call bridge.
//
// Lets a web layer invoke native plugin methods by name, correlates each
// invocation with its result(s) by callback id, runs every handler on the
// execution context it declares, and carries plugin events back out.

pub mod bridge;
pub mod call;
mod calls;
pub mod channel;
pub mod dispatcher;
pub mod events;
pub mod executor;
pub mod plugin;
pub mod registry;
pub mod sink;

pub use bridge::{Bridge, BridgeBuilder};
pub use call::PluginCall;
pub use channel::{ChannelState, ResultChannel};
pub use dispatcher::Dispatcher;
pub use events::{EventBus, Listener, ListenerRegistry, listener_fn};
pub use executor::{BackgroundPool, Executor, InlineExecutor, Job, MainLoop, Scheduler};
pub use plugin::{Plugin, PluginContext};
pub use registry::{Handler, MethodDescriptor, MethodRegistry};
pub use sink::{ChannelSink, MemorySink, MessageSink};
