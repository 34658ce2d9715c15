// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Host services: descriptor loading and the JSON-lines transport that stands
// in for the web layer.

pub mod descriptor;
pub mod host;
