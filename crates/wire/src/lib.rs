// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer transport protocol for the bridge daemon.
//!
//! Wire format: a single JSON object per message, carried as one WebSocket
//! text frame. Every object has a `type` discriminator and an `origin` field.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod wire;

pub use frame::{Envelope, Event, Hello, Origin, Request, Response, ResponseError, ResponseStatus};
pub use wire::{decode, encode, WireError};
