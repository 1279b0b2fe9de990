// SPDX-License-Identifier: MPL-2.0

//! Client session state kept across network connections.

pub mod client_session;
pub mod inflight;

pub use client_session::{ClientSession, InboundAction, SubAckOutcome, Subscription};
pub use inflight::{Direction, HandshakeStage, InflightMessage, InflightQueue};
