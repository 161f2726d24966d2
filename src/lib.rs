// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Stateless AV1 decoding core.
//!
//! This crate drives the frame-level state machine of an AV1 decoder: it walks the OBUs of a
//! temporal unit, keeps the reference slots of the decoded picture buffer up to date, and hands
//! the actual decoding work to a [backend](crate::decoder::stateless::av1::StatelessAV1DecoderBackend)
//! that talks to the hardware.
//!
//! Bit-level OBU parsing is left to an external parser implementing
//! [`ObuParser`](crate::codec::av1::parser::ObuParser).

pub mod codec;
pub mod decoder;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl From<(u32, u32)> for Resolution {
    fn from(value: (u32, u32)) -> Self {
        Self {
            width: value.0,
            height: value.1,
        }
    }
}
