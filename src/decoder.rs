// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Client-facing types shared by the decoders.

pub mod stateless;

use std::collections::VecDeque;

use bytes::Bytes;

use crate::Resolution;

/// A unit of coded input submitted by the client, e.g. one AV1 temporal unit.
///
/// The decoder only borrows the frame for the duration of a decode call. It is then handed back
/// exactly once: either to the backend along with the picture to display, or to the client
/// through a [`DecoderEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecFrame {
    system_frame_number: u32,
    timestamp: u64,
    input: Bytes,
    decode_only: bool,
}

impl CodecFrame {
    pub fn new(system_frame_number: u32, timestamp: u64, input: impl Into<Bytes>) -> Self {
        Self {
            system_frame_number,
            timestamp,
            input: input.into(),
            decode_only: false,
        }
    }

    /// Number identifying this frame in the client's input order.
    pub fn system_frame_number(&self) -> u32 {
        self.system_frame_number
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The coded data of the frame.
    pub fn input(&self) -> &Bytes {
        &self.input
    }

    /// Marks the frame as only contributing to future references. It will not produce any
    /// displayable output.
    pub fn set_decode_only(&mut self) {
        self.decode_only = true;
    }

    pub fn is_decode_only(&self) -> bool {
        self.decode_only
    }
}

/// Format of the input stream as announced by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamParameters {
    pub resolution: Resolution,
}

/// Events that can be retrieved using the `next_event` method of a decoder.
#[derive(Debug, PartialEq, Eq)]
pub enum DecoderEvent {
    /// The frame has been decoded but has nothing to display. It is returned without payload.
    FrameFinished(CodecFrame),
    /// The frame has been discarded, either because decoding it failed or because it belongs to
    /// a layer that is not output.
    FrameDropped(CodecFrame),
}

impl DecoderEvent {
    /// The client frame carried by this event.
    pub fn frame(&self) -> &CodecFrame {
        match self {
            DecoderEvent::FrameFinished(frame) | DecoderEvent::FrameDropped(frame) => frame,
        }
    }
}

/// A queue where the frames returned to the client wait until they are retrieved.
#[derive(Debug, Default)]
struct EventQueue {
    /// Queue of all the events waiting to be sent to the client.
    queue: VecDeque<DecoderEvent>,
}

impl EventQueue {
    /// Push `event` to the back of the queue.
    fn push(&mut self, event: DecoderEvent) {
        self.queue.push_back(event)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

/// Allows us to manipulate the event list like an iterator without consuming it.
impl<'a> Iterator for &'a mut EventQueue {
    type Item = DecoderEvent;

    /// Returns the next event (if any) waiting to be dequeued.
    fn next(&mut self) -> Option<DecoderEvent> {
        self.queue.pop_front()
    }
}
