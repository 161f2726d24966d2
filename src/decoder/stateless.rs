// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Stateless decoders.
//!
//! Stateless here refers to the backend API targeted by these decoders. The decoders themselves
//! hold the decoding state (parser state, reference pictures) so the backend doesn't need to.

pub mod av1;

use thiserror::Error;

use crate::codec::av1::parser::ObuType;

/// Error returned by stateless backend methods.
#[derive(Error, Debug)]
pub enum StatelessBackendError {
    #[error("not enough resources to proceed with the operation now")]
    OutOfResources,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type returned by stateless backend methods.
pub type StatelessBackendResult<T> = Result<T, StatelessBackendError>;

/// Error returned when a frame could not be decoded.
///
/// None of these errors is fatal to the stream: the frame is dropped, and the next frame is
/// decoded from a clean state.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("the decoder has not been started")]
    NotStarted,
    #[error("failed to parse the bitstream: {0:#}")]
    Parse(anyhow::Error),
    #[error("backend rejected {operation}: {source}")]
    BackendRejected {
        operation: &'static str,
        #[source]
        source: StatelessBackendError,
    },
    #[error("no reference picture in slot {0} to show")]
    ReferenceNotFound(u32),
    #[error("broken stream: {0}")]
    ProtocolViolation(&'static str),
    #[error("unrecognized OBU type {0:?}")]
    UnknownObu(ObuType),
}

impl DecodeError {
    /// Returns a closure wrapping a backend error into a [`DecodeError::BackendRejected`] for
    /// `operation`, for use with `map_err`.
    pub(crate) fn backend(operation: &'static str) -> impl FnOnce(StatelessBackendError) -> Self {
        move |source| DecodeError::BackendRejected { operation, source }
    }
}
