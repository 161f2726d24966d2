// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This file contains a dummy backend whose only purpose is to let the decoder
//! run so we can test it in isolation.
//!
//! Instead of decoding, the backend records every call it receives and accumulates the tile
//! payloads of each picture into its surface, so tests can check what reached the "hardware".

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::anyhow;

use crate::codec::av1::dpb::Dpb;
use crate::codec::av1::parser::Profile;
use crate::codec::av1::parser::SequenceHeaderObu;
use crate::codec::av1::parser::TileGroupObu;
use crate::codec::av1::picture::Av1Picture;
use crate::decoder::stateless::av1::StatelessAV1DecoderBackend;
use crate::decoder::stateless::StatelessBackendError;
use crate::decoder::stateless::StatelessBackendResult;
use crate::decoder::CodecFrame;

/// Stand-in for a decode target.
#[derive(Debug, Default)]
pub struct Surface {
    pub id: u32,
    /// Concatenation of the tile payloads submitted for the picture.
    pub data: Vec<u8>,
    /// CRC32 of `data`, computed when the picture is ended.
    pub crc: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Handle {
    pub surface: Rc<RefCell<Surface>>,
}

/// A backend call, identified by the system frame number of the picture involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    NewSequence(Profile),
    NewPicture(u32),
    StartPicture { frame: u32, num_refs: usize },
    DecodeTile(u32),
    EndPicture(u32),
    OutputPicture(u32),
    DuplicatePicture(u32),
}

/// Dummy backend that records its calls.
#[derive(Default)]
pub(crate) struct Backend {
    pub calls: Vec<Call>,
    pub output: Vec<(CodecFrame, Rc<Av1Picture<Handle>>)>,
    /// Name of the callback that should fail, if any.
    pub reject: Option<&'static str>,
    next_surface_id: u32,
}

impl Backend {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    /// Number of recorded calls matching `pred`.
    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn check(&self, operation: &'static str) -> StatelessBackendResult<()> {
        if self.reject == Some(operation) {
            Err(StatelessBackendError::Other(anyhow!("{} rejected by test", operation)))
        } else {
            Ok(())
        }
    }

    fn surface(picture: &mut Av1Picture<Handle>) -> StatelessBackendResult<&mut Handle> {
        picture
            .handle
            .as_mut()
            .ok_or(StatelessBackendError::Other(anyhow!("picture has no surface")))
    }
}

impl StatelessAV1DecoderBackend for Backend {
    type Handle = Handle;

    fn new_sequence(&mut self, sequence: &SequenceHeaderObu) -> StatelessBackendResult<()> {
        self.calls.push(Call::NewSequence(sequence.seq_profile));
        self.check("new_sequence")
    }

    fn new_picture(
        &mut self,
        frame: &CodecFrame,
        picture: &mut Av1Picture<Self::Handle>,
    ) -> StatelessBackendResult<()> {
        self.calls.push(Call::NewPicture(frame.system_frame_number()));
        self.check("new_picture")?;

        self.next_surface_id += 1;
        picture.handle = Some(Handle {
            surface: Rc::new(RefCell::new(Surface {
                id: self.next_surface_id,
                ..Default::default()
            })),
        });

        Ok(())
    }

    fn start_picture(
        &mut self,
        picture: &mut Av1Picture<Self::Handle>,
        dpb: &Dpb<Self::Handle>,
    ) -> StatelessBackendResult<()> {
        self.calls.push(Call::StartPicture {
            frame: picture.system_frame_number,
            num_refs: dpb.len(),
        });
        self.check("start_picture")
    }

    fn decode_tile(
        &mut self,
        picture: &mut Av1Picture<Self::Handle>,
        tile_group: TileGroupObu,
    ) -> StatelessBackendResult<()> {
        self.calls.push(Call::DecodeTile(picture.system_frame_number));
        self.check("decode_tile")?;

        let handle = Self::surface(picture)?;
        handle
            .surface
            .borrow_mut()
            .data
            .extend_from_slice(tile_group.obu.as_ref());

        Ok(())
    }

    fn end_picture(
        &mut self,
        picture: &mut Av1Picture<Self::Handle>,
    ) -> StatelessBackendResult<()> {
        self.calls.push(Call::EndPicture(picture.system_frame_number));
        self.check("end_picture")?;

        let handle = Self::surface(picture)?;
        let mut surface = handle.surface.borrow_mut();
        let crc = crc32fast::hash(&surface.data);
        surface.crc = Some(crc);

        Ok(())
    }

    fn output_picture(
        &mut self,
        frame: CodecFrame,
        picture: Rc<Av1Picture<Self::Handle>>,
    ) -> StatelessBackendResult<()> {
        self.calls.push(Call::OutputPicture(frame.system_frame_number()));
        self.check("output_picture")?;
        self.output.push((frame, picture));

        Ok(())
    }

    fn duplicate_picture(
        &mut self,
        picture: &Av1Picture<Self::Handle>,
    ) -> StatelessBackendResult<Av1Picture<Self::Handle>> {
        self.calls.push(Call::DuplicatePicture(picture.system_frame_number));
        self.check("duplicate_picture")?;

        Ok(picture.clone())
    }
}
