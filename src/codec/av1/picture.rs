// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::codec::av1::parser::FrameHeaderObu;

/// Data associated with an AV1 picture.
///
/// `H` is the backend handle of the picture, e.g. the surface the picture is decoded into. It is
/// set by the backend when the picture is created and dropped with the last holder of the
/// picture.
#[derive(Debug, Clone, Default)]
pub struct Av1Picture<H> {
    /// The frame header this picture was created from.
    pub frame_hdr: FrameHeaderObu,
    /// Number of the client frame this picture originates from.
    pub system_frame_number: u32,
    pub display_frame_id: u32,
    pub show_frame: bool,
    pub showable_frame: bool,
    /// Whether film grain must be applied to the picture when it is output.
    pub apply_grain: bool,
    /// Backend resource for this picture.
    pub handle: Option<H>,
}

impl<H> Av1Picture<H> {
    /// Instantiates a new picture for a frame that carries coded data.
    pub fn new_from_header(frame_hdr: FrameHeaderObu, system_frame_number: u32) -> Self {
        Self {
            display_frame_id: frame_hdr.display_frame_id,
            show_frame: frame_hdr.show_frame,
            showable_frame: frame_hdr.showable_frame,
            apply_grain: frame_hdr.film_grain_params.apply_grain,
            system_frame_number,
            frame_hdr,
            handle: None,
        }
    }

    /// Turns a picture obtained by duplicating `reference` into the picture shown by a
    /// `show_existing_frame` header.
    ///
    /// The header is taken from `frame_hdr`, but the render size is the one of `reference`: the
    /// duplicate is the same picture.
    pub fn rebind_to_header(
        &mut self,
        frame_hdr: FrameHeaderObu,
        system_frame_number: u32,
        reference: &Av1Picture<H>,
    ) {
        self.system_frame_number = system_frame_number;
        self.show_frame = frame_hdr.show_frame;
        self.showable_frame = frame_hdr.showable_frame;
        self.frame_hdr = frame_hdr;
        self.frame_hdr.render_width = reference.frame_hdr.render_width;
        self.frame_hdr.render_height = reference.frame_hdr.render_height;
    }

    /// Whether this picture must be presented at the end of its temporal unit.
    pub fn is_shown(&self) -> bool {
        self.frame_hdr.show_frame || self.frame_hdr.show_existing_frame
    }

    /// Whether this picture only re-displays a picture of the DPB.
    pub fn is_existing_frame(&self) -> bool {
        self.frame_hdr.show_existing_frame
    }
}
