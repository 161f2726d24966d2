// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Stateless AV1 decoder.
//!
//! [`Av1Decoder`] processes one temporal unit per call to [`Av1Decoder::handle_frame`]. The OBUs
//! of the unit are identified and parsed by an [`ObuParser`], and the picture they describe is
//! decoded by a [`StatelessAV1DecoderBackend`]. The decoder itself keeps track of the reference
//! pictures and decides which pictures are output.

use std::rc::Rc;

use anyhow::anyhow;

use crate::codec::av1::dpb::Dpb;
use crate::codec::av1::helpers;
use crate::codec::av1::parser::FrameHeaderObu;
use crate::codec::av1::parser::FrameObu;
use crate::codec::av1::parser::FrameType;
use crate::codec::av1::parser::Obu;
use crate::codec::av1::parser::ObuParser;
use crate::codec::av1::parser::ObuType;
use crate::codec::av1::parser::Profile;
use crate::codec::av1::parser::SequenceHeaderObu;
use crate::codec::av1::parser::TileGroupObu;
use crate::codec::av1::picture::Av1Picture;
use crate::decoder::stateless::DecodeError;
use crate::decoder::stateless::StatelessBackendResult;
use crate::decoder::CodecFrame;
use crate::decoder::DecoderEvent;
use crate::decoder::EventQueue;
use crate::decoder::StreamParameters;
use crate::Resolution;

#[cfg(test)]
mod dummy;

/// Highest operating point that can be selected.
pub const MAX_OPERATING_POINT: u32 = 31;

/// Stateless backend methods specific to AV1.
///
/// All methods are called synchronously from [`Av1Decoder::handle_frame`]. Any error aborts the
/// decoding of the current frame.
pub trait StatelessAV1DecoderBackend {
    /// Backend resource attached to a picture, e.g. its decode target. Duplicated pictures share
    /// it, so cloning it must not copy the decoded content.
    type Handle: Clone;

    /// Called when a Sequence Header OBU different from the previous one is parsed.
    fn new_sequence(&mut self, sequence: &SequenceHeaderObu) -> StatelessBackendResult<()>;

    /// Called when the decoder determines that a new picture was found. The backend allocates all
    /// the resources it needs to process that picture and stores them into `picture.handle`.
    fn new_picture(
        &mut self,
        frame: &CodecFrame,
        picture: &mut Av1Picture<Self::Handle>,
    ) -> StatelessBackendResult<()>;

    /// Called to set the global parameters of a picture. `dpb` holds the reference pictures the
    /// frame header may point to.
    fn start_picture(
        &mut self,
        picture: &mut Av1Picture<Self::Handle>,
        dpb: &Dpb<Self::Handle>,
    ) -> StatelessBackendResult<()>;

    /// Called to dispatch a decode operation to the backend.
    fn decode_tile(
        &mut self,
        picture: &mut Av1Picture<Self::Handle>,
        tile_group: TileGroupObu,
    ) -> StatelessBackendResult<()>;

    /// Called when the decoder wants the backend to finish the decoding operations for
    /// `picture`. At this point, `decode_tile` has been called for all tiles.
    fn end_picture(&mut self, picture: &mut Av1Picture<Self::Handle>)
        -> StatelessBackendResult<()>;

    /// Called with a displayable picture and the frame it belongs to. Ownership of both is
    /// transferred to the backend.
    fn output_picture(
        &mut self,
        frame: CodecFrame,
        picture: Rc<Av1Picture<Self::Handle>>,
    ) -> StatelessBackendResult<()>;

    /// Creates the picture displayed by a `show_existing_frame` header from the reference
    /// `picture`. The new picture must alias the decoded content of `picture`.
    fn duplicate_picture(
        &mut self,
        picture: &Av1Picture<Self::Handle>,
    ) -> StatelessBackendResult<Av1Picture<Self::Handle>> {
        Ok(picture.clone())
    }
}

impl<B> StatelessAV1DecoderBackend for Box<B>
where
    B: StatelessAV1DecoderBackend + ?Sized,
{
    type Handle = B::Handle;

    fn new_sequence(&mut self, sequence: &SequenceHeaderObu) -> StatelessBackendResult<()> {
        (**self).new_sequence(sequence)
    }

    fn new_picture(
        &mut self,
        frame: &CodecFrame,
        picture: &mut Av1Picture<Self::Handle>,
    ) -> StatelessBackendResult<()> {
        (**self).new_picture(frame, picture)
    }

    fn start_picture(
        &mut self,
        picture: &mut Av1Picture<Self::Handle>,
        dpb: &Dpb<Self::Handle>,
    ) -> StatelessBackendResult<()> {
        (**self).start_picture(picture, dpb)
    }

    fn decode_tile(
        &mut self,
        picture: &mut Av1Picture<Self::Handle>,
        tile_group: TileGroupObu,
    ) -> StatelessBackendResult<()> {
        (**self).decode_tile(picture, tile_group)
    }

    fn end_picture(
        &mut self,
        picture: &mut Av1Picture<Self::Handle>,
    ) -> StatelessBackendResult<()> {
        (**self).end_picture(picture)
    }

    fn output_picture(
        &mut self,
        frame: CodecFrame,
        picture: Rc<Av1Picture<Self::Handle>>,
    ) -> StatelessBackendResult<()> {
        (**self).output_picture(frame, picture)
    }

    fn duplicate_picture(
        &mut self,
        picture: &Av1Picture<Self::Handle>,
    ) -> StatelessBackendResult<Av1Picture<Self::Handle>> {
        (**self).duplicate_picture(picture)
    }
}

/// Client-selectable decoding parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Av1DecoderConfig {
    /// Operating point to decode in a scalable stream.
    pub operating_point: u32,
}

impl Av1DecoderConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.operating_point > MAX_OPERATING_POINT {
            return Err(anyhow!(
                "Invalid operating point {} (max {})",
                self.operating_point,
                MAX_OPERATING_POINT
            ));
        }
        Ok(())
    }
}

/// What became of a frame passed to [`Av1Decoder::handle_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame and its picture have been handed to the backend for display.
    Output,
    /// The frame only updated the references. It is returned through
    /// [`DecoderEvent::FrameFinished`].
    DecodeOnly,
    /// The picture belongs to a spatial layer that is not output. The frame is returned through
    /// [`DecoderEvent::FrameDropped`].
    Dropped,
}

/// Decoding state of an AV1 stream, preserved between temporal units.
pub struct AV1DecoderState<H> {
    /// The reference frames in use.
    dpb: Dpb<H>,

    /// The last sequence header accepted by the backend.
    sequence: Option<SequenceHeaderObu>,

    /// Maximum resolution of the current sequence.
    max_resolution: Resolution,

    /// Profile of the current sequence.
    profile: Option<Profile>,

    /// The picture currently being decoded. Only set while a temporal unit is being processed.
    current_pic: Option<Av1Picture<H>>,

    /// Spatial id of the last OBU carrying picture data in the current temporal unit.
    spatial_id: u32,

    /// Keep track of the number of frames we've processed for logging purposes.
    frame_count: u32,
}

impl<H> Default for AV1DecoderState<H> {
    fn default() -> Self {
        Self {
            dpb: Default::default(),
            sequence: Default::default(),
            max_resolution: Default::default(),
            profile: Default::default(),
            current_pic: Default::default(),
            spatial_id: Default::default(),
            frame_count: Default::default(),
        }
    }
}

/// AV1 decoder driving a parser `P` and a backend `B`.
///
/// The decoder is created stopped: [`start`](Av1Decoder::start) must be called before frames
/// are submitted.
pub struct Av1Decoder<P, B>
where
    P: ObuParser,
    B: StatelessAV1DecoderBackend,
{
    config: Av1DecoderConfig,

    /// AV1 bitstream parser.
    parser: P,

    /// The backend used for hardware acceleration.
    backend: B,

    /// Codec-specific state.
    codec: AV1DecoderState<B::Handle>,

    /// Format of the input, if announced by the client.
    input_state: Option<StreamParameters>,

    /// Frames handed back to the client.
    events: EventQueue,

    /// Whether the decoder accepts input.
    running: bool,
}

impl<P, B> Av1Decoder<P, B>
where
    P: ObuParser,
    B: StatelessAV1DecoderBackend,
{
    pub fn new(parser: P, backend: B) -> Self {
        Self {
            config: Default::default(),
            parser,
            backend,
            codec: Default::default(),
            input_state: None,
            events: Default::default(),
            running: false,
        }
    }

    /// Creates a decoder using `config`, which is validated first.
    pub fn with_config(parser: P, backend: B, config: Av1DecoderConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let mut decoder = Self::new(parser, backend);
        decoder.config = config;
        Ok(decoder)
    }

    /// Selects the operating point used from the next temporal unit onwards.
    pub fn set_operating_point(&mut self, operating_point: u32) -> anyhow::Result<()> {
        let config = Av1DecoderConfig { operating_point };
        config.validate()?;

        self.config = config;
        Ok(())
    }

    pub fn operating_point(&self) -> u32 {
        self.config.operating_point
    }

    pub fn config(&self) -> &Av1DecoderConfig {
        &self.config
    }

    /// Prepares the decoder to receive a new stream.
    pub fn start(&mut self) {
        log::debug!("start");

        self.reset();
        self.running = true;
    }

    /// Stops the decoder. Input is refused until the next call to [`start`](Self::start).
    pub fn stop(&mut self) {
        log::debug!("stop");

        self.reset();
        self.input_state = None;
        self.running = false;
    }

    /// Discards all the decoding state, e.g. before seeking.
    pub fn flush(&mut self) {
        log::debug!("flush");

        self.reset();
    }

    /// Called at the end of the input. All the frames have already been returned, so this only
    /// resets the decoding state.
    pub fn drain(&mut self) {
        log::debug!("drain");

        self.reset();
    }

    /// Same as [`drain`](Self::drain), called when the stream ends for good.
    pub fn finish(&mut self) {
        log::debug!("finish");

        self.reset();
    }

    /// Records the input format announced by the client. Its resolution is used as maximum
    /// resolution until a sequence header says otherwise.
    pub fn set_format(&mut self, params: StreamParameters) {
        log::debug!("Set format {:?}", params);

        self.codec.max_resolution = params.resolution;
        self.input_state = Some(params);
    }

    pub fn input_format(&self) -> Option<&StreamParameters> {
        self.input_state.as_ref()
    }

    /// Maximum resolution of the current sequence.
    pub fn max_resolution(&self) -> Resolution {
        self.codec.max_resolution
    }

    /// Profile of the current sequence, if any.
    pub fn profile(&self) -> Option<Profile> {
        self.codec.profile
    }

    /// The reference pictures.
    pub fn dpb(&self) -> &Dpb<B::Handle> {
        &self.codec.dpb
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    pub fn parser_mut(&mut self) -> &mut P {
        &mut self.parser
    }

    /// Returns the next event, if there is any pending.
    pub fn next_event(&mut self) -> Option<DecoderEvent> {
        (&mut self.events).next()
    }

    /// Number of events waiting to be retrieved.
    pub fn num_pending_events(&self) -> usize {
        self.events.len()
    }

    fn reset(&mut self) {
        log::debug!("Resetting the decoding state");

        self.codec = Default::default();
        self.parser.reset(false);
    }

    /// Decodes the temporal unit contained in `frame`.
    ///
    /// On success, the frame has either been passed to the backend along with its picture, or
    /// is returned through [`next_event`](Self::next_event). On error, the frame is returned
    /// through [`DecoderEvent::FrameDropped`] and the decoder is ready for the next frame.
    pub fn handle_frame(&mut self, mut frame: CodecFrame) -> Result<FrameOutcome, DecodeError> {
        log::trace!(
            "handle frame id {}, {} bytes",
            frame.system_frame_number(),
            frame.input().len()
        );
        debug_assert!(self.codec.current_pic.is_none());

        let res = self.decode_temporal_unit(&mut frame);
        // No picture is current past this point, whatever happened.
        self.codec.current_pic = None;

        match res {
            Ok(picture) => {
                self.codec.frame_count += 1;
                self.finish_frame(frame, picture)
            }
            Err(err) => {
                log::warn!(
                    "Failed to handle the frame {}: {}",
                    frame.system_frame_number(),
                    err
                );
                self.events.push(DecoderEvent::FrameDropped(frame));
                Err(err)
            }
        }
    }

    /// Runs all the OBUs of `frame` and commits the resulting picture to the DPB.
    fn decode_temporal_unit(
        &mut self,
        frame: &mut CodecFrame,
    ) -> Result<Rc<Av1Picture<B::Handle>>, DecodeError> {
        if !self.running {
            return Err(DecodeError::NotStarted);
        }

        self.parser.set_operating_point(self.config.operating_point);
        self.codec.spatial_id = 0;

        let input = frame.input().clone();
        let mut offset = 0;
        while offset < input.len() {
            let (obu, consumed) = self
                .parser
                .identify_one_obu(&input, offset)
                .map_err(DecodeError::Parse)?;
            if consumed == 0 {
                return Err(DecodeError::ProtocolViolation("OBU of size zero"));
            }

            self.decode_one_obu(obu, frame)?;
            offset += consumed;
        }

        let mut picture = self.codec.current_pic.take().ok_or(DecodeError::ProtocolViolation(
            "no valid picture after exhausting the input frame",
        ))?;

        if !picture.is_existing_frame() {
            self.backend
                .end_picture(&mut picture)
                .map_err(DecodeError::backend("end_picture"))?;
        }

        let picture = Rc::new(picture);
        self.update_references(&picture);

        Ok(picture)
    }

    fn decode_one_obu(&mut self, obu: Obu, frame: &mut CodecFrame) -> Result<(), DecodeError> {
        let obu_type = obu.header.obu_type;
        log::trace!("Decode obu {}", obu_type.name());

        let res = match obu_type {
            ObuType::SequenceHeader => self.process_sequence(&obu),
            ObuType::FrameHeader => self.process_frame_header(&obu, frame),
            ObuType::Frame => self.process_frame(obu, frame),
            ObuType::TileGroup => self.process_tile_group(obu),
            ObuType::TemporalDelimiter => self
                .parser
                .parse_temporal_delimiter_obu(&obu)
                .map_err(DecodeError::Parse),
            ObuType::Metadata
            | ObuType::RedundantFrameHeader
            | ObuType::TileList
            | ObuType::Padding => Ok(()),
            other => Err(DecodeError::UnknownObu(other)),
        };

        if let Err(err) = &res {
            log::warn!("Failed to handle {} OBU: {}", obu_type.name(), err);
        }

        res
    }

    fn process_sequence(&mut self, obu: &Obu) -> Result<(), DecodeError> {
        let sequence = self
            .parser
            .parse_sequence_header_obu(obu)
            .map_err(DecodeError::Parse)?;

        if self.codec.sequence.as_ref() == Some(&sequence) {
            log::debug!("Got the same sequence header");
            return Ok(());
        }

        if self.codec.current_pic.is_some() {
            return Err(DecodeError::ProtocolViolation(
                "a new sequence header was found while a picture is being decoded",
            ));
        }

        let max_resolution =
            Resolution::from((sequence.max_frame_width(), sequence.max_frame_height()));
        log::debug!(
            "Sequence updated, profile {:?} -> {:?}, max resolution: {:?} -> {:?}",
            self.codec.profile,
            sequence.seq_profile,
            self.codec.max_resolution,
            max_resolution
        );

        if let Err(err) = self.backend.new_sequence(&sequence) {
            log::error!("backend does not accept the new sequence");
            return Err(DecodeError::backend("new_sequence")(err));
        }

        self.codec.profile = Some(sequence.seq_profile);
        self.codec.max_resolution = max_resolution;
        self.codec.sequence = Some(sequence);
        self.codec.dpb.clear();

        Ok(())
    }

    fn process_frame_header(
        &mut self,
        obu: &Obu,
        frame: &mut CodecFrame,
    ) -> Result<(), DecodeError> {
        self.codec.spatial_id = obu.header.spatial_id;

        let frame_header = self
            .parser
            .parse_frame_header_obu(obu)
            .map_err(DecodeError::Parse)?;

        self.decode_frame_header(frame_header, frame)
    }

    fn process_frame(&mut self, obu: Obu, frame: &mut CodecFrame) -> Result<(), DecodeError> {
        self.codec.spatial_id = obu.header.spatial_id;

        let FrameObu { header, tile_group } = self
            .parser
            .parse_frame_obu(obu)
            .map_err(DecodeError::Parse)?;

        self.decode_frame_header(header, frame)?;
        self.decode_tile_group(tile_group)
    }

    fn process_tile_group(&mut self, obu: Obu) -> Result<(), DecodeError> {
        self.codec.spatial_id = obu.header.spatial_id;

        let tile_group = self
            .parser
            .parse_tile_group_obu(obu)
            .map_err(DecodeError::Parse)?;

        self.decode_tile_group(tile_group)
    }

    /// Creates the current picture from `frame_header`.
    fn decode_frame_header(
        &mut self,
        frame_header: FrameHeaderObu,
        frame: &mut CodecFrame,
    ) -> Result<(), DecodeError> {
        log::debug!(
            "Processing frame {} with system frame number {}",
            self.codec.frame_count,
            frame.system_frame_number()
        );

        if self.codec.current_pic.is_some() {
            return Err(DecodeError::ProtocolViolation(
                "already have a picture for the current frame",
            ));
        }

        let picture = if frame_header.show_existing_frame {
            self.duplicate_reference(frame_header, frame)?
        } else {
            self.new_picture(frame_header, frame)?
        };

        self.codec.current_pic = Some(picture);
        Ok(())
    }

    /// Allocates the picture of a frame carrying coded data.
    fn new_picture(
        &mut self,
        frame_header: FrameHeaderObu,
        frame: &mut CodecFrame,
    ) -> Result<Av1Picture<B::Handle>, DecodeError> {
        let decode_only = !frame_header.show_frame && !frame_header.showable_frame;
        let mut picture = Av1Picture::new_from_header(frame_header, frame.system_frame_number());

        if decode_only {
            frame.set_decode_only();
        }

        self.backend
            .new_picture(frame, &mut picture)
            .map_err(DecodeError::backend("new_picture"))?;
        self.backend
            .start_picture(&mut picture, &self.codec.dpb)
            .map_err(DecodeError::backend("start_picture"))?;

        Ok(picture)
    }

    /// Creates the picture of a `show_existing_frame` header from the picture it shows.
    fn duplicate_reference(
        &mut self,
        frame_header: FrameHeaderObu,
        frame: &CodecFrame,
    ) -> Result<Av1Picture<B::Handle>, DecodeError> {
        let idx = frame_header.frame_to_show_map_idx;
        let ref_picture = match self.codec.dpb.get(idx as usize) {
            Some(picture) => Rc::clone(picture),
            None => {
                log::warn!("Failed to find the frame index {} to show", idx);
                return Err(DecodeError::ReferenceNotFound(idx));
            }
        };

        self.parser
            .reference_frame_loading(&ref_picture.frame_hdr)
            .map_err(|err| DecodeError::Parse(err.context("loading the reference frame failed")))?;

        let mut picture = self
            .backend
            .duplicate_picture(&ref_picture)
            .map_err(DecodeError::backend("duplicate_picture"))?;
        picture.rebind_to_header(frame_header, frame.system_frame_number(), &ref_picture);

        Ok(picture)
    }

    fn decode_tile_group(&mut self, tile_group: TileGroupObu) -> Result<(), DecodeError> {
        let picture = match self.codec.current_pic.as_mut() {
            Some(picture) if picture.is_existing_frame() => {
                return Err(DecodeError::ProtocolViolation(
                    "cannot decode a tile group for a frame with show_existing_frame set",
                ));
            }
            Some(picture) => picture,
            None => {
                return Err(DecodeError::ProtocolViolation(
                    "cannot decode a tile group without first decoding a frame header",
                ));
            }
        };

        self.backend
            .decode_tile(picture, tile_group)
            .map_err(DecodeError::backend("decode_tile"))
    }

    /// Stores `picture` in the reference slots its header refreshes.
    fn update_references(&mut self, picture: &Rc<Av1Picture<B::Handle>>) {
        let fh = &picture.frame_hdr;

        // This is a show_existing_frame case, only update key frame.
        if fh.show_existing_frame && fh.frame_type != FrameType::KeyFrame {
            return;
        }

        match self.parser.reference_frame_update(fh) {
            Ok(update_mask) => self.codec.dpb.add(picture, update_mask),
            Err(err) => log::error!("failed to update the reference: {:#}", err),
        }
    }

    /// Hands `frame` back, either to the backend for display or to the client.
    fn finish_frame(
        &mut self,
        mut frame: CodecFrame,
        picture: Rc<Av1Picture<B::Handle>>,
    ) -> Result<FrameOutcome, DecodeError> {
        if !picture.is_shown() {
            log::debug!("Decode only picture {}", picture.system_frame_number);
            frame.set_decode_only();
            self.events.push(DecoderEvent::FrameFinished(frame));
            return Ok(FrameOutcome::DecodeOnly);
        }

        // Only output the frame with the highest spatial id of each temporal unit within the
        // selected operating point.
        let operating_point_idc = self.parser.operating_point_idc();
        if let Some(highest_spatial_layer) = helpers::highest_spatial_layer(operating_point_idc) {
            if self.codec.spatial_id < highest_spatial_layer {
                log::debug!("Dropping frame with spatial_id {}", self.codec.spatial_id);
                self.events.push(DecoderEvent::FrameDropped(frame));
                return Ok(FrameOutcome::Dropped);
            }
        }

        self.backend
            .output_picture(frame, picture)
            .map_err(DecodeError::backend("output_picture"))?;

        Ok(FrameOutcome::Output)
    }
}
