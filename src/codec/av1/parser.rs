// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Parsed AV1 syntax structures and the interface of the bitstream parser.
//!
//! The decoder does not read bits itself. It relies on an implementation of [`ObuParser`] to
//! split a temporal unit into OBUs and to turn them into the structures of this module. Only the
//! fields the decoding state machine and its backends commonly need are kept here.

use std::borrow::Cow;

use enumn::N;

pub const NUM_REF_FRAMES: usize = 8;
pub const REFS_PER_FRAME: usize = 7;

#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObuType {
    #[default]
    Reserved = 0,
    SequenceHeader = 1,
    TemporalDelimiter = 2,
    FrameHeader = 3,
    TileGroup = 4,
    Metadata = 5,
    Frame = 6,
    RedundantFrameHeader = 7,
    TileList = 8,
    Reserved2 = 9,
    Reserved3 = 10,
    Reserved4 = 11,
    Reserved5 = 12,
    Reserved6 = 13,
    Reserved7 = 14,
    Padding = 15,
}

impl ObuType {
    /// Human readable name of the OBU type, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ObuType::SequenceHeader => "sequence header",
            ObuType::TemporalDelimiter => "temporal delimiter",
            ObuType::FrameHeader => "frame header",
            ObuType::TileGroup => "tile group",
            ObuType::Metadata => "metadata",
            ObuType::Frame => "frame",
            ObuType::RedundantFrameHeader => "redundant frame header",
            ObuType::TileList => "tile list",
            ObuType::Padding => "padding",
            _ => "unknown",
        }
    }
}

#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Profile {
    #[default]
    Profile0 = 0,
    Profile1 = 1,
    Profile2 = 2,
}

#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameType {
    #[default]
    KeyFrame = 0,
    InterFrame = 1,
    IntraOnlyFrame = 2,
    SwitchFrame = 3,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObuHeader {
    pub obu_type: ObuType,
    pub extension_flag: bool,
    pub has_size_field: bool,
    pub temporal_id: u32,
    pub spatial_id: u32,
}

impl ObuHeader {
    /// Length in bytes
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        if self.extension_flag {
            2
        } else {
            1
        }
    }
}

/// One OBU as identified by the parser. The payload is not interpreted yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Obu<'a> {
    /// The OBU header.
    pub header: ObuHeader,
    /// The data backing the OBU.
    pub data: Cow<'a, [u8]>,
    /// Where the OBU payload starts within `data`.
    pub start_offset: usize,
    /// Size of the payload after `start_offset`.
    pub size: usize,
}

impl<'a> AsRef<[u8]> for Obu<'a> {
    fn as_ref(&self) -> &[u8] {
        &self.data[self.start_offset..self.start_offset + self.size]
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperatingPoint {
    pub seq_level_idx: u32,
    pub seq_tier: u32,
    /// Bitmask of the temporal (low byte) and spatial (high byte) layers
    /// that belong to this operating point.
    pub idc: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequenceHeaderObu {
    /// The OBU header from the OBU that generated this sequence.
    pub obu_header: ObuHeader,
    pub seq_profile: Profile,
    pub still_picture: bool,
    pub reduced_still_picture_header: bool,
    pub max_frame_width_minus_1: u32,
    pub max_frame_height_minus_1: u32,
    pub operating_points_cnt_minus_1: u32,
    pub operating_points: Vec<OperatingPoint>,
    pub frame_id_numbers_present_flag: bool,
    pub enable_order_hint: bool,
    pub order_hint_bits: u32,
    pub film_grain_params_present: bool,
    pub bit_depth: u32,
}

impl SequenceHeaderObu {
    /// Maximum frame width of the sequence, in pixels.
    pub fn max_frame_width(&self) -> u32 {
        self.max_frame_width_minus_1 + 1
    }

    /// Maximum frame height of the sequence, in pixels.
    pub fn max_frame_height(&self) -> u32 {
        self.max_frame_height_minus_1 + 1
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilmGrainParams {
    /// If set, film grain should be added to this frame.
    pub apply_grain: bool,
    pub grain_seed: u16,
    pub update_grain: bool,
    pub film_grain_params_ref_idx: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameHeaderObu {
    /// The original OBU header. This may be from a FrameOBU or a FrameHeaderOBU
    /// directly.
    pub obu_header: ObuHeader,
    /// If set, the frame held in slot `frame_to_show_map_idx` is to be output
    /// again and no tile data follows.
    pub show_existing_frame: bool,
    /// Only meaningful if `show_existing_frame` is set.
    pub frame_to_show_map_idx: u32,
    pub display_frame_id: u32,
    pub frame_type: FrameType,
    /// The frame is output as soon as it is decoded.
    pub show_frame: bool,
    /// The frame may be output later through `show_existing_frame`.
    pub showable_frame: bool,
    pub error_resilient_mode: bool,
    pub current_frame_id: u32,
    pub order_hint: u32,
    pub primary_ref_frame: u32,
    /// Bitmask of the reference slots updated with this frame once decoded.
    pub refresh_frame_flags: u32,
    pub ref_frame_idx: [u8; REFS_PER_FRAME],
    pub film_grain_params: FilmGrainParams,
    pub upscaled_width: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub render_width: u32,
    pub render_height: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tile {
    /// Same as TileOffset in the AV1 syntax.
    pub tile_offset: u32,
    /// Same as TileSize in the AV1 syntax.
    pub tile_size: u32,
    /// Same as TileRow in the AV1 syntax.
    pub tile_row: u32,
    /// Same as TileCol in the AV1 syntax.
    pub tile_col: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TileGroupObu<'a> {
    /// The OBU backing this tile group.
    pub obu: Obu<'a>,
    pub tile_start_and_end_present_flag: bool,
    /// Index of the first tile in the group.
    pub tg_start: u32,
    /// Index of the last tile in the group.
    pub tg_end: u32,
    /// The tiles from `tg_start` to `tg_end`. Use `tile_offset` to index into
    /// the OBU data.
    pub tiles: Vec<Tile>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameObu<'a> {
    pub header: FrameHeaderObu,
    pub tile_group: TileGroupObu<'a>,
}

/// Interface to the AV1 bitstream parser.
///
/// The parser keeps the syntax-level state of the stream (the active sequence, the reference
/// frame information used to parse the next frame headers, the selected operating point). The
/// decoder only calls into it from `handle_frame` and from its reset paths.
pub trait ObuParser {
    /// Identifies the OBU starting at `offset` in `data`, returning it along with the number of
    /// bytes it spans.
    fn identify_one_obu<'a>(
        &mut self,
        data: &'a [u8],
        offset: usize,
    ) -> anyhow::Result<(Obu<'a>, usize)>;

    fn parse_temporal_delimiter_obu(&mut self, obu: &Obu) -> anyhow::Result<()>;

    fn parse_sequence_header_obu(&mut self, obu: &Obu) -> anyhow::Result<SequenceHeaderObu>;

    fn parse_frame_header_obu(&mut self, obu: &Obu) -> anyhow::Result<FrameHeaderObu>;

    fn parse_tile_group_obu<'a>(&mut self, obu: Obu<'a>) -> anyhow::Result<TileGroupObu<'a>>;

    fn parse_frame_obu<'a>(&mut self, obu: Obu<'a>) -> anyhow::Result<FrameObu<'a>>;

    /// Restores the parsing state as if the frame described by `fh` had just been decoded. Used
    /// when a frame is shown again through `show_existing_frame`.
    fn reference_frame_loading(&mut self, fh: &FrameHeaderObu) -> anyhow::Result<()>;

    /// Updates the reference frame information after `fh` has been decoded, and returns the
    /// bitmask of the reference slots the frame must be stored into.
    fn reference_frame_update(&mut self, fh: &FrameHeaderObu) -> anyhow::Result<u8>;

    /// Selects the operating point to decode. Out of range values are clamped by the parser
    /// once the sequence header is known.
    fn set_operating_point(&mut self, operating_point: u32);

    /// The `operating_point_idc` of the selected operating point, or 0 if the stream carries no
    /// scalability information.
    fn operating_point_idc(&self) -> u32;

    /// Resets the parser. The last sequence header survives if `keep_sequence` is set.
    fn reset(&mut self, keep_sequence: bool);
}
