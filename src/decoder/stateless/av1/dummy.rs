// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This file contains a scripted parser whose only purpose is to let the decoder
//! run so we can test it in isolation.
//!
//! Each OBU is encoded on 3 bytes: the OBU type, the spatial id, and a key selecting the
//! pre-parsed sequence or frame header to return. The key byte doubles as the tile payload of
//! tile group and frame OBUs.

use std::borrow::Cow;
use std::collections::HashMap;

use anyhow::anyhow;

use crate::backend::dummy::Backend;
use crate::codec::av1::parser::FrameHeaderObu;
use crate::codec::av1::parser::FrameObu;
use crate::codec::av1::parser::FrameType;
use crate::codec::av1::parser::Obu;
use crate::codec::av1::parser::ObuHeader;
use crate::codec::av1::parser::ObuParser;
use crate::codec::av1::parser::ObuType;
use crate::codec::av1::parser::SequenceHeaderObu;
use crate::codec::av1::parser::TileGroupObu;
use crate::decoder::stateless::av1::Av1Decoder;

pub(crate) const OBU_SIZE: usize = 3;

/// Encodes one OBU for the scripted parser.
pub(crate) fn obu(obu_type: ObuType, spatial_id: u8, key: u8) -> [u8; OBU_SIZE] {
    [obu_type as u8, spatial_id, key]
}

/// Concatenates `obus` into a temporal unit.
pub(crate) fn temporal_unit(obus: &[[u8; OBU_SIZE]]) -> Vec<u8> {
    obus.concat()
}

/// A frame header for a regular frame refreshing the slots of `refresh_frame_flags`.
pub(crate) fn frame_header(
    frame_type: FrameType,
    show_frame: bool,
    showable_frame: bool,
    refresh_frame_flags: u32,
) -> FrameHeaderObu {
    FrameHeaderObu {
        frame_type,
        show_frame,
        showable_frame,
        refresh_frame_flags,
        render_width: 320,
        render_height: 240,
        ..Default::default()
    }
}

/// A frame header showing the picture in slot `idx`.
pub(crate) fn show_existing_header(idx: u32, frame_type: FrameType) -> FrameHeaderObu {
    FrameHeaderObu {
        show_existing_frame: true,
        frame_to_show_map_idx: idx,
        frame_type,
        show_frame: true,
        refresh_frame_flags: if frame_type == FrameType::KeyFrame { 0xff } else { 0 },
        ..Default::default()
    }
}

#[derive(Default)]
pub(crate) struct ScriptedParser {
    pub sequences: HashMap<u8, SequenceHeaderObu>,
    pub frame_headers: HashMap<u8, FrameHeaderObu>,
    /// Value returned by `operating_point_idc`.
    pub operating_point_idc: u32,
    /// Last value passed to `set_operating_point`.
    pub operating_point: Option<u32>,
    /// Frame headers passed to `reference_frame_loading`.
    pub loaded: Vec<FrameHeaderObu>,
    /// Number of successful `reference_frame_update` calls.
    pub updates: usize,
    pub fail_loading: bool,
    pub fail_update: bool,
    /// Arguments of the `reset` calls.
    pub resets: Vec<bool>,
}

impl ScriptedParser {
    fn frame_header_for(&self, obu: &Obu) -> anyhow::Result<FrameHeaderObu> {
        let key = obu.as_ref()[0];
        let mut fh = self
            .frame_headers
            .get(&key)
            .cloned()
            .ok_or(anyhow!("no frame header scripted for key {}", key))?;
        fh.obu_header = obu.header.clone();
        Ok(fh)
    }

    fn tile_group_for<'a>(obu: Obu<'a>) -> TileGroupObu<'a> {
        TileGroupObu {
            obu,
            tg_start: 0,
            tg_end: 0,
            ..Default::default()
        }
    }
}

impl ObuParser for ScriptedParser {
    fn identify_one_obu<'a>(
        &mut self,
        data: &'a [u8],
        offset: usize,
    ) -> anyhow::Result<(Obu<'a>, usize)> {
        let bytes = data
            .get(offset..offset + OBU_SIZE)
            .ok_or(anyhow!("truncated OBU at offset {}", offset))?;
        let obu_type = ObuType::n(bytes[0]).ok_or(anyhow!("Invalid OBU type"))?;

        let obu = Obu {
            header: ObuHeader {
                obu_type,
                extension_flag: bytes[1] != 0,
                has_size_field: true,
                temporal_id: 0,
                spatial_id: u32::from(bytes[1]),
            },
            data: Cow::Borrowed(data),
            start_offset: offset + 2,
            size: 1,
        };

        Ok((obu, OBU_SIZE))
    }

    fn parse_temporal_delimiter_obu(&mut self, obu: &Obu) -> anyhow::Result<()> {
        if !matches!(obu.header.obu_type, ObuType::TemporalDelimiter) {
            return Err(anyhow!(
                "Expected a TemporalDelimiterOBU, got {:?}",
                obu.header.obu_type
            ));
        }
        Ok(())
    }

    fn parse_sequence_header_obu(&mut self, obu: &Obu) -> anyhow::Result<SequenceHeaderObu> {
        let key = obu.as_ref()[0];
        let mut seq = self
            .sequences
            .get(&key)
            .cloned()
            .ok_or(anyhow!("no sequence scripted for key {}", key))?;
        seq.obu_header = obu.header.clone();
        Ok(seq)
    }

    fn parse_frame_header_obu(&mut self, obu: &Obu) -> anyhow::Result<FrameHeaderObu> {
        self.frame_header_for(obu)
    }

    fn parse_tile_group_obu<'a>(&mut self, obu: Obu<'a>) -> anyhow::Result<TileGroupObu<'a>> {
        Ok(Self::tile_group_for(obu))
    }

    fn parse_frame_obu<'a>(&mut self, obu: Obu<'a>) -> anyhow::Result<FrameObu<'a>> {
        let header = self.frame_header_for(&obu)?;
        Ok(FrameObu {
            header,
            tile_group: Self::tile_group_for(obu),
        })
    }

    fn reference_frame_loading(&mut self, fh: &FrameHeaderObu) -> anyhow::Result<()> {
        if self.fail_loading {
            return Err(anyhow!("reference frame loading failed"));
        }
        self.loaded.push(fh.clone());
        Ok(())
    }

    fn reference_frame_update(&mut self, fh: &FrameHeaderObu) -> anyhow::Result<u8> {
        if self.fail_update {
            return Err(anyhow!("reference frame update failed"));
        }
        self.updates += 1;
        Ok(fh.refresh_frame_flags as u8)
    }

    fn set_operating_point(&mut self, operating_point: u32) {
        self.operating_point = Some(operating_point);
    }

    fn operating_point_idc(&self) -> u32 {
        self.operating_point_idc
    }

    fn reset(&mut self, keep_sequence: bool) {
        self.resets.push(keep_sequence);
    }
}

impl Av1Decoder<ScriptedParser, Backend> {
    // Creates a new, started instance of the decoder using the dummy backend.
    pub fn new_dummy(parser: ScriptedParser) -> Self {
        let mut decoder = Self::new(parser, Backend::new());
        decoder.start();
        decoder
    }
}
