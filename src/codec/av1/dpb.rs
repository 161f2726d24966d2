// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::rc::Rc;

use crate::codec::av1::parser::NUM_REF_FRAMES;
use crate::codec::av1::picture::Av1Picture;

/// The AV1 decoded picture buffer: one optional picture per reference slot.
///
/// The same picture can sit in several slots at once. A picture is released when the last slot
/// (or other holder) referencing it lets it go.
pub struct Dpb<H> {
    pic_list: [Option<Rc<Av1Picture<H>>>; NUM_REF_FRAMES],
}

impl<H> Dpb<H> {
    /// Stores `picture` into every slot flagged in `update_mask`, releasing the pictures that
    /// previously occupied these slots.
    pub fn add(&mut self, picture: &Rc<Av1Picture<H>>, update_mask: u8) {
        for (i, slot) in self.pic_list.iter_mut().enumerate() {
            if (update_mask >> i) & 1 == 0 {
                continue;
            }

            log::debug!(
                "Replacing reference frame {} with frame {}",
                i,
                picture.system_frame_number
            );
            *slot = Some(Rc::clone(picture));
        }
    }

    /// Returns the picture held by slot `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Rc<Av1Picture<H>>> {
        self.pic_list.get(index)?.as_ref()
    }

    /// Releases every picture held by the DPB.
    pub fn clear(&mut self) {
        log::debug!("Clearing the DPB");

        for slot in self.pic_list.iter_mut() {
            *slot = None;
        }
    }

    /// Get a reference to all the reference slots.
    pub fn references(&self) -> &[Option<Rc<Av1Picture<H>>>; NUM_REF_FRAMES] {
        &self.pic_list
    }

    /// Returns the number of populated slots.
    pub fn len(&self) -> usize {
        self.pic_list.iter().filter(|p| p.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of distinct pictures held by the DPB.
    pub fn num_pictures(&self) -> usize {
        let mut seen: Vec<&Rc<Av1Picture<H>>> = Vec::with_capacity(NUM_REF_FRAMES);

        for pic in self.pic_list.iter().flatten() {
            if !seen.iter().any(|p| Rc::ptr_eq(p, pic)) {
                seen.push(pic);
            }
        }

        seen.len()
    }
}

impl<H> Default for Dpb<H> {
    fn default() -> Self {
        // See https://github.com/rust-lang/rust/issues/26925 on why this can't
        // be derived.
        Self {
            pic_list: Default::default(),
        }
    }
}

impl<H> std::fmt::Debug for Dpb<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self
            .pic_list
            .iter()
            .map(|p| p.as_ref().map(|p| p.system_frame_number))
            .collect::<Vec<_>>();
        f.debug_struct("Dpb").field("slots", &slots).finish()
    }
}
