// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

/// Implements FloorLog2(x), which is defined to be the floor of the base 2
/// logarithm of the input x.
///
/// The input x will always be an integer, and will always be greater than or equal to 1.
/// This function extracts the location of the most significant bit in x.
pub fn floor_log2(mut x: u32) -> u32 {
    assert!(x > 0);
    let mut s = 0;

    while x != 0 {
        x >>= 1;
        s += 1;
    }

    s - 1
}

/// Returns the lowest spatial id that may be output for `operating_point_idc`, i.e. the highest
/// spatial layer included in the operating point.
///
/// `None` means that no layer needs to be dropped: the stream carries no scalability information
/// or the operating point does not select any spatial layer.
pub fn highest_spatial_layer(operating_point_idc: u32) -> Option<u32> {
    let spatial_layers = operating_point_idc >> 8;
    if operating_point_idc == 0 || spatial_layers == 0 {
        None
    } else {
        Some(floor_log2(spatial_layers))
    }
}
