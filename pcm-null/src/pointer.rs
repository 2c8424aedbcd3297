// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause
//! Ring buffer pointer arithmetic.
//!
//! The application and hardware pointers are free running frame counters.
//! They are not wrapped at the buffer size but at the *boundary*, the largest
//! power-of-two multiple of the buffer size that still fits in a signed frame
//! count. Wrapping at the boundary keeps `ptr % buffer_size` meaningful while
//! letting pointer differences be computed without ambiguity.

/// Unsigned frame count or position.
pub type Frames = u64;
/// Signed frame count, used for delays.
pub type SFrames = i64;

const MAX_SFRAMES: Frames = SFrames::MAX as Frames;

/// Computes the pointer boundary for a buffer of `buffer_size` frames.
///
/// Returns 0 for an empty buffer, which makes [`forward`] and [`backward`]
/// treat the pointers as unbounded.
pub fn boundary(buffer_size: Frames) -> Frames {
    if buffer_size == 0 || buffer_size > MAX_SFRAMES / 2 {
        return buffer_size;
    }
    let mut boundary = buffer_size;
    while boundary * 2 <= MAX_SFRAMES - buffer_size {
        boundary *= 2;
    }
    boundary
}

/// Advances `ptr` by `frames`, wrapping at `boundary`.
#[inline]
pub fn forward(ptr: Frames, frames: Frames, boundary: Frames) -> Frames {
    if boundary == 0 {
        return ptr.wrapping_add(frames);
    }
    let frames = frames % boundary;
    let room = boundary - ptr;
    if frames >= room {
        frames - room
    } else {
        ptr + frames
    }
}

/// Moves `ptr` back by `frames`, wrapping at `boundary`.
#[inline]
pub fn backward(ptr: Frames, frames: Frames, boundary: Frames) -> Frames {
    if boundary == 0 {
        return ptr.wrapping_sub(frames);
    }
    let frames = frames % boundary;
    if frames > ptr {
        boundary - (frames - ptr)
    } else {
        ptr - frames
    }
}
