// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause
//! Hardware and software parameter negotiation.
//!
//! A [`HwParams`] is a configuration *space*: every parameter is either a
//! mask of acceptable values or an interval. Callers narrow the space with
//! the `set_*` helpers, devices refine it with their own limits through
//! [`crate::PcmOps::hw_refine`], and committing picks the smallest value left
//! in every interval, producing a [`PcmSetup`].

use std::fmt;

use bitflags::bitflags;
use clap::ValueEnum;

use crate::{pointer::Frames, Error, Result};

/// Frame counts above this are rejected so that pointer boundaries stay
/// representable as signed frame counts.
pub const MAX_BUFFER_FRAMES: Frames = 1 << 40;

const CHANNELS_MIN: u64 = 1;
const CHANNELS_MAX: u64 = 32;
const RATE_MIN: u64 = 4000;
const RATE_MAX: u64 = 768_000;

bitflags! {
    /// Accepted sample buffer layouts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMask: u32 {
        const MMAP_INTERLEAVED = 1 << 0;
        const MMAP_NONINTERLEAVED = 1 << 1;
        const RW_INTERLEAVED = 1 << 2;
        const RW_NONINTERLEAVED = 1 << 3;
    }

    /// Accepted sample formats.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FormatMask: u32 {
        const U8 = 1 << 0;
        const S16_LE = 1 << 1;
        const S24_LE = 1 << 2;
        const S32_LE = 1 << 3;
        const FLOAT_LE = 1 << 4;
    }

    /// Capabilities reported by a device once configured.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct InfoFlags: u32 {
        /// The device maps its own buffer; no shared memory backing needed.
        const MMAP = 1 << 0;
        const INTERLEAVED = 1 << 1;
        const NONINTERLEAVED = 1 << 2;
        const PAUSE = 1 << 3;
    }
}

#[derive(ValueEnum, Clone, Copy, Default, Debug, Eq, PartialEq)]
pub enum Access {
    MmapInterleaved,
    MmapNoninterleaved,
    #[default]
    RwInterleaved,
    RwNoninterleaved,
}

impl Access {
    const ALL: [Self; 4] = [
        Self::MmapInterleaved,
        Self::MmapNoninterleaved,
        Self::RwInterleaved,
        Self::RwNoninterleaved,
    ];

    pub const fn mask(self) -> AccessMask {
        match self {
            Self::MmapInterleaved => AccessMask::MMAP_INTERLEAVED,
            Self::MmapNoninterleaved => AccessMask::MMAP_NONINTERLEAVED,
            Self::RwInterleaved => AccessMask::RW_INTERLEAVED,
            Self::RwNoninterleaved => AccessMask::RW_NONINTERLEAVED,
        }
    }

    pub const fn is_mmap(self) -> bool {
        matches!(self, Self::MmapInterleaved | Self::MmapNoninterleaved)
    }

    pub const fn is_interleaved(self) -> bool {
        matches!(self, Self::MmapInterleaved | Self::RwInterleaved)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use Access::*;
        match *self {
            MmapInterleaved => write!(fmt, "MMAP_INTERLEAVED"),
            MmapNoninterleaved => write!(fmt, "MMAP_NONINTERLEAVED"),
            RwInterleaved => write!(fmt, "RW_INTERLEAVED"),
            RwNoninterleaved => write!(fmt, "RW_NONINTERLEAVED"),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Default, Debug, Eq, PartialEq)]
pub enum Format {
    U8,
    #[default]
    S16Le,
    S24Le,
    S32Le,
    FloatLe,
}

impl Format {
    const ALL: [Self; 5] = [
        Self::U8,
        Self::S16Le,
        Self::S24Le,
        Self::S32Le,
        Self::FloatLe,
    ];

    pub const fn mask(self) -> FormatMask {
        match self {
            Self::U8 => FormatMask::U8,
            Self::S16Le => FormatMask::S16_LE,
            Self::S24Le => FormatMask::S24_LE,
            Self::S32Le => FormatMask::S32_LE,
            Self::FloatLe => FormatMask::FLOAT_LE,
        }
    }

    /// Bits one sample occupies in memory.
    pub const fn physical_width(self) -> u64 {
        match self {
            Self::U8 => 8,
            Self::S16Le => 16,
            Self::S24Le | Self::S32Le | Self::FloatLe => 32,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use Format::*;
        match *self {
            U8 => write!(fmt, "U8"),
            S16Le => write!(fmt, "S16_LE"),
            S24Le => write!(fmt, "S24_LE"),
            S32Le => write!(fmt, "S32_LE"),
            FloatLe => write!(fmt, "FLOAT_LE"),
        }
    }
}

/// Closed interval of acceptable values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub min: u64,
    pub max: u64,
}

impl Interval {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub const fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Narrows `self` to its intersection with `[min, max]`.
    ///
    /// Returns whether anything changed.
    pub fn refine(&mut self, min: u64, max: u64) -> bool {
        let old = *self;
        self.min = self.min.max(min);
        self.max = self.max.min(max);
        old != *self
    }

    pub const fn contains(&self, value: u64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Hardware configuration space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwParams {
    pub access: AccessMask,
    pub format: FormatMask,
    pub channels: Interval,
    pub rate: Interval,
    pub period_size: Interval,
    pub buffer_size: Interval,
    pub info: InfoFlags,
    /// Frames queued between the ring buffer and the converter. Reported to
    /// applications as part of the latency.
    pub fifo_size: Frames,
}

impl Default for HwParams {
    fn default() -> Self {
        Self::any()
    }
}

impl HwParams {
    /// The full, unrestricted configuration space.
    pub fn any() -> Self {
        Self {
            access: AccessMask::all(),
            format: FormatMask::all(),
            channels: Interval::new(CHANNELS_MIN, CHANNELS_MAX),
            rate: Interval::new(RATE_MIN, RATE_MAX),
            period_size: Interval::new(1, MAX_BUFFER_FRAMES),
            buffer_size: Interval::new(1, MAX_BUFFER_FRAMES),
            info: InfoFlags::empty(),
            fifo_size: 0,
        }
    }

    pub fn set_access(&mut self, access: Access) -> Result<()> {
        if !self.access.contains(access.mask()) {
            return Err(Error::InvalidParameter("access"));
        }
        self.access = access.mask();
        Ok(())
    }

    pub fn set_format(&mut self, format: Format) -> Result<()> {
        if !self.format.contains(format.mask()) {
            return Err(Error::InvalidParameter("format"));
        }
        self.format = format.mask();
        Ok(())
    }

    pub fn set_channels(&mut self, channels: u32) -> Result<()> {
        Self::set_interval(&mut self.channels, channels.into(), "channels")
    }

    pub fn set_rate(&mut self, rate: u32) -> Result<()> {
        Self::set_interval(&mut self.rate, rate.into(), "rate")
    }

    pub fn set_period_size(&mut self, frames: Frames) -> Result<()> {
        Self::set_interval(&mut self.period_size, frames, "period_size")
    }

    pub fn set_buffer_size(&mut self, frames: Frames) -> Result<()> {
        Self::set_interval(&mut self.buffer_size, frames, "buffer_size")
    }

    fn set_interval(interval: &mut Interval, value: u64, name: &'static str) -> Result<()> {
        if !interval.contains(value) {
            return Err(Error::InvalidParameter(name));
        }
        *interval = Interval::new(value, value);
        Ok(())
    }

    fn check_not_empty(&self) -> Result<()> {
        if self.access.is_empty() {
            return Err(Error::InvalidParameter("access"));
        }
        if self.format.is_empty() {
            return Err(Error::InvalidParameter("format"));
        }
        for (interval, name) in [
            (&self.channels, "channels"),
            (&self.rate, "rate"),
            (&self.period_size, "period_size"),
            (&self.buffer_size, "buffer_size"),
        ] {
            if interval.is_empty() {
                return Err(Error::InvalidParameter(name));
            }
        }
        Ok(())
    }

    /// Picks the smallest value left for every parameter.
    pub fn choose(&self) -> Result<PcmSetup> {
        self.check_not_empty()?;
        let access = Access::ALL
            .into_iter()
            .filter(|a| self.access.contains(a.mask()))
            .min_by_key(|a| !a.is_interleaved())
            .ok_or(Error::InvalidParameter("access"))?;
        let format = Format::ALL
            .into_iter()
            .find(|f| self.format.contains(f.mask()))
            .ok_or(Error::InvalidParameter("format"))?;
        let channels =
            u32::try_from(self.channels.min).map_err(|_| Error::InvalidParameter("channels"))?;
        let rate = u32::try_from(self.rate.min).map_err(|_| Error::InvalidParameter("rate"))?;

        Ok(PcmSetup {
            access,
            format,
            channels,
            rate,
            period_size: self.period_size.min,
            buffer_size: self.buffer_size.min,
            fifo_size: self.fifo_size,
            info: self.info,
        })
    }
}

/// Generic refinement: clamps the space to what any PCM can support and
/// enforces the period/buffer relationship.
///
/// Fails with [`Error::InvalidParameter`] if the resulting space is empty.
pub fn refine(params: &mut HwParams) -> Result<()> {
    params.access &= AccessMask::all();
    params.format &= FormatMask::all();
    params.channels.refine(CHANNELS_MIN, CHANNELS_MAX);
    params.rate.refine(RATE_MIN, RATE_MAX);
    params.buffer_size.refine(1, MAX_BUFFER_FRAMES);
    params.period_size.refine(1, MAX_BUFFER_FRAMES);

    // A period never exceeds the buffer.
    let (buffer_min, buffer_max) = (params.buffer_size.min, params.buffer_size.max);
    params.period_size.refine(1, buffer_max);
    params
        .buffer_size
        .refine(params.period_size.min.max(buffer_min), MAX_BUFFER_FRAMES);

    params.check_not_empty()
}

/// When transfers start the stream.
#[derive(ValueEnum, Clone, Copy, Default, Debug, Eq, PartialEq)]
pub enum StartMode {
    /// The first transfer starts the stream.
    #[default]
    Data,
    /// Only an explicit `start()` does.
    Explicit,
}

impl fmt::Display for StartMode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Data => write!(fmt, "DATA"),
            Self::Explicit => write!(fmt, "EXPLICIT"),
        }
    }
}

/// Software configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwParams {
    pub start_mode: StartMode,
    /// Minimum available frames to consider the stream ready. Zero means one
    /// period.
    pub avail_min: Frames,
}

/// A committed hardware configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSetup {
    pub access: Access,
    pub format: Format,
    pub channels: u32,
    pub rate: u32,
    pub period_size: Frames,
    pub buffer_size: Frames,
    pub fifo_size: Frames,
    pub info: InfoFlags,
}

impl PcmSetup {
    pub const fn frame_bits(&self) -> u64 {
        self.format.physical_width() * self.channels as u64
    }

    /// Bytes `frames` frames occupy, `None` on overflow.
    pub const fn frames_to_bytes(&self, frames: Frames) -> Option<u64> {
        match frames.checked_mul(self.frame_bits()) {
            Some(bits) => Some(bits / 8),
            None => None,
        }
    }
}

impl fmt::Display for PcmSetup {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        writeln!(fmt, "access       : {}", self.access)?;
        writeln!(fmt, "format       : {}", self.format)?;
        writeln!(fmt, "channels     : {}", self.channels)?;
        writeln!(fmt, "rate         : {}", self.rate)?;
        writeln!(fmt, "frame_bits   : {}", self.frame_bits())?;
        writeln!(fmt, "period_size  : {}", self.period_size)?;
        writeln!(fmt, "buffer_size  : {}", self.buffer_size)?;
        writeln!(fmt, "fifo_size    : {}", self.fifo_size)
    }
}
