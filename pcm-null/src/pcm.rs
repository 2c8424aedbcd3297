// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause
//! The generic PCM handle and the device interface it dispatches to.
//!
//! A [`Pcm`] owns the runtime configuration shared by every kind of device
//! (stream direction, open mode, committed setup) and one boxed
//! [`PcmDevice`]. The device is picked when the PCM is opened and stays fixed
//! for the lifetime of the handle.
//!
//! Device operations are split in two capability sets: [`PcmOps`] holds the
//! infrequent administrative calls, [`PcmFastOps`] the state transitions and
//! transfers that sit in the hot path and must not allocate.

use std::{fmt, os::fd::BorrowedFd, time::SystemTime};

use bitflags::bitflags;
use clap::ValueEnum;

use crate::{
    params::{HwParams, InfoFlags, PcmSetup, StartMode, SwParams},
    pointer::{self, Frames, SFrames},
    Error, Result,
};

/// PCM lifecycle state.
///
/// ```text
/// OPEN --hw_params--> PREPARED --start/transfer--> RUNNING <--pause--> PAUSED
///                        ^                             |                  |
///                        |                       drop/drain          drop/drain
///                        |                             v                  |
///                        +-----------prepare------- SETUP <---------------+
/// ```
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum PcmState {
    /// Just opened, not configured.
    #[default]
    Open,
    /// Configured, stopped.
    Setup,
    /// Pointers reset, ready to start.
    Prepared,
    Running,
    Paused,
}

impl fmt::Display for PcmState {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use PcmState::*;
        match *self {
            Open => write!(fmt, "OPEN"),
            Setup => write!(fmt, "SETUP"),
            Prepared => write!(fmt, "PREPARED"),
            Running => write!(fmt, "RUNNING"),
            Paused => write!(fmt, "PAUSED"),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Default, Debug, Eq, PartialEq)]
pub enum PcmStream {
    #[default]
    Playback,
    Capture,
}

impl fmt::Display for PcmStream {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Playback => write!(fmt, "PLAYBACK"),
            Self::Capture => write!(fmt, "CAPTURE"),
        }
    }
}

bitflags! {
    /// Flags a PCM is opened with.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct OpenMode: u32 {
        const NONBLOCK = 1 << 0;
        const ASYNC = 1 << 1;
    }
}

/// Configuration of a PCM handle, shared with its device on every call.
#[derive(Debug, Clone)]
pub struct PcmRuntime {
    pub name: String,
    pub stream: PcmStream,
    pub mode: OpenMode,
    pub setup: Option<PcmSetup>,
    pub sw_params: SwParams,
    /// Wrap point of the application and hardware pointers.
    pub boundary: Frames,
}

impl PcmRuntime {
    pub fn new(name: &str, stream: PcmStream, mode: OpenMode) -> Self {
        Self {
            name: name.to_owned(),
            stream,
            mode,
            setup: None,
            sw_params: SwParams::default(),
            boundary: 0,
        }
    }

    /// Negotiated buffer size, 0 until hardware parameters are committed.
    #[inline]
    pub fn buffer_size(&self) -> Frames {
        self.setup.map_or(0, |setup| setup.buffer_size)
    }

    #[inline]
    pub fn start_mode(&self) -> StartMode {
        self.sw_params.start_mode
    }

    #[inline]
    pub fn info(&self) -> InfoFlags {
        self.setup.map_or(InfoFlags::empty(), |setup| setup.info)
    }

    pub fn frames_to_bytes(&self, frames: Frames) -> Option<u64> {
        self.setup.and_then(|setup| setup.frames_to_bytes(frames))
    }

    /// Writes a human readable summary of the committed setup.
    pub fn dump_setup(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let Some(setup) = self.setup else {
            return Ok(());
        };
        writeln!(out, "stream       : {}", self.stream)?;
        write!(out, "{setup}")?;
        writeln!(out, "start_mode   : {}", self.sw_params.start_mode)?;
        writeln!(out, "avail_min    : {}", self.sw_params.avail_min)?;
        writeln!(out, "boundary     : {}", self.boundary)
    }
}

/// Snapshot returned by [`Pcm::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmStatus {
    pub state: PcmState,
    /// When the stream last entered [`PcmState::Running`].
    pub trigger_time: Option<SystemTime>,
    /// When the status was taken.
    pub tstamp: SystemTime,
    pub avail: Frames,
    pub avail_max: Frames,
}

/// Identification of the card and device behind a PCM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PcmInfo {
    pub card: i32,
    pub device: u32,
    pub subdevice: u32,
    pub id: String,
    pub name: String,
}

/// Where the samples of one channel live in the mapped buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub channel: u32,
    /// Shared memory segment holding the buffer, if any.
    pub shmid: Option<i32>,
    /// Offset of the first sample, in bits.
    pub first: u64,
    /// Distance between two consecutive samples, in bits.
    pub step: u64,
}

impl ChannelInfo {
    /// Describes `channel` of a buffer laid out according to `setup`, stored
    /// in the shared memory segment `shmid`.
    pub fn shm(setup: &PcmSetup, channel: u32, shmid: Option<i32>) -> Self {
        let width = setup.format.physical_width();
        let (first, step) = if setup.access.is_interleaved() {
            (u64::from(channel) * width, setup.frame_bits())
        } else {
            (u64::from(channel) * setup.buffer_size * width, width)
        };
        Self {
            channel,
            shmid,
            first,
            step,
        }
    }
}

/// Administrative device operations.
pub trait PcmOps {
    /// Releases every resource held by the device.
    fn close(self: Box<Self>) -> Result<()>;

    /// Index of the sound card backing the device.
    fn card(&self) -> Result<i32>;

    fn info(&self) -> Result<PcmInfo>;

    /// Narrows `params` to what the device supports.
    fn hw_refine(&self, rt: &PcmRuntime, params: &mut HwParams) -> Result<()>;

    /// Commits a refined hardware configuration.
    fn hw_params(&mut self, rt: &PcmRuntime, params: &HwParams) -> Result<()>;

    fn sw_params(&mut self, rt: &PcmRuntime, params: &SwParams) -> Result<()>;

    fn channel_info(&self, rt: &PcmRuntime, channel: u32) -> Result<ChannelInfo>;

    fn dump(&self, rt: &PcmRuntime, out: &mut dyn fmt::Write) -> fmt::Result;

    fn nonblock(&mut self, nonblock: bool) -> Result<()>;

    /// Registers `pid` to receive `sig` on every period boundary.
    fn async_notify(&mut self, sig: i32, pid: libc::pid_t) -> Result<()>;

    /// Provides a mappable buffer for memory mapped access.
    ///
    /// A buffer provided earlier is released only once the new one exists.
    fn mmap(&mut self, rt: &PcmRuntime) -> Result<()>;

    fn munmap(&mut self, rt: &PcmRuntime) -> Result<()>;

    /// Descriptor to poll for readiness.
    fn poll_fd(&self) -> BorrowedFd<'_>;

    #[cfg(test)]
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Hot path device operations.
pub trait PcmFastOps {
    fn status(&self, rt: &PcmRuntime) -> Result<PcmStatus>;

    fn state(&self) -> PcmState;

    /// Frames between the application pointer and what is audible.
    fn delay(&self, rt: &PcmRuntime) -> Result<SFrames>;

    fn prepare(&mut self, rt: &PcmRuntime) -> Result<()>;

    fn reset(&mut self, rt: &PcmRuntime) -> Result<()>;

    fn start(&mut self, rt: &PcmRuntime) -> Result<()>;

    /// Stops the stream, discarding pending frames.
    fn drop_stream(&mut self, rt: &PcmRuntime) -> Result<()>;

    /// Stops the stream after pending frames are played.
    fn drain(&mut self, rt: &PcmRuntime) -> Result<()>;

    fn pause(&mut self, rt: &PcmRuntime, enable: bool) -> Result<()>;

    fn rewind(&mut self, rt: &PcmRuntime, frames: Frames) -> Result<Frames>;

    fn forward(&mut self, rt: &PcmRuntime, frames: Frames) -> Result<Frames>;

    fn writei(&mut self, rt: &PcmRuntime, buf: &[u8], frames: Frames) -> Result<Frames>;

    fn writen(&mut self, rt: &PcmRuntime, bufs: &[&[u8]], frames: Frames) -> Result<Frames>;

    fn readi(&mut self, rt: &PcmRuntime, buf: &mut [u8], frames: Frames) -> Result<Frames>;

    fn readn(&mut self, rt: &PcmRuntime, bufs: &mut [&mut [u8]], frames: Frames)
        -> Result<Frames>;

    fn avail_update(&mut self, rt: &PcmRuntime) -> Result<Frames>;

    /// Commits `frames` written to or read from the mapped buffer.
    fn mmap_forward(&mut self, rt: &PcmRuntime, frames: Frames) -> Result<Frames>;

    fn appl_ptr(&self) -> Frames;

    fn hw_ptr(&self) -> Frames;
}

/// A PCM device variant.
pub trait PcmDevice: PcmOps + PcmFastOps + Send {}

impl<T: PcmOps + PcmFastOps + Send> PcmDevice for T {}

/// An open PCM.
pub struct Pcm {
    runtime: PcmRuntime,
    device: Box<dyn PcmDevice>,
    mmapped: bool,
}

impl fmt::Debug for Pcm {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct(stringify!(Pcm))
            .field("runtime", &self.runtime)
            .field("state", &self.device.state())
            .field("mmapped", &self.mmapped)
            .finish_non_exhaustive()
    }
}

impl Pcm {
    pub fn new(runtime: PcmRuntime, device: Box<dyn PcmDevice>) -> Self {
        Self {
            runtime,
            device,
            mmapped: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.runtime.name
    }

    pub const fn stream(&self) -> PcmStream {
        self.runtime.stream
    }

    pub const fn mode(&self) -> OpenMode {
        self.runtime.mode
    }

    pub const fn runtime(&self) -> &PcmRuntime {
        &self.runtime
    }

    pub fn setup(&self) -> Option<&PcmSetup> {
        self.runtime.setup.as_ref()
    }

    pub fn buffer_size(&self) -> Frames {
        self.runtime.buffer_size()
    }

    pub fn appl_ptr(&self) -> Frames {
        self.device.appl_ptr()
    }

    pub fn hw_ptr(&self) -> Frames {
        self.device.hw_ptr()
    }

    pub fn poll_fd(&self) -> BorrowedFd<'_> {
        self.device.poll_fd()
    }

    fn check_setup(&self) -> Result<()> {
        if self.runtime.setup.is_none() {
            return Err(Error::BadState(self.device.state()));
        }
        Ok(())
    }

    /// Closes the PCM.
    ///
    /// The device is always released. An error removing the shared memory
    /// backing is still reported.
    pub fn close(mut self) -> Result<()> {
        log::trace!("closing PCM {}", self.runtime.name);
        let unmapped = if self.mmapped { self.munmap() } else { Ok(()) };
        if let Err(err) = &unmapped {
            log::warn!("{}: {}", self.runtime.name, err);
        }
        self.device.close()?;
        unmapped
    }

    pub fn card(&self) -> Result<i32> {
        self.device.card()
    }

    pub fn info(&self) -> Result<PcmInfo> {
        self.device.info()
    }

    pub fn nonblock(&mut self, nonblock: bool) -> Result<()> {
        self.device.nonblock(nonblock)?;
        self.runtime.mode.set(OpenMode::NONBLOCK, nonblock);
        Ok(())
    }

    pub fn async_notify(&mut self, sig: i32, pid: libc::pid_t) -> Result<()> {
        self.device.async_notify(sig, pid)
    }

    /// The configuration space this device supports.
    pub fn hw_params_any(&self) -> Result<HwParams> {
        let mut params = HwParams::any();
        self.hw_refine(&mut params)?;
        Ok(params)
    }

    pub fn hw_refine(&self, params: &mut HwParams) -> Result<()> {
        self.device.hw_refine(&self.runtime, params)
    }

    /// Refines `params`, commits the resulting setup and prepares the PCM.
    pub fn hw_params(&mut self, params: &mut HwParams) -> Result<()> {
        let state = self.device.state();
        if matches!(state, PcmState::Running | PcmState::Paused) {
            return Err(Error::BadState(state));
        }
        self.hw_refine(params)?;
        let setup = params.choose()?;
        self.device.hw_params(&self.runtime, params)?;
        if self.mmapped && !setup.access.is_mmap() {
            self.munmap()?;
        }

        let previous = (self.runtime.setup.replace(setup), self.runtime.boundary);
        self.runtime.boundary = pointer::boundary(setup.buffer_size);
        // The current mapping stays in place until the new one exists.
        if setup.access.is_mmap() {
            if let Err(err) = self.mmap() {
                (self.runtime.setup, self.runtime.boundary) = previous;
                return Err(err);
            }
        }
        log::debug!("{}: hw_params committed: {:?}", self.runtime.name, setup);
        self.prepare()
    }

    pub fn sw_params(&mut self, params: &SwParams) -> Result<()> {
        self.check_setup()?;
        self.device.sw_params(&self.runtime, params)?;
        self.runtime.sw_params = *params;
        Ok(())
    }

    pub fn status(&self) -> Result<PcmStatus> {
        self.device.status(&self.runtime)
    }

    pub fn state(&self) -> PcmState {
        self.device.state()
    }

    pub fn delay(&self) -> Result<SFrames> {
        self.device.delay(&self.runtime)
    }

    pub fn prepare(&mut self) -> Result<()> {
        self.check_setup()?;
        self.device.prepare(&self.runtime)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.check_setup()?;
        self.device.reset(&self.runtime)
    }

    pub fn start(&mut self) -> Result<()> {
        self.check_setup()?;
        self.device.start(&self.runtime)
    }

    pub fn drop_stream(&mut self) -> Result<()> {
        self.check_setup()?;
        self.device.drop_stream(&self.runtime)
    }

    pub fn drain(&mut self) -> Result<()> {
        self.check_setup()?;
        self.device.drain(&self.runtime)
    }

    pub fn pause(&mut self, enable: bool) -> Result<()> {
        self.check_setup()?;
        self.device.pause(&self.runtime, enable)
    }

    pub fn rewind(&mut self, frames: Frames) -> Result<Frames> {
        self.device.rewind(&self.runtime, frames)
    }

    pub fn forward(&mut self, frames: Frames) -> Result<Frames> {
        self.device.forward(&self.runtime, frames)
    }

    pub fn writei(&mut self, buf: &[u8], frames: Frames) -> Result<Frames> {
        self.device.writei(&self.runtime, buf, frames)
    }

    pub fn writen(&mut self, bufs: &[&[u8]], frames: Frames) -> Result<Frames> {
        self.device.writen(&self.runtime, bufs, frames)
    }

    pub fn readi(&mut self, buf: &mut [u8], frames: Frames) -> Result<Frames> {
        self.device.readi(&self.runtime, buf, frames)
    }

    pub fn readn(&mut self, bufs: &mut [&mut [u8]], frames: Frames) -> Result<Frames> {
        self.device.readn(&self.runtime, bufs, frames)
    }

    pub fn avail_update(&mut self) -> Result<Frames> {
        self.device.avail_update(&self.runtime)
    }

    pub fn mmap_forward(&mut self, frames: Frames) -> Result<Frames> {
        self.device.mmap_forward(&self.runtime, frames)
    }

    pub fn channel_info(&self, channel: u32) -> Result<ChannelInfo> {
        let setup = self
            .runtime
            .setup
            .ok_or(Error::BadState(self.device.state()))?;
        if channel >= setup.channels {
            return Err(Error::InvalidParameter("channel"));
        }
        self.device.channel_info(&self.runtime, channel)
    }

    pub fn mmap(&mut self) -> Result<()> {
        self.check_setup()?;
        self.device.mmap(&self.runtime)?;
        self.mmapped = true;
        Ok(())
    }

    pub fn munmap(&mut self) -> Result<()> {
        self.mmapped = false;
        self.device.munmap(&self.runtime)
    }

    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.device.dump(&self.runtime, out)
    }

    #[cfg(test)]
    pub(crate) fn device(&self) -> &dyn PcmDevice {
        self.device.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Access, Format};

    fn setup(access: Access) -> PcmSetup {
        let mut params = HwParams::any();
        params.set_access(access).unwrap();
        params.set_format(Format::S16Le).unwrap();
        params.set_channels(2).unwrap();
        params.set_buffer_size(1024).unwrap();
        params.choose().unwrap()
    }

    #[test]
    fn test_display_fmt() {
        assert_eq!(&PcmState::Paused.to_string(), "PAUSED");
        assert_eq!(&PcmStream::Capture.to_string(), "CAPTURE");
    }

    #[test]
    fn test_runtime_defaults() {
        let rt = PcmRuntime::new("null", PcmStream::Playback, OpenMode::empty());
        assert_eq!(rt.buffer_size(), 0);
        assert_eq!(rt.start_mode(), StartMode::Data);
        assert_eq!(rt.info(), InfoFlags::empty());
        assert_eq!(rt.frames_to_bytes(64), None);

        let mut out = String::new();
        rt.dump_setup(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_runtime_dump_setup() {
        let mut rt = PcmRuntime::new("null", PcmStream::Capture, OpenMode::empty());
        rt.setup = Some(setup(Access::RwInterleaved));
        rt.boundary = pointer::boundary(1024);

        let mut out = String::new();
        rt.dump_setup(&mut out).unwrap();
        assert!(out.starts_with("stream       : CAPTURE\n"));
        assert!(out.contains("buffer_size  : 1024\n"));
        assert!(out.contains("start_mode   : DATA\n"));
    }

    #[test]
    fn test_channel_info_layout() {
        let interleaved = ChannelInfo::shm(&setup(Access::MmapInterleaved), 1, Some(7));
        assert_eq!(interleaved.shmid, Some(7));
        assert_eq!(interleaved.first, 16);
        assert_eq!(interleaved.step, 32);

        let planar = ChannelInfo::shm(&setup(Access::MmapNoninterleaved), 1, None);
        assert_eq!(planar.first, 1024 * 16);
        assert_eq!(planar.step, 16);
    }
}
