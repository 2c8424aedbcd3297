// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause
//! Null PCM.
//!
//! Playback discards every frame, capture always has a full buffer ready.
//! There is no buffer, clock or interrupt behind the device: every transfer
//! completes immediately and moves the application and hardware pointers by
//! the same amount, and the available space is always the whole buffer.

use std::{
    fmt,
    fs::{File, OpenOptions},
    os::fd::{AsFd, BorrowedFd},
    time::SystemTime,
};

use crate::{
    params::{self, HwParams, InfoFlags, StartMode, SwParams},
    pcm::{
        ChannelInfo, OpenMode, Pcm, PcmFastOps, PcmInfo, PcmOps, PcmRuntime, PcmState,
        PcmStatus, PcmStream,
    },
    pointer::{self, Frames, SFrames},
    shm::ShmSegment,
    Error, PcmConfig, Result,
};

const DEV_NULL: &str = "/dev/null";
const DEV_FULL: &str = "/dev/full";

/// Fields a null PCM definition may carry.
const CONFIG_FIELDS: &[&str] = &["comment", "type", "stream"];

pub struct NullPcm {
    state: PcmState,
    trigger_time: Option<SystemTime>,
    /// Backing for memory mapped access, see [`PcmOps::mmap`].
    shm: Option<ShmSegment>,
    appl_ptr: Frames,
    hw_ptr: Frames,
    /// `/dev/null` for playback, `/dev/full` for capture: always ready.
    poll_fd: File,
}

impl fmt::Debug for NullPcm {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct(stringify!(NullPcm))
            .field("state", &self.state)
            .field("appl_ptr", &self.appl_ptr)
            .field("hw_ptr", &self.hw_ptr)
            .field("shmid", &self.shm.as_ref().map(ShmSegment::id))
            .finish_non_exhaustive()
    }
}

impl NullPcm {
    pub fn open(name: &str, stream: PcmStream, mode: OpenMode) -> Result<Pcm> {
        let (path, opened) = match stream {
            PcmStream::Playback => (DEV_NULL, OpenOptions::new().write(true).open(DEV_NULL)),
            PcmStream::Capture => (DEV_FULL, OpenOptions::new().read(true).open(DEV_FULL)),
        };
        let poll_fd = opened.map_err(|err| {
            log::error!("Cannot open {}", path);
            Error::OpenPollFd(path, err)
        })?;
        log::trace!("NullPcm open {} {:?} {:?}", name, stream, mode);

        let null = Self {
            state: PcmState::Open,
            trigger_time: None,
            shm: None,
            appl_ptr: 0,
            hw_ptr: 0,
            poll_fd,
        };
        Ok(Pcm::new(PcmRuntime::new(name, stream, mode), Box::new(null)))
    }

    pub fn open_with_config(
        name: &str,
        config: &PcmConfig,
        stream: PcmStream,
        mode: OpenMode,
    ) -> Result<Pcm> {
        config.check(CONFIG_FIELDS)?;
        Self::open(name, stream, mode)
    }

    /// Installs `shm` as the mmap backing, removing the previous segment.
    fn replace_shm(&mut self, shm: Option<ShmSegment>) {
        if let Some(old) = std::mem::replace(&mut self.shm, shm) {
            let id = old.id();
            if let Err(err) = old.remove() {
                log::warn!("shmctl IPC_RMID on segment {} failed: {}", id, err);
            }
        }
    }

    fn set_running(&mut self) {
        self.state = PcmState::Running;
        self.trigger_time = Some(SystemTime::now());
    }

    /// Starts a prepared stream on its first transfer, unless the stream
    /// must be started explicitly.
    ///
    /// Returns whether the stream was started.
    fn auto_start(&mut self, rt: &PcmRuntime) -> bool {
        if self.state != PcmState::Prepared || rt.start_mode() == StartMode::Explicit {
            return false;
        }
        log::debug!("{}: started by first transfer", rt.name);
        self.set_running();
        true
    }

    /// Capture auto-start: a whole buffer is captured the moment the stream
    /// starts.
    fn auto_start_capture(&mut self, rt: &PcmRuntime) {
        if self.auto_start(rt) {
            self.hw_ptr = pointer::forward(self.hw_ptr, rt.buffer_size(), rt.boundary);
        }
    }
}

impl PcmOps for NullPcm {
    fn close(self: Box<Self>) -> Result<()> {
        log::trace!("NullPcm close");
        Ok(())
    }

    fn card(&self) -> Result<i32> {
        Err(Error::NotAvailable)
    }

    fn info(&self) -> Result<PcmInfo> {
        Ok(PcmInfo::default())
    }

    fn hw_refine(&self, _rt: &PcmRuntime, params: &mut HwParams) -> Result<()> {
        let ret = params::refine(params);
        // Nothing is ever queued.
        params.fifo_size = 0;
        ret
    }

    fn hw_params(&mut self, _rt: &PcmRuntime, _params: &HwParams) -> Result<()> {
        Ok(())
    }

    fn sw_params(&mut self, _rt: &PcmRuntime, _params: &SwParams) -> Result<()> {
        Ok(())
    }

    fn channel_info(&self, rt: &PcmRuntime, channel: u32) -> Result<ChannelInfo> {
        let setup = rt.setup.ok_or(Error::BadState(self.state))?;
        Ok(ChannelInfo::shm(
            &setup,
            channel,
            self.shm.as_ref().map(ShmSegment::id),
        ))
    }

    fn dump(&self, rt: &PcmRuntime, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Null PCM")?;
        if rt.setup.is_some() {
            writeln!(out, "Its setup is:")?;
            rt.dump_setup(out)?;
        }
        Ok(())
    }

    fn nonblock(&mut self, _nonblock: bool) -> Result<()> {
        Ok(())
    }

    fn async_notify(&mut self, _sig: i32, _pid: libc::pid_t) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn mmap(&mut self, rt: &PcmRuntime) -> Result<()> {
        if rt.info().contains(InfoFlags::MMAP) {
            self.replace_shm(None);
            return Ok(());
        }
        let size = rt
            .frames_to_bytes(rt.buffer_size())
            .and_then(|bytes| usize::try_from(bytes).ok())
            .ok_or(Error::InvalidParameter("buffer_size"))?;
        let shm = ShmSegment::create(size).map_err(|err| {
            log::error!("shmget failed: {}", err);
            Error::Shm(err)
        })?;
        log::debug!("{}: mmap backed by shm segment {}", rt.name, shm.id());
        self.replace_shm(Some(shm));
        Ok(())
    }

    fn munmap(&mut self, _rt: &PcmRuntime) -> Result<()> {
        let Some(shm) = self.shm.take() else {
            return Ok(());
        };
        shm.remove().map_err(|err| {
            log::error!("shmctl IPC_RMID failed: {}", err);
            Error::Shm(err)
        })
    }

    fn poll_fd(&self) -> BorrowedFd<'_> {
        self.poll_fd.as_fd()
    }

    #[cfg(test)]
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl PcmFastOps for NullPcm {
    fn status(&self, rt: &PcmRuntime) -> Result<PcmStatus> {
        Ok(PcmStatus {
            state: self.state,
            trigger_time: self.trigger_time,
            tstamp: SystemTime::now(),
            avail: rt.buffer_size(),
            avail_max: rt.buffer_size(),
        })
    }

    fn state(&self) -> PcmState {
        self.state
    }

    fn delay(&self, _rt: &PcmRuntime) -> Result<SFrames> {
        Ok(0)
    }

    fn prepare(&mut self, rt: &PcmRuntime) -> Result<()> {
        log::trace!("{}: prepare from {}", rt.name, self.state);
        self.state = PcmState::Prepared;
        self.appl_ptr = 0;
        self.hw_ptr = 0;
        Ok(())
    }

    fn reset(&mut self, _rt: &PcmRuntime) -> Result<()> {
        self.appl_ptr = 0;
        self.hw_ptr = 0;
        Ok(())
    }

    fn start(&mut self, rt: &PcmRuntime) -> Result<()> {
        assert_eq!(
            self.state,
            PcmState::Prepared,
            "start() on a stream that is not prepared"
        );
        self.set_running();
        if rt.stream == PcmStream::Capture {
            self.appl_ptr = pointer::forward(self.appl_ptr, rt.buffer_size(), rt.boundary);
        }
        Ok(())
    }

    fn drop_stream(&mut self, _rt: &PcmRuntime) -> Result<()> {
        assert_ne!(self.state, PcmState::Open, "drop() on an unconfigured stream");
        self.state = PcmState::Setup;
        Ok(())
    }

    fn drain(&mut self, _rt: &PcmRuntime) -> Result<()> {
        assert_ne!(self.state, PcmState::Open, "drain() on an unconfigured stream");
        self.state = PcmState::Setup;
        Ok(())
    }

    fn pause(&mut self, _rt: &PcmRuntime, enable: bool) -> Result<()> {
        let expected = if enable {
            PcmState::Running
        } else {
            PcmState::Paused
        };
        if self.state != expected {
            return Err(Error::BadState(self.state));
        }
        // Releasing the pause leaves the stream paused as well.
        self.state = PcmState::Paused;
        Ok(())
    }

    fn rewind(&mut self, rt: &PcmRuntime, frames: Frames) -> Result<Frames> {
        match self.state {
            PcmState::Prepared | PcmState::Running => {
                self.appl_ptr = pointer::backward(self.appl_ptr, frames, rt.boundary);
                self.hw_ptr = pointer::backward(self.hw_ptr, frames, rt.boundary);
                Ok(frames)
            }
            state => Err(Error::BadState(state)),
        }
    }

    fn forward(&mut self, rt: &PcmRuntime, frames: Frames) -> Result<Frames> {
        match self.state {
            PcmState::Prepared | PcmState::Running => {
                self.appl_ptr = pointer::forward(self.appl_ptr, frames, rt.boundary);
                self.hw_ptr = pointer::forward(self.hw_ptr, frames, rt.boundary);
                Ok(frames)
            }
            state => Err(Error::BadState(state)),
        }
    }

    fn writei(&mut self, rt: &PcmRuntime, _buf: &[u8], frames: Frames) -> Result<Frames> {
        self.auto_start(rt);
        self.forward(rt, frames)
    }

    fn writen(&mut self, rt: &PcmRuntime, _bufs: &[&[u8]], frames: Frames) -> Result<Frames> {
        self.auto_start(rt);
        self.forward(rt, frames)
    }

    fn readi(&mut self, rt: &PcmRuntime, _buf: &mut [u8], frames: Frames) -> Result<Frames> {
        self.auto_start_capture(rt);
        self.forward(rt, frames)
    }

    fn readn(
        &mut self,
        rt: &PcmRuntime,
        _bufs: &mut [&mut [u8]],
        frames: Frames,
    ) -> Result<Frames> {
        self.auto_start_capture(rt);
        self.forward(rt, frames)
    }

    fn avail_update(&mut self, rt: &PcmRuntime) -> Result<Frames> {
        Ok(rt.buffer_size())
    }

    fn mmap_forward(&mut self, rt: &PcmRuntime, frames: Frames) -> Result<Frames> {
        self.forward(rt, frames)
    }

    fn appl_ptr(&self) -> Frames {
        self.appl_ptr
    }

    fn hw_ptr(&self) -> Frames {
        self.hw_ptr
    }
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsRawFd;

    use assert_matches::assert_matches;
    use rstest::rstest;

    use super::*;
    use crate::params::{Access, Format, Interval, MAX_BUFFER_FRAMES};

    const BUFFER_SIZE: Frames = 1024;

    fn configured(stream: PcmStream, access: Access) -> Pcm {
        crate::init_logger();
        let mut pcm = NullPcm::open("null", stream, OpenMode::empty()).unwrap();
        let mut params = pcm.hw_params_any().unwrap();
        params.set_access(access).unwrap();
        params.set_format(Format::S16Le).unwrap();
        params.set_channels(2).unwrap();
        params.set_rate(48000).unwrap();
        params.set_period_size(256).unwrap();
        params.set_buffer_size(BUFFER_SIZE).unwrap();
        pcm.hw_params(&mut params).unwrap();
        pcm
    }

    fn playback() -> Pcm {
        configured(PcmStream::Playback, Access::RwInterleaved)
    }

    fn capture() -> Pcm {
        configured(PcmStream::Capture, Access::RwInterleaved)
    }

    fn explicit_start(pcm: &mut Pcm) {
        pcm.sw_params(&SwParams {
            start_mode: StartMode::Explicit,
            ..Default::default()
        })
        .unwrap();
    }

    fn null_of(pcm: &Pcm) -> &NullPcm {
        pcm.device().as_any().downcast_ref::<NullPcm>().unwrap()
    }

    #[test]
    fn test_open_state() {
        let pcm = NullPcm::open("null", PcmStream::Playback, OpenMode::empty()).unwrap();
        assert_eq!(pcm.state(), PcmState::Open);
        assert_eq!(pcm.name(), "null");
        assert!(pcm.poll_fd().as_raw_fd() >= 0);
        assert!(pcm.setup().is_none());
    }

    #[test]
    fn test_hw_params_prepares() {
        let pcm = playback();
        assert_eq!(pcm.state(), PcmState::Prepared);
        assert_eq!(pcm.buffer_size(), BUFFER_SIZE);
        assert_eq!(pcm.appl_ptr(), 0);
        assert_eq!(pcm.hw_ptr(), 0);
    }

    #[test]
    fn test_calls_before_setup_fail() {
        let mut pcm = NullPcm::open("null", PcmStream::Playback, OpenMode::empty()).unwrap();
        assert_matches!(pcm.prepare(), Err(Error::BadState(PcmState::Open)));
        assert_matches!(pcm.start(), Err(Error::BadState(PcmState::Open)));
        assert_matches!(pcm.drop_stream(), Err(Error::BadState(PcmState::Open)));
        assert_matches!(pcm.forward(1), Err(Error::BadState(PcmState::Open)));
        assert_matches!(pcm.writei(&[], 1), Err(Error::BadState(PcmState::Open)));
        assert_eq!(pcm.appl_ptr(), 0);
    }

    #[test]
    fn test_hw_refine_zeroes_fifo_size() {
        let pcm = NullPcm::open("null", PcmStream::Playback, OpenMode::empty()).unwrap();

        let mut params = HwParams::any();
        params.fifo_size = 4096;
        pcm.hw_refine(&mut params).unwrap();
        assert_eq!(params.fifo_size, 0);

        let mut params = HwParams::any();
        params.fifo_size = 17;
        params.rate = Interval::new(1, 2);
        assert_matches!(
            pcm.hw_refine(&mut params),
            Err(Error::InvalidParameter("rate"))
        );
        assert_eq!(params.fifo_size, 0);
    }

    #[rstest]
    #[case(PcmState::Prepared, 1)]
    #[case(PcmState::Prepared, BUFFER_SIZE)]
    #[case(PcmState::Running, 37)]
    #[case(PcmState::Running, BUFFER_SIZE * 5 + 3)]
    fn test_forward_rewind_inverse(#[case] state: PcmState, #[case] frames: Frames) {
        let mut pcm = playback();
        if state == PcmState::Running {
            pcm.start().unwrap();
        }
        pcm.forward(100).unwrap();
        let (appl, hw) = (pcm.appl_ptr(), pcm.hw_ptr());

        assert_eq!(pcm.forward(frames).unwrap(), frames);
        assert_eq!(pcm.appl_ptr(), pcm.hw_ptr());
        assert_eq!(pcm.rewind(frames).unwrap(), frames);
        assert_eq!((pcm.appl_ptr(), pcm.hw_ptr()), (appl, hw));
        assert_eq!(pcm.state(), state);
    }

    #[test]
    fn test_rewind_below_zero_wraps() {
        let mut pcm = playback();
        pcm.rewind(5).unwrap();
        let boundary = pcm.runtime().boundary;
        assert_eq!(pcm.appl_ptr(), boundary - 5);
        assert_eq!(pcm.hw_ptr(), boundary - 5);
        pcm.forward(5).unwrap();
        assert_eq!(pcm.appl_ptr(), 0);
    }

    #[test]
    fn test_forward_rewind_bad_state() {
        let mut pcm = playback();
        pcm.start().unwrap();
        pcm.pause(true).unwrap();
        assert_matches!(pcm.forward(8), Err(Error::BadState(PcmState::Paused)));
        assert_matches!(pcm.rewind(8), Err(Error::BadState(PcmState::Paused)));
        assert_matches!(pcm.mmap_forward(8), Err(Error::BadState(PcmState::Paused)));

        pcm.drop_stream().unwrap();
        assert_matches!(pcm.forward(8), Err(Error::BadState(PcmState::Setup)));
        assert_eq!(pcm.appl_ptr(), 0);
        assert_eq!(pcm.hw_ptr(), 0);
    }

    #[test]
    fn test_avail_is_always_full_buffer() {
        let mut pcm = playback();
        assert_eq!(pcm.avail_update().unwrap(), BUFFER_SIZE);
        pcm.writei(&[0; 64], 16).unwrap();
        pcm.forward(3 * BUFFER_SIZE).unwrap();
        pcm.rewind(7).unwrap();
        assert_eq!(pcm.avail_update().unwrap(), BUFFER_SIZE);

        let status = pcm.status().unwrap();
        assert_eq!(status.avail, BUFFER_SIZE);
        assert_eq!(status.avail_max, BUFFER_SIZE);
        assert_eq!(pcm.delay().unwrap(), 0);
    }

    #[test]
    fn test_prepare_and_reset_clear_pointers() {
        let mut pcm = playback();
        pcm.start().unwrap();
        pcm.forward(300).unwrap();

        pcm.reset().unwrap();
        assert_eq!(pcm.state(), PcmState::Running);
        assert_eq!((pcm.appl_ptr(), pcm.hw_ptr()), (0, 0));

        pcm.forward(300).unwrap();
        pcm.drain().unwrap();
        pcm.prepare().unwrap();
        assert_eq!(pcm.state(), PcmState::Prepared);
        assert_eq!((pcm.appl_ptr(), pcm.hw_ptr()), (0, 0));
    }

    #[test]
    fn test_prepare_then_start() {
        let mut pcm = playback();
        pcm.drop_stream().unwrap();
        pcm.prepare().unwrap();
        pcm.start().unwrap();
        assert_eq!(pcm.state(), PcmState::Running);
        assert_eq!(pcm.appl_ptr(), 0);
        assert!(pcm.status().unwrap().trigger_time.is_some());
    }

    #[test]
    #[should_panic(expected = "not prepared")]
    fn test_start_twice_panics() {
        let mut pcm = playback();
        pcm.start().unwrap();
        let _ = pcm.start();
    }

    #[test]
    #[should_panic(expected = "unconfigured")]
    fn test_drop_open_device_panics() {
        let pcm = NullPcm::open("null", PcmStream::Playback, OpenMode::empty()).unwrap();
        let mut null = NullPcm {
            state: PcmState::Open,
            trigger_time: None,
            shm: None,
            appl_ptr: 0,
            hw_ptr: 0,
            poll_fd: File::open(DEV_NULL).unwrap(),
        };
        let _ = null.drop_stream(pcm.runtime());
    }

    #[test]
    fn test_write_auto_starts() {
        let mut pcm = playback();
        assert_eq!(pcm.writei(&[0; 256], 64).unwrap(), 64);
        assert_eq!(pcm.state(), PcmState::Running);
        assert_eq!((pcm.appl_ptr(), pcm.hw_ptr()), (64, 64));
        assert!(pcm.status().unwrap().trigger_time.is_some());

        let left = [0u8; 128];
        let right = [0u8; 128];
        assert_eq!(pcm.writen(&[&left, &right], 64).unwrap(), 64);
        assert_eq!((pcm.appl_ptr(), pcm.hw_ptr()), (128, 128));
    }

    #[test]
    fn test_write_ignores_payload() {
        let mut pcm = playback();
        assert_eq!(pcm.writei(&[], 512).unwrap(), 512);
        assert_eq!(pcm.appl_ptr(), 512);
    }

    #[test]
    fn test_write_explicit_start() {
        let mut pcm = playback();
        explicit_start(&mut pcm);
        assert_eq!(pcm.writei(&[0; 16], 4).unwrap(), 4);
        assert_eq!(pcm.state(), PcmState::Prepared);
        assert!(pcm.status().unwrap().trigger_time.is_none());
        pcm.start().unwrap();
        assert_eq!(pcm.state(), PcmState::Running);
    }

    #[test]
    fn test_read_auto_start_fills_buffer() {
        let mut pcm = capture();
        let mut buf = [0xaau8; 64];
        assert_eq!(pcm.readi(&mut buf, 16).unwrap(), 16);
        assert_eq!(pcm.state(), PcmState::Running);
        assert_eq!(pcm.appl_ptr(), 16);
        assert_eq!(pcm.hw_ptr(), BUFFER_SIZE + 16);
        assert!(buf.iter().all(|b| *b == 0xaa));

        // Only the starting read pre-advances the hardware pointer.
        let mut left = [0u8; 32];
        let mut right = [0u8; 32];
        assert_eq!(pcm.readn(&mut [&mut left, &mut right], 16).unwrap(), 16);
        assert_eq!(pcm.appl_ptr(), 32);
        assert_eq!(pcm.hw_ptr(), BUFFER_SIZE + 32);
    }

    #[test]
    fn test_read_explicit_start() {
        let mut pcm = capture();
        explicit_start(&mut pcm);
        let mut buf = [0u8; 64];
        pcm.readi(&mut buf, 16).unwrap();
        assert_eq!(pcm.state(), PcmState::Prepared);
        assert_eq!((pcm.appl_ptr(), pcm.hw_ptr()), (16, 16));
    }

    #[test]
    fn test_pause() {
        let mut pcm = playback();
        assert_matches!(pcm.pause(true), Err(Error::BadState(PcmState::Prepared)));
        assert_eq!(pcm.state(), PcmState::Prepared);
        assert_matches!(pcm.pause(false), Err(Error::BadState(PcmState::Prepared)));

        pcm.start().unwrap();
        assert_matches!(pcm.pause(false), Err(Error::BadState(PcmState::Running)));
        pcm.pause(true).unwrap();
        assert_eq!(pcm.state(), PcmState::Paused);

        pcm.pause(false).unwrap();
        assert_eq!(pcm.state(), PcmState::Paused);
    }

    #[rstest]
    #[case(PcmState::Prepared)]
    #[case(PcmState::Running)]
    #[case(PcmState::Paused)]
    #[case(PcmState::Setup)]
    fn test_drop_drain_idempotent(#[case] from: PcmState) {
        for drain in [false, true] {
            let mut pcm = playback();
            match from {
                PcmState::Running => pcm.start().unwrap(),
                PcmState::Paused => {
                    pcm.start().unwrap();
                    pcm.pause(true).unwrap();
                }
                PcmState::Setup => pcm.drop_stream().unwrap(),
                _ => (),
            }
            assert_eq!(pcm.state(), from);

            for _ in 0..2 {
                if drain {
                    pcm.drain().unwrap();
                } else {
                    pcm.drop_stream().unwrap();
                }
                assert_eq!(pcm.state(), PcmState::Setup);
            }
        }
    }

    #[test]
    fn test_playback_scenario() {
        let mut pcm = playback();
        assert_eq!(pcm.writei(&[0; 256], 64).unwrap(), 64);
        assert_eq!(pcm.state(), PcmState::Running);

        pcm.pause(true).unwrap();
        assert_eq!(pcm.state(), PcmState::Paused);

        assert_matches!(pcm.pause(true), Err(Error::BadState(PcmState::Paused)));
        assert_eq!(pcm.state(), PcmState::Paused);
        pcm.close().unwrap();
    }

    #[test]
    fn test_capture_scenario() {
        let mut pcm = capture();
        pcm.start().unwrap();
        assert_eq!(pcm.appl_ptr(), BUFFER_SIZE);
        assert_eq!(pcm.hw_ptr(), 0);
        assert_eq!(pcm.state(), PcmState::Running);
        pcm.close().unwrap();
    }

    #[test]
    fn test_mmap_allocates_shm() {
        let mut pcm = configured(PcmStream::Playback, Access::MmapInterleaved);
        let shmid = null_of(&pcm).shm.as_ref().map(ShmSegment::id);
        assert!(shmid.is_some());

        let info = pcm.channel_info(1).unwrap();
        assert_eq!(info.shmid, shmid);
        assert_eq!(info.first, 16);
        assert_eq!(info.step, 32);
        assert_matches!(pcm.channel_info(2), Err(Error::InvalidParameter("channel")));

        assert_eq!(pcm.mmap_forward(128).unwrap(), 128);
        assert_eq!((pcm.appl_ptr(), pcm.hw_ptr()), (128, 128));

        pcm.munmap().unwrap();
        assert!(null_of(&pcm).shm.is_none());
        // Nothing left to remove.
        pcm.munmap().unwrap();
        pcm.close().unwrap();
    }

    #[test]
    fn test_failed_mmap_recommit_keeps_mapping() {
        let mut pcm = configured(PcmStream::Playback, Access::MmapInterleaved);
        let before = *pcm.setup().unwrap();
        let shmid = null_of(&pcm).shm.as_ref().map(ShmSegment::id);
        assert!(shmid.is_some());

        let mut params = pcm.hw_params_any().unwrap();
        params.set_access(Access::MmapInterleaved).unwrap();
        params.set_format(Format::FloatLe).unwrap();
        params.set_channels(32).unwrap();
        params.set_buffer_size(MAX_BUFFER_FRAMES).unwrap();
        assert_matches!(pcm.hw_params(&mut params), Err(Error::Shm(_)));

        assert_eq!(pcm.setup(), Some(&before));
        assert_eq!(pcm.channel_info(0).unwrap().shmid, shmid);
        assert_eq!(null_of(&pcm).shm.as_ref().map(ShmSegment::id), shmid);
        assert_eq!(pcm.mmap_forward(64).unwrap(), 64);

        // A successful re-commit swaps in a new segment.
        let mut params = pcm.hw_params_any().unwrap();
        params.set_access(Access::MmapInterleaved).unwrap();
        params.set_buffer_size(2 * BUFFER_SIZE).unwrap();
        pcm.hw_params(&mut params).unwrap();
        let remapped = null_of(&pcm).shm.as_ref().map(ShmSegment::id);
        assert!(remapped.is_some());
        assert_ne!(remapped, shmid);
        assert_eq!(pcm.buffer_size(), 2 * BUFFER_SIZE);

        // Switching to read/write access drops the mapping.
        let mut params = pcm.hw_params_any().unwrap();
        params.set_access(Access::RwInterleaved).unwrap();
        pcm.hw_params(&mut params).unwrap();
        assert!(null_of(&pcm).shm.is_none());
        pcm.close().unwrap();
    }

    #[test]
    fn test_mmap_native_needs_no_shm() {
        let mut pcm = NullPcm::open("null", PcmStream::Capture, OpenMode::empty()).unwrap();
        let mut params = pcm.hw_params_any().unwrap();
        params.set_access(Access::MmapNoninterleaved).unwrap();
        params.set_buffer_size(BUFFER_SIZE).unwrap();
        params.info |= InfoFlags::MMAP;
        pcm.hw_params(&mut params).unwrap();

        assert!(null_of(&pcm).shm.is_none());
        assert_eq!(pcm.channel_info(0).unwrap().shmid, None);
    }

    #[test]
    fn test_rw_access_does_not_map() {
        let pcm = playback();
        assert!(null_of(&pcm).shm.is_none());
    }

    #[test]
    fn test_dump() {
        let pcm = NullPcm::open("null", PcmStream::Playback, OpenMode::empty()).unwrap();
        let mut out = String::new();
        pcm.dump(&mut out).unwrap();
        assert_eq!(out, "Null PCM\n");

        let pcm = playback();
        let mut out = String::new();
        pcm.dump(&mut out).unwrap();
        assert!(out.starts_with("Null PCM\nIts setup is:\nstream       : PLAYBACK\n"));
        assert!(out.contains("fifo_size    : 0\n"));
    }

    #[test]
    fn test_platform_glue() {
        let mut pcm = NullPcm::open("null", PcmStream::Capture, OpenMode::empty()).unwrap();
        assert_matches!(pcm.card(), Err(Error::NotAvailable));
        assert_matches!(pcm.async_notify(libc::SIGIO, 1), Err(Error::NotSupported));
        assert_eq!(pcm.info().unwrap(), PcmInfo::default());

        pcm.nonblock(true).unwrap();
        assert!(pcm.mode().contains(OpenMode::NONBLOCK));
        pcm.nonblock(false).unwrap();
        assert!(!pcm.mode().contains(OpenMode::NONBLOCK));
    }

    #[test]
    fn test_hw_params_refused_while_running() {
        let mut pcm = playback();
        pcm.start().unwrap();
        let mut params = HwParams::any();
        assert_matches!(
            pcm.hw_params(&mut params),
            Err(Error::BadState(PcmState::Running))
        );
        assert_eq!(pcm.buffer_size(), BUFFER_SIZE);
    }

    #[test]
    fn test_open_with_config() {
        let config = PcmConfig::new()
            .with("type", "null")
            .with("stream", "capture")
            .with("comment", "always full");
        let pcm =
            NullPcm::open_with_config("null", &config, PcmStream::Capture, OpenMode::empty())
                .unwrap();
        assert_eq!(pcm.stream(), PcmStream::Capture);
    }
}
