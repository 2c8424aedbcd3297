// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause
//! Transfer loop driving a PCM as fast as it accepts frames.

use std::{
    fmt,
    path::PathBuf,
    time::{Duration, Instant},
};

use crate::{
    args::NullArgs,
    params::{Access, Format, StartMode, SwParams},
    pcm::{OpenMode, Pcm, PcmState, PcmStream},
    pointer::Frames,
    Error, PcmConfig, Result,
};

#[derive(Debug, Clone)]
/// This structure is the public API through which an external program
/// configures a benchmark run.
pub struct BenchConfig {
    pub name: String,
    /// PCM definitions file; without one the null PCM is opened directly.
    pub definitions: Option<PathBuf>,
    pub stream: PcmStream,
    pub mode: OpenMode,
    pub access: Access,
    pub format: Format,
    pub channels: u32,
    pub rate: u32,
    pub period_size: Frames,
    pub buffer_size: Frames,
    pub start_mode: StartMode,
    pub frames: Frames,
    pub iterations: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            name: "null".to_owned(),
            definitions: None,
            stream: PcmStream::Playback,
            mode: OpenMode::empty(),
            access: Access::RwInterleaved,
            format: Format::S16Le,
            channels: 2,
            rate: 48000,
            period_size: 1024,
            buffer_size: 4096,
            start_mode: StartMode::Data,
            frames: 256,
            iterations: 1000,
        }
    }
}

impl From<NullArgs> for BenchConfig {
    fn from(args: NullArgs) -> Self {
        Self {
            name: args.name,
            definitions: args.config,
            stream: args.stream,
            mode: if args.nonblock {
                OpenMode::NONBLOCK
            } else {
                OpenMode::empty()
            },
            access: args.access,
            format: args.format,
            channels: args.channels,
            rate: args.rate,
            period_size: args.period_size,
            buffer_size: args.buffer_size,
            start_mode: if args.explicit_start {
                StartMode::Explicit
            } else {
                StartMode::Data
            },
            frames: args.frames,
            iterations: args.iterations,
        }
    }
}

/// Outcome of [`run_bench`].
#[derive(Debug, Clone)]
pub struct BenchReport {
    pub frames: Frames,
    pub calls: u64,
    pub elapsed: Duration,
    /// State once the transfer loop finished.
    pub state: PcmState,
    pub avail: Frames,
    /// Device dump taken after the loop.
    pub dump: String,
}

impl fmt::Display for BenchReport {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let secs = self.elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            f64::INFINITY
        };
        write!(
            fmt,
            "{} frames in {} calls, {:?} ({:.0} frames/s), state {}, avail {}",
            self.frames, self.calls, self.elapsed, rate, self.state, self.avail
        )
    }
}

fn open(config: &BenchConfig) -> Result<Pcm> {
    match &config.definitions {
        Some(path) => {
            let definition = PcmConfig::lookup(path, &config.name)?;
            crate::open_pcm(&config.name, &definition, config.stream, config.mode)
        }
        None => crate::open(&config.name, config.stream, config.mode),
    }
}

fn configure(pcm: &mut Pcm, config: &BenchConfig) -> Result<()> {
    let mut params = pcm.hw_params_any()?;
    params.set_access(config.access)?;
    params.set_format(config.format)?;
    params.set_channels(config.channels)?;
    params.set_rate(config.rate)?;
    params.set_period_size(config.period_size)?;
    params.set_buffer_size(config.buffer_size)?;
    pcm.hw_params(&mut params)?;
    pcm.sw_params(&SwParams {
        start_mode: config.start_mode,
        ..Default::default()
    })
}

/// Opens and configures a PCM, then issues `config.iterations` transfer
/// calls of `config.frames` frames each.
pub fn run_bench(config: &BenchConfig) -> Result<BenchReport> {
    log::trace!("run_bench(config = {:?})", config);
    let mut pcm = open(config)?;
    configure(&mut pcm, config)?;
    let setup = *pcm.setup().ok_or(Error::BadState(pcm.state()))?;

    // One call never moves more than the ring holds.
    if config.frames > setup.buffer_size {
        log::error!(
            "{}: {} frames per call exceed the {} frame buffer",
            config.name,
            config.frames,
            setup.buffer_size
        );
        return Err(Error::InvalidParameter("frames"));
    }
    let bytes = setup
        .frames_to_bytes(config.frames)
        .and_then(|bytes| usize::try_from(bytes).ok())
        .ok_or(Error::InvalidParameter("frames"))?;
    let channels = setup.channels as usize;
    let mut interleaved = vec![0u8; bytes];
    let mut planes = vec![vec![0u8; bytes / channels]; channels];

    // Memory mapped transfers never start the stream on their own.
    if config.start_mode == StartMode::Explicit || setup.access.is_mmap() {
        pcm.start()?;
    }

    let started = Instant::now();
    let mut moved: Frames = 0;
    match (setup.access, config.stream) {
        (access, _) if access.is_mmap() => {
            for _ in 0..config.iterations {
                moved += pcm.mmap_forward(config.frames)?;
            }
        }
        (Access::RwInterleaved, PcmStream::Playback) => {
            for _ in 0..config.iterations {
                moved += pcm.writei(&interleaved, config.frames)?;
            }
        }
        (Access::RwInterleaved, PcmStream::Capture) => {
            for _ in 0..config.iterations {
                moved += pcm.readi(&mut interleaved, config.frames)?;
            }
        }
        (_, PcmStream::Playback) => {
            let bufs: Vec<&[u8]> = planes.iter().map(Vec::as_slice).collect();
            for _ in 0..config.iterations {
                moved += pcm.writen(&bufs, config.frames)?;
            }
        }
        (_, PcmStream::Capture) => {
            let mut bufs: Vec<&mut [u8]> = planes.iter_mut().map(Vec::as_mut_slice).collect();
            for _ in 0..config.iterations {
                moved += pcm.readn(&mut bufs, config.frames)?;
            }
        }
    }
    let elapsed = started.elapsed();

    let status = pcm.status()?;
    let mut dump = String::new();
    if let Err(err) = pcm.dump(&mut dump) {
        log::warn!("{}: dump failed: {}", config.name, err);
    }
    pcm.drop_stream()?;
    pcm.close()?;

    Ok(BenchReport {
        frames: moved,
        calls: config.iterations,
        elapsed,
        state: status.state,
        avail: status.avail,
        dump,
    })
}
