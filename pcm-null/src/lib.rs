// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause
//! A null PCM device.
//!
//! The playback side discards everything written to it and the capture side
//! always has a full buffer of data ready. Neither ever blocks, so the device
//! is useful for exercising PCM clients, test harnesses and benchmarks
//! without sound hardware.
//!
//! ```no_run
//! use pcm_null::{HwParams, OpenMode, PcmState, PcmStream};
//!
//! let mut pcm = pcm_null::open("null", PcmStream::Playback, OpenMode::empty())?;
//! let mut params = HwParams::any();
//! params.set_channels(2)?;
//! params.set_buffer_size(1024)?;
//! pcm.hw_params(&mut params)?;
//!
//! assert_eq!(pcm.writei(&[0; 256], 64)?, 64);
//! assert_eq!(pcm.state(), PcmState::Running);
//! pcm.close()?;
//! # Ok::<(), pcm_null::Error>(())
//! ```

pub mod args;
pub mod bench;
pub mod config;
pub mod params;
pub mod pcm;
pub mod pcm_plugins;
pub mod pointer;
mod shm;

use std::io::{Error as IoError, ErrorKind};

use thiserror::Error as ThisError;

pub use crate::{
    config::PcmConfig,
    params::{Access, Format, HwParams, PcmSetup, StartMode, SwParams},
    pcm::{
        ChannelInfo, OpenMode, Pcm, PcmDevice, PcmFastOps, PcmInfo, PcmOps, PcmRuntime, PcmState,
        PcmStatus, PcmStream,
    },
    pcm_plugins::{open_pcm, NullPcm, PcmType},
    pointer::{Frames, SFrames},
};

pub type Result<T> = std::result::Result<T, Error>;

/// Custom error types
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Operation not allowed in PCM state {0}")]
    BadState(PcmState),
    #[error("PCM is not backed by a sound card")]
    NotAvailable,
    #[error("Operation not supported by this PCM")]
    NotSupported,
    #[error("Unknown field {0}")]
    UnknownConfigField(String),
    #[error("Required field {0} is missing")]
    MissingConfigField(&'static str),
    #[error("Unknown PCM type {0}")]
    UnknownPcmType(String),
    #[error("No definition found for PCM {0}")]
    UnknownPcm(String),
    #[error("Invalid hardware parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("Cannot open {0}: {1}")]
    OpenPollFd(&'static str, IoError),
    #[error("Shared memory operation failed: {0}")]
    Shm(IoError),
    #[error("Could not load configuration: {0}")]
    Config(Box<figment::Error>),
}

impl Error {
    /// The negative errno a C caller would receive for this error.
    pub fn errno(&self) -> i32 {
        let errno = match self {
            Self::BadState(_) => libc::EBADFD,
            Self::NotAvailable | Self::UnknownPcm(_) => libc::ENOENT,
            Self::NotSupported => libc::ENOSYS,
            Self::UnknownConfigField(_)
            | Self::MissingConfigField(_)
            | Self::UnknownPcmType(_)
            | Self::InvalidParameter(_)
            | Self::Config(_) => libc::EINVAL,
            Self::OpenPollFd(_, err) | Self::Shm(err) => err.raw_os_error().unwrap_or(libc::EIO),
        };
        -errno
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl std::convert::From<Error> for IoError {
    fn from(e: Error) -> Self {
        match e {
            Error::OpenPollFd(_, err) | Error::Shm(err) => err,
            e => IoError::new(ErrorKind::Other, e),
        }
    }
}

/// Opens a null PCM.
pub fn open(name: &str, stream: PcmStream, mode: OpenMode) -> Result<Pcm> {
    NullPcm::open(name, stream, mode)
}

/// Opens a null PCM from its configuration node.
///
/// Only the `comment`, `type` and `stream` fields are accepted.
pub fn open_with_config(
    name: &str,
    config: &PcmConfig,
    stream: PcmStream,
    mode: OpenMode,
) -> Result<Pcm> {
    NullPcm::open_with_config(name, config, stream, mode)
}

#[cfg(test)]
pub fn init_logger() {
    std::env::set_var("RUST_LOG", "trace");
    let _ = env_logger::builder().is_test(true).try_init();
}
