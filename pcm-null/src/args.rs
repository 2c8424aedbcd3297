// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause
//! An arguments type for the binary interface of this library.

use std::path::PathBuf;

use clap::Parser;

use crate::{
    params::{Access, Format},
    pcm::PcmStream,
    pointer::Frames,
};

#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct NullArgs {
    /// PCM name, also the entry looked up in the definitions file.
    #[clap(long, default_value = "null")]
    pub name: String,
    /// YAML file with PCM definitions.
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// stream direction
    #[clap(long, value_enum, default_value_t)]
    pub stream: PcmStream,
    /// open the PCM in non-blocking mode
    #[clap(long)]
    pub nonblock: bool,
    /// buffer layout
    #[clap(long, value_enum, default_value_t)]
    pub access: Access,
    /// sample format
    #[clap(long, value_enum, default_value_t)]
    pub format: Format,
    #[clap(long, default_value_t = 2)]
    pub channels: u32,
    #[clap(long, default_value_t = 48000)]
    pub rate: u32,
    /// period size in frames
    #[clap(long, default_value_t = 1024)]
    pub period_size: Frames,
    /// buffer size in frames
    #[clap(long, default_value_t = 4096)]
    pub buffer_size: Frames,
    /// require an explicit start instead of starting on the first transfer
    #[clap(long)]
    pub explicit_start: bool,
    /// frames moved by every transfer call, at most the buffer size
    #[clap(long, default_value_t = 256)]
    pub frames: Frames,
    /// number of transfer calls
    #[clap(long, default_value_t = 100_000)]
    pub iterations: u64,
}
