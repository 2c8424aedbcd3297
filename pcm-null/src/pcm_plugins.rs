// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

mod null;

pub use self::null::NullPcm;
use crate::{
    pcm::{OpenMode, Pcm, PcmStream},
    Error, PcmConfig, Result,
};

/// Kinds of PCM that can be named by a configuration `type` field.
#[derive(Clone, Copy, Default, Debug, Eq, PartialEq)]
pub enum PcmType {
    #[default]
    Null,
}

impl std::str::FromStr for PcmType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "null" => Ok(Self::Null),
            other => Err(Error::UnknownPcmType(other.to_owned())),
        }
    }
}

/// Opens the PCM described by `config`, dispatching on its `type` field.
pub fn open_pcm(
    name: &str,
    config: &PcmConfig,
    stream: PcmStream,
    mode: OpenMode,
) -> Result<Pcm> {
    let pcm_type: PcmType = config
        .pcm_type()
        .ok_or(Error::MissingConfigField("type"))?
        .parse()?;
    log::trace!("opening PCM {} of type {:?}", name, pcm_type);
    match pcm_type {
        PcmType::Null => NullPcm::open_with_config(name, config, stream, mode),
    }
}
