// SPDX-License-Identifier: CC0-1.0

//! Gathering seed material from strong entropy sources.
//!
//! Sources report failures only as a [`StrongRngError`], which has two
//! severities and a stable numeric code. Either one means the caller has no
//! strong entropy from that source and must try another or give up.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};
use std::vec;

use log::debug;

use crate::egd::{wipe, EgdError};

/// Code for a strong RNG that could not be initialized.
pub const ERR_INIT_STRONG_RNG: u16 = 0x0003;
/// Code for a strong RNG that failed after it was reached.
pub const ERR_ACCESS_STRONG_RNG: u16 = 0x0004;

/// Properties of an entropy source.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SourceFlags(u32);

impl SourceFlags {
    /// The source is trusted to be strong on its own.
    pub const STRONG: SourceFlags = SourceFlags(0x001);
    /// The source is an entropy gathering daemon.
    pub const SRC_EGD: SourceFlags = SourceFlags(0x800);
    /// Bits naming where a source draws from. One source per domain is enough.
    pub const DOMAIN_MASK: SourceFlags = SourceFlags(0xffff_ff00);

    /// The domain bits of these flags.
    pub const fn domain(self) -> Self {
        SourceFlags(self.0 & Self::DOMAIN_MASK.0)
    }

    /// No flags set.
    pub const fn empty() -> Self {
        SourceFlags(0)
    }

    /// Flags from their raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        SourceFlags(bits)
    }

    /// The raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every flag of `other` is set.
    pub const fn contains(self, other: SourceFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any flag of `other` is set.
    pub const fn intersects(self, other: SourceFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// These flags with every flag of `other` cleared.
    pub const fn without(self, other: SourceFlags) -> Self {
        SourceFlags(self.0 & !other.0)
    }
}

impl BitOr for SourceFlags {
    type Output = SourceFlags;

    fn bitor(self, rhs: SourceFlags) -> SourceFlags {
        SourceFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for SourceFlags {
    fn bitor_assign(&mut self, rhs: SourceFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::LowerHex for SourceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Strong entropy is unavailable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StrongRngError {
    /// The source could not be set up or reached.
    Init,
    /// The source was reached but did not deliver.
    Access,
}

impl StrongRngError {
    /// Stable numeric code, suitable for reporting across a process boundary.
    pub fn code(self) -> u16 {
        match self {
            StrongRngError::Init => ERR_INIT_STRONG_RNG,
            StrongRngError::Access => ERR_ACCESS_STRONG_RNG,
        }
    }
}

impl fmt::Display for StrongRngError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrongRngError::Init => write!(f, "Cannot initialize strong RNG."),
            StrongRngError::Access => write!(f, "Cannot access strong RNG."),
        }
    }
}

impl std::error::Error for StrongRngError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StrongRngError::Init => None,
            StrongRngError::Access => None,
        }
    }
}

impl From<EgdError> for StrongRngError {
    fn from(e: EgdError) -> Self {
        match e {
            EgdError::EndpointUnreachable(_) => StrongRngError::Init,
            EgdError::OutOfRange { .. }
            | EgdError::WriteError(_)
            | EgdError::NoData
            | EgdError::Truncated { .. }
            | EgdError::ShortOutput { .. } => StrongRngError::Access,
        }
    }
}

/// A source of seed material.
pub trait EntropySource {
    /// Properties of this source.
    fn flags(&self) -> SourceFlags;

    /// Fill all of `out`, or fail without leaving partial output behind.
    fn fill(&mut self, out: &mut [u8]) -> Result<(), StrongRngError>;
}

/// Which sources [`gather`] consults.
#[derive(Clone, Debug, Default)]
pub struct GatherConfig {
    required: SourceFlags,
    disabled: SourceFlags,
    weak: SourceFlags,
}

impl GatherConfig {
    /// Consult every source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only consult sources with all of these flags.
    pub fn with_required(mut self, flags: SourceFlags) -> Self {
        self.required = flags;
        self
    }

    /// Skip sources with any of these flags.
    pub fn with_disabled(mut self, flags: SourceFlags) -> Self {
        self.disabled = flags;
        self
    }

    /// Do not count sources with any of these flags as strong.
    pub fn with_weak(mut self, flags: SourceFlags) -> Self {
        self.weak = flags;
        self
    }
}

/// Combine the output of every usable source into `out`.
///
/// The outputs are XORed together, so the result is as strong as the
/// strongest independent source. Once a source from some domain delivers, the
/// remaining sources of that domain are skipped, two correlated outputs would
/// otherwise cancel.
///
/// # Returns
///
/// A `Result` containing:
///   * `Ok(SourceFlags)`: Union of the flags of the sources which delivered.
///   * `Err(StrongRngError)`: No strong source delivered. The last source
///     error, or `Init` if no source was consulted. `out` is zeroed.
pub fn gather(
    config: &GatherConfig,
    sources: &mut [&mut dyn EntropySource],
    out: &mut [u8],
) -> Result<SourceFlags, StrongRngError> {
    wipe(out);
    let mut scratch = vec![0u8; out.len()];
    let mut got = SourceFlags::empty();
    let mut last_err = None;

    for source in sources.iter_mut() {
        let mut flags = source.flags();
        if flags.intersects(config.disabled) || !flags.contains(config.required) {
            continue;
        }
        if flags.domain().intersects(got) {
            debug!("Entropy domain {:x} already covered.", flags.domain());
            continue;
        }
        match source.fill(&mut scratch) {
            Ok(()) => {
                if flags.intersects(config.weak) {
                    flags = flags.without(SourceFlags::STRONG);
                }
                got |= flags;
                for (byte, fresh) in out.iter_mut().zip(scratch.iter()) {
                    *byte ^= *fresh;
                }
            }
            Err(e) => {
                debug!("Entropy source {:x} failed: {e}", flags);
                last_err = Some(e);
            }
        }
    }
    wipe(&mut scratch);

    if !got.contains(SourceFlags::STRONG) {
        wipe(out);
        return Err(last_err.unwrap_or(StrongRngError::Init));
    }
    Ok(got)
}
