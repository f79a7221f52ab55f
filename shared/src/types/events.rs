//! Hardware counter event definitions
//!
//! An [`Event`] names one hardware counter source: the counter block, the block
//! instance and the counter selector within that block. These are the values the
//! hardware layer is programmed with and the values it reports back alongside
//! each sample.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width in bytes of one counter sample in the output buffer
pub const SAMPLE_BYTE_WIDTH: usize = std::mem::size_of::<u64>();

/// Width in bytes of one memory-controller (UMC) sample
pub const UMC_SAMPLE_BYTE_WIDTH: usize = 8;

/// Hardware counter block kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockKind {
    Cpc,
    Cpf,
    Gds,
    Grbm,
    GrbmSe,
    Spi,
    Sq,
    Sqcs,
    Sx,
    Ta,
    Tca,
    Tcc,
    Tcp,
    Td,
    Gl2a,
    Gl2c,
    Gcea,
    Gcr,
    Umc,
}

impl BlockKind {
    pub const ALL: [BlockKind; 19] = [
        BlockKind::Cpc,
        BlockKind::Cpf,
        BlockKind::Gds,
        BlockKind::Grbm,
        BlockKind::GrbmSe,
        BlockKind::Spi,
        BlockKind::Sq,
        BlockKind::Sqcs,
        BlockKind::Sx,
        BlockKind::Ta,
        BlockKind::Tca,
        BlockKind::Tcc,
        BlockKind::Tcp,
        BlockKind::Td,
        BlockKind::Gl2a,
        BlockKind::Gl2c,
        BlockKind::Gcea,
        BlockKind::Gcr,
        BlockKind::Umc,
    ];

    /// Block name as used in counter names (`SQ`, `GRBM_SE`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpc => "CPC",
            Self::Cpf => "CPF",
            Self::Gds => "GDS",
            Self::Grbm => "GRBM",
            Self::GrbmSe => "GRBM_SE",
            Self::Spi => "SPI",
            Self::Sq => "SQ",
            Self::Sqcs => "SQCS",
            Self::Sx => "SX",
            Self::Ta => "TA",
            Self::Tca => "TCA",
            Self::Tcc => "TCC",
            Self::Tcp => "TCP",
            Self::Td => "TD",
            Self::Gl2a => "GL2A",
            Self::Gl2c => "GL2C",
            Self::Gcea => "GCEA",
            Self::Gcr => "GCR",
            Self::Umc => "UMC",
        }
    }

    /// The memory controller block is device-wide: on multi-partition devices its
    /// samples are not replicated per partition.
    pub fn is_device_wide(&self) -> bool {
        matches!(self, Self::Umc)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown counter block: {0}")]
pub struct ParseBlockKindError(pub String);

impl FromStr for BlockKind {
    type Err = ParseBlockKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        BlockKind::ALL
            .iter()
            .copied()
            .find(|b| b.name() == upper)
            .ok_or_else(|| ParseBlockKindError(s.to_string()))
    }
}

/// Identifies one block instance: `(block kind, block instance index)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockKey {
    pub block: BlockKind,
    pub index: u32,
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.block, self.index)
    }
}

/// A single hardware counter source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Event {
    /// Counter block kind
    pub block: BlockKind,

    /// Block instance index
    pub block_index: u32,

    /// Counter selector within the block
    pub counter_id: u32,
}

impl Event {
    pub fn new(block: BlockKind, block_index: u32, counter_id: u32) -> Self {
        Self {
            block,
            block_index,
            counter_id,
        }
    }

    /// The block instance this event is programmed on
    pub fn block_key(&self) -> BlockKey {
        BlockKey {
            block: self.block,
            index: self.block_index,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_key(), self.counter_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_equality_needs_all_fields() {
        let a = Event::new(BlockKind::Sq, 0, 4);
        assert_eq!(a, Event::new(BlockKind::Sq, 0, 4));
        assert_ne!(a, Event::new(BlockKind::Sq, 1, 4));
        assert_ne!(a, Event::new(BlockKind::Sq, 0, 5));
        assert_ne!(a, Event::new(BlockKind::Tcc, 0, 4));
    }

    #[test]
    fn test_block_kind_parse() {
        assert_eq!("sq".parse::<BlockKind>().unwrap(), BlockKind::Sq);
        assert_eq!("GRBM_SE".parse::<BlockKind>().unwrap(), BlockKind::GrbmSe);
        assert!("NOPE".parse::<BlockKind>().is_err());
    }

    #[test]
    fn test_block_kind_serde_matches_name() {
        for block in BlockKind::ALL {
            let json = serde_json::to_string(&block).unwrap();
            assert_eq!(json, format!("\"{}\"", block.name()));
        }
    }

    #[test]
    fn test_only_umc_is_device_wide() {
        let wide: Vec<_> = BlockKind::ALL.iter().filter(|b| b.is_device_wide()).collect();
        assert_eq!(wide, vec![&BlockKind::Umc]);
    }

    #[test]
    fn test_event_display() {
        let e = Event::new(BlockKind::Tcc, 2, 17);
        assert_eq!(e.to_string(), "TCC[2]:17");
    }
}
