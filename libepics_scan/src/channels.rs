// Process variable names for the Hall D slow controls we scan.
// The AC (active collimator) pads are read out through a VMIC ADC in the collimator IOC. The
// pretty names (AC:inner:ped:x_plus etc.) are not archived, so we build the raw ADC channel
// names directly.
use std::fmt::Display;
use std::str::FromStr;

use super::error::ChannelError;

/// Electron beam current from the CEBAF beam current monitor
pub const BEAM_CURRENT_PV: &str = "IBCAD00CRCUR6";
/// Archive deployment holding recent data
pub const DEFAULT_DEPLOYMENT: &str = "ops";
/// Archive deployment holding the full multi-year record
pub const HISTORY_DEPLOYMENT: &str = "history";
/// Number of TAGM columns with scalers
pub const TAGM_COLUMNS: u32 = 102;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ring {
    Inner,
    Outer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Plus,
    Minus,
}

/// One wedge of the active collimator, written as `[io][xy][+-]`, e.g. `oy-`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AcWedge {
    pub ring: Ring,
    pub axis: Axis,
    pub side: Side,
}

impl AcWedge {
    /// The archived ADC channel for this wedge
    pub fn pv_name(&self) -> String {
        let chanset = match self.ring {
            Ring::Inner => 1,
            Ring::Outer => 2,
        };
        let mut chan = match self.axis {
            Axis::X => 1,
            Axis::Y => 3,
        };
        if self.side == Side::Minus {
            chan += 1;
        }
        format!("IOCHDCOL:VMICADC{chan}_{chanset}")
    }
}

impl FromStr for AcWedge {
    type Err = ChannelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let chars: Vec<char> = lower.chars().collect();
        if chars.len() != 3 {
            return Err(ChannelError::BadWedge(s.to_string()));
        }
        let ring = match chars[0] {
            'i' => Ring::Inner,
            'o' => Ring::Outer,
            _ => return Err(ChannelError::BadWedge(s.to_string())),
        };
        let axis = match chars[1] {
            'x' => Axis::X,
            'y' => Axis::Y,
            _ => return Err(ChannelError::BadWedge(s.to_string())),
        };
        let side = match chars[2] {
            '+' => Side::Plus,
            '-' => Side::Minus,
            _ => return Err(ChannelError::BadWedge(s.to_string())),
        };
        Ok(Self { ring, axis, side })
    }
}

impl Display for AcWedge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = match self.ring {
            Ring::Inner => 'i',
            Ring::Outer => 'o',
        };
        let axis = match self.axis {
            Axis::X => 'x',
            Axis::Y => 'y',
        };
        let side = match self.side {
            Side::Plus => '+',
            Side::Minus => '-',
        };
        write!(f, "{ring}{axis}{side}")
    }
}

/// A tagger microscope column, 1 to [TAGM_COLUMNS]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagmColumn(u32);

impl TagmColumn {
    pub fn new(column: u32) -> Result<Self, ChannelError> {
        if (1..=TAGM_COLUMNS).contains(&column) {
            Ok(Self(column))
        } else {
            Err(ChannelError::BadTagmColumn(column))
        }
    }

    /// Every column in order
    pub fn all() -> impl Iterator<Item = TagmColumn> {
        (1..=TAGM_COLUMNS).map(TagmColumn)
    }

    pub fn number(&self) -> u32 {
        self.0
    }

    /// The archived scaler rate for this column
    pub fn pv_name(&self) -> String {
        format!("TAGM:T:{}:scaler_t1", self.0)
    }
}
