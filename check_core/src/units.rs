//! # Unit Types
//!
//! Unit tags for recorded quantities. A value recorded in the ledger may carry
//! a unit; when a session is configured with a display unit, the value is
//! converted before it is stored so every candidate is reported in the same
//! unit.
//!
//! ## Design Philosophy
//!
//! We use a closed set of unit tags rather than a full units library because:
//! - Limit-state checks use a consistent set of units per quantity
//! - We want JSON serialization to be clean (`{"magnitude": 12.5, "unit": "kN"}`)
//! - Conversion is a single multiply through the SI base unit
//!
//! ## Supported Dimensions
//!
//! - Length: mm, m, in, ft
//! - Force: N, kN, lb, kip
//! - Stress: kPa, MPa, psi, ksi
//! - Moment: N*mm, N*m, kN*m, in-lb, ft-lb, kip-ft
//! - Distributed load: N/mm, kN/m, plf, klf
//! - Area: mm2, m2, in2, ft2
//!
//! ## Example
//!
//! ```rust
//! use check_core::units::{Quantity, Unit};
//!
//! let tr = Quantity::new(412_000.0, Unit::Newton);
//! let tr_kn = tr.to(Unit::Kilonewton).unwrap();
//! assert!((tr_kn.magnitude - 412.0).abs() < 1e-9);
//!
//! // Converting across dimensions is an error
//! assert!(tr.to(Unit::Millimetre).is_err());
//! ```

use std::fmt;
use std::ops::{Div, Mul, Neg};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{CalcError, CalcResult};

/// Physical dimension of a unit. Only units of equal dimension convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Length,
    Force,
    Stress,
    Moment,
    ForcePerLength,
    Area,
}

// ============================================================================
// Unit Table (macro to reduce boilerplate)
// ============================================================================

macro_rules! unit_table {
    ($( $variant:ident => ($symbol:expr, $dimension:ident, $to_base:expr) ),+ $(,)?) => {
        /// A unit tag. Serializes as its symbol (e.g. `"kN"`).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum Unit {
            $( $variant, )+
        }

        impl Unit {
            /// All supported units
            pub const ALL: &'static [Unit] = &[ $( Unit::$variant, )+ ];

            /// Display symbol
            pub fn symbol(self) -> &'static str {
                match self {
                    $( Unit::$variant => $symbol, )+
                }
            }

            /// Physical dimension
            pub fn dimension(self) -> Dimension {
                match self {
                    $( Unit::$variant => Dimension::$dimension, )+
                }
            }

            /// Multiplier taking a magnitude in this unit to the SI base unit
            pub fn to_base(self) -> f64 {
                match self {
                    $( Unit::$variant => $to_base, )+
                }
            }
        }
    };
}

unit_table! {
    Millimetre => ("mm", Length, 1.0e-3),
    Metre => ("m", Length, 1.0),
    Inch => ("in", Length, 0.0254),
    Foot => ("ft", Length, 0.3048),

    Newton => ("N", Force, 1.0),
    Kilonewton => ("kN", Force, 1.0e3),
    Pound => ("lb", Force, 4.448_221_615_260_5),
    Kip => ("kip", Force, 4_448.221_615_260_5),

    Kilopascal => ("kPa", Stress, 1.0e3),
    Megapascal => ("MPa", Stress, 1.0e6),
    Psi => ("psi", Stress, 6_894.757_293_168),
    Ksi => ("ksi", Stress, 6_894_757.293_168),

    NewtonMillimetre => ("N*mm", Moment, 1.0e-3),
    NewtonMetre => ("N*m", Moment, 1.0),
    KilonewtonMetre => ("kN*m", Moment, 1.0e3),
    InchPound => ("in-lb", Moment, 0.112_984_829_027_6),
    FootPound => ("ft-lb", Moment, 1.355_817_948_331_4),
    KipFoot => ("kip-ft", Moment, 1_355.817_948_331_4),

    NewtonPerMillimetre => ("N/mm", ForcePerLength, 1.0e3),
    KilonewtonPerMetre => ("kN/m", ForcePerLength, 1.0e3),
    PoundPerFoot => ("plf", ForcePerLength, 14.593_902_937_206),
    KipPerFoot => ("klf", ForcePerLength, 14_593.902_937_206),

    SquareMillimetre => ("mm2", Area, 1.0e-6),
    SquareMetre => ("m2", Area, 1.0),
    SquareInch => ("in2", Area, 6.4516e-4),
    SquareFoot => ("ft2", Area, 9.290_304e-2),
}

impl Unit {
    /// Factor converting a magnitude in `self` to a magnitude in `target`.
    pub fn factor_to(self, target: Unit) -> CalcResult<f64> {
        if self.dimension() != target.dimension() {
            return Err(CalcError::unit_mismatch(self.symbol(), target.symbol()));
        }
        Ok(self.to_base() / target.to_base())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Unit {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Unit::ALL
            .iter()
            .copied()
            .find(|u| u.symbol() == wanted)
            .ok_or_else(|| CalcError::invalid_input("unit", wanted, "Unknown unit symbol"))
    }
}

impl TryFrom<String> for Unit {
    type Error = CalcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.symbol().to_string()
    }
}

// ============================================================================
// Quantity
// ============================================================================

/// A magnitude tagged with a unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub magnitude: f64,
    pub unit: Unit,
}

impl Quantity {
    /// Create a quantity
    pub fn new(magnitude: f64, unit: Unit) -> Self {
        Quantity { magnitude, unit }
    }

    /// Convert to another unit of the same dimension
    pub fn to(self, unit: Unit) -> CalcResult<Quantity> {
        let factor = self.unit.factor_to(unit)?;
        Ok(Quantity::new(self.magnitude * factor, unit))
    }

    /// Magnitude expressed in the SI base unit of this dimension
    pub fn base_magnitude(self) -> f64 {
        self.magnitude * self.unit.to_base()
    }

    /// Sum of two quantities, expressed in the unit of `self`
    pub fn checked_add(self, rhs: Quantity) -> CalcResult<Quantity> {
        let rhs = rhs.to(self.unit)?;
        Ok(Quantity::new(self.magnitude + rhs.magnitude, self.unit))
    }

    /// Difference of two quantities, expressed in the unit of `self`
    pub fn checked_sub(self, rhs: Quantity) -> CalcResult<Quantity> {
        let rhs = rhs.to(self.unit)?;
        Ok(Quantity::new(self.magnitude - rhs.magnitude, self.unit))
    }

    /// Dimensionless ratio of two quantities of the same dimension
    pub fn ratio(self, rhs: Quantity) -> CalcResult<f64> {
        let rhs = rhs.to(self.unit)?;
        Ok(self.magnitude / rhs.magnitude)
    }
}

impl Mul<f64> for Quantity {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self::Output {
        Quantity::new(self.magnitude * rhs, self.unit)
    }
}

impl Div<f64> for Quantity {
    type Output = Self;
    fn div(self, rhs: f64) -> Self::Output {
        Quantity::new(self.magnitude / rhs, self.unit)
    }
}

impl Neg for Quantity {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Quantity::new(-self.magnitude, self.unit)
    }
}
