use serde::{Deserialize, Serialize};
use std::fmt;

/// Length units that show up in user requests. Models are always built in mm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthUnit {
    Millimeter,
    Centimeter,
    Meter,
    Inch,
    Foot,
}

impl LengthUnit {
    pub fn to_mm(&self, value: f64) -> f64 {
        match self {
            Self::Millimeter => value,
            Self::Centimeter => value * 10.0,
            Self::Meter => value * 1000.0,
            Self::Inch => value * 25.4,
            Self::Foot => value * 304.8,
        }
    }

    pub fn from_mm(&self, mm: f64) -> f64 {
        match self {
            Self::Millimeter => mm,
            Self::Centimeter => mm / 10.0,
            Self::Meter => mm / 1000.0,
            Self::Inch => mm / 25.4,
            Self::Foot => mm / 304.8,
        }
    }

    pub fn is_imperial(&self) -> bool {
        matches!(self, Self::Inch | Self::Foot)
    }

    /// Singular spelled-out name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Millimeter => "millimeter",
            Self::Centimeter => "centimeter",
            Self::Meter => "meter",
            Self::Inch => "inch",
            Self::Foot => "foot",
        }
    }

    /// Unit for a written suffix such as `in`, `inches`, `"` or `ft`.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "mm" | "millimeter" | "millimeters" | "millimetre" | "millimetres" => Some(Self::Millimeter),
            "cm" | "centimeter" | "centimeters" | "centimetre" | "centimetres" => Some(Self::Centimeter),
            "m" | "meter" | "meters" | "metre" | "metres" => Some(Self::Meter),
            "in" | "inch" | "inches" | "\"" => Some(Self::Inch),
            "ft" | "foot" | "feet" | "'" => Some(Self::Foot),
            _ => None,
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Millimeter => write!(f, "mm"),
            Self::Centimeter => write!(f, "cm"),
            Self::Meter => write!(f, "m"),
            Self::Inch => write!(f, "in"),
            Self::Foot => write!(f, "ft"),
        }
    }
}
