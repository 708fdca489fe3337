//! ARGB color stored as a packed 32-bit integer
//!
//! The persisted document format stores colors as signed 32-bit integers
//! (`0xFF000000` is written as `-16777216`). Both the signed and the unsigned
//! spelling are accepted when reading.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0xFF00_0000);
    pub const WHITE: Color = Color(0xFFFF_FFFF);
    pub const TRANSPARENT: Color = Color(0x0000_0000);
    pub const RED: Color = Color(0xFFFF_0000);
    pub const BLUE: Color = Color(0xFF00_00FF);
    pub const HIGHLIGHT: Color = Color(0x66FF_EB3B);

    pub fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self((a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    pub fn alpha(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn red(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(&self) -> u8 {
        self.0 as u8
    }

    /// Components in `(r, g, b, a)` order.
    pub fn to_rgba8(&self) -> (u8, u8, u8, u8) {
        (self.red(), self.green(), self.blue(), self.alpha())
    }

    /// The signed integer spelling used on the wire.
    pub fn to_signed(&self) -> i32 {
        self.0 as i32
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.to_signed())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        if value < i32::MIN as i64 || value > u32::MAX as i64 {
            return Err(serde::de::Error::custom(format!("color out of range: {value}")));
        }
        // Truncation keeps the two's complement bit pattern of negative values.
        Ok(Color(value as u32))
    }
}
