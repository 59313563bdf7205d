//! Page rotation values.

use serde::{Deserialize, Serialize};

/// A PDF page rotation. Pages only ever rotate in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Reduce any angle into [0, 360) and snap to the nearest quarter turn.
    /// Non-finite input is treated as no rotation.
    pub fn normalize(degrees: f64) -> Self {
        if !degrees.is_finite() {
            return Rotation::Deg0;
        }
        let reduced = degrees.rem_euclid(360.0);
        match (reduced / 90.0).round() as i64 % 4 {
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            3 => Rotation::Deg270,
            _ => Rotation::Deg0,
        }
    }

    pub fn from_degrees(degrees: i64) -> Self {
        Self::normalize(degrees as f64)
    }

    pub fn degrees(self) -> i64 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Rotate further by `degrees`, normalizing the sum.
    pub fn rotated_by(self, degrees: f64) -> Self {
        Self::normalize(self.degrees() as f64 + degrees)
    }

    /// True when the page's width and height swap on display.
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Normalized rotation in degrees, one of 0, 90, 180, 270.
pub fn normalize_rotation(degrees: f64) -> i64 {
    Rotation::normalize(degrees).degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_wraps_and_snaps() {
        assert_eq!(normalize_rotation(450.0), 90);
        assert_eq!(normalize_rotation(-90.0), 270);
        assert_eq!(normalize_rotation(360.0), 0);
        assert_eq!(normalize_rotation(44.0), 0);
        assert_eq!(normalize_rotation(46.0), 90);
        assert_eq!(normalize_rotation(359.0), 0);
        assert_eq!(normalize_rotation(f64::NAN), 0);
    }

    #[test]
    fn test_rotated_by_accumulates() {
        assert_eq!(Rotation::Deg270.rotated_by(180.0), Rotation::Deg90);
        assert_eq!(Rotation::Deg0.rotated_by(-90.0), Rotation::Deg270);
    }
}
