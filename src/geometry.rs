// src/geometry.rs
//
// Pixel geometry primitives plus the source-geometry metadata a backend
// reports from its describe() probe.

use crate::ops::Format;

/// A width/height pair in pixels. Always positive for real sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Shorter of the two sides.
    pub fn shortest_side(&self) -> u32 {
        self.width.min(self.height)
    }

    fn swapped(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

/// A rectangular pixel region within some source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn size(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Whether this region covers the given size entirely.
    pub fn is_full(&self, full: Dimensions) -> bool {
        self.x == 0 && self.y == 0 && self.width == full.width && self.height == full.height
    }
}

/// Embedded orientation correction, quantized to quarter turns.
///
/// Mirrored EXIF orientations (2, 4, 5, 7) are folded onto their rotational
/// part; the protocol geometry only cares about the axis swap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Orientation {
    /// Map an EXIF Orientation tag value (1-8) onto a quarter-turn
    /// correction. Unknown values mean "no correction".
    pub fn from_exif(value: u16) -> Self {
        match value {
            3 | 4 => Orientation::Rotate180,
            5 | 6 => Orientation::Rotate90,
            7 | 8 => Orientation::Rotate270,
            _ => Orientation::Rotate0,
        }
    }

    pub fn degrees(&self) -> u16 {
        match self {
            Orientation::Rotate0 => 0,
            Orientation::Rotate90 => 90,
            Orientation::Rotate180 => 180,
            Orientation::Rotate270 => 270,
        }
    }

    /// The display size of a raster whose raw decode size is `size`.
    pub fn adjusted_size(&self, size: Dimensions) -> Dimensions {
        match self {
            Orientation::Rotate90 | Orientation::Rotate270 => size.swapped(),
            _ => size,
        }
    }
}

/// One resolution level of a (possibly pyramidal) source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Level {
    pub size: Dimensions,
    /// Native tile size, if the level is tiled. Untiled levels report the
    /// full level size here so geometry consumers have one code path.
    pub tile_size: Option<Dimensions>,
}

impl Level {
    pub fn untiled(size: Dimensions) -> Self {
        Self {
            size,
            tile_size: None,
        }
    }

    pub fn tiled(size: Dimensions, tile_size: Dimensions) -> Self {
        Self {
            size,
            tile_size: Some(tile_size),
        }
    }
}

/// Source geometry as reported by a backend's describe() probe.
///
/// All protocol-facing math goes through the virtual (orientation-corrected)
/// size, never the raw decode size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceGeometry {
    pub format: Format,
    pub orientation: Orientation,
    /// Resolution levels, largest first. Never empty.
    pub levels: Vec<Level>,
}

impl SourceGeometry {
    pub fn new(format: Format, size: Dimensions) -> Self {
        Self {
            format,
            orientation: Orientation::Rotate0,
            levels: vec![Level::untiled(size)],
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Raw decode size of the full-resolution level.
    pub fn full_size(&self) -> Dimensions {
        self.levels[0].size
    }

    /// Orientation-corrected display size. The basis for all
    /// protocol-facing geometry.
    pub fn virtual_size(&self) -> Dimensions {
        self.orientation.adjusted_size(self.full_size())
    }

    /// Orientation-corrected tile size of a level, falling back to the
    /// level's full size when untiled.
    pub fn virtual_tile_size(&self, level: &Level) -> Dimensions {
        self.orientation
            .adjusted_size(level.tile_size.unwrap_or(level.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_from_exif_maps_rotations() {
        assert_eq!(Orientation::from_exif(1), Orientation::Rotate0);
        assert_eq!(Orientation::from_exif(3), Orientation::Rotate180);
        assert_eq!(Orientation::from_exif(6), Orientation::Rotate90);
        assert_eq!(Orientation::from_exif(8), Orientation::Rotate270);
        // Out-of-range values are treated as unoriented
        assert_eq!(Orientation::from_exif(0), Orientation::Rotate0);
        assert_eq!(Orientation::from_exif(9), Orientation::Rotate0);
    }

    #[test]
    fn virtual_size_swaps_axes_for_quarter_turns() {
        let geometry = SourceGeometry::new(Format::Jpg, Dimensions::new(600, 400))
            .with_orientation(Orientation::Rotate90);
        assert_eq!(geometry.full_size(), Dimensions::new(600, 400));
        assert_eq!(geometry.virtual_size(), Dimensions::new(400, 600));
    }

    #[test]
    fn virtual_tile_size_falls_back_to_level_size() {
        let geometry = SourceGeometry::new(Format::Tif, Dimensions::new(800, 600));
        let level = geometry.levels[0];
        assert_eq!(geometry.virtual_tile_size(&level), Dimensions::new(800, 600));

        let tiled = Level::tiled(Dimensions::new(800, 600), Dimensions::new(256, 256));
        assert_eq!(geometry.virtual_tile_size(&tiled), Dimensions::new(256, 256));
    }

    #[test]
    fn region_full_detection() {
        let full = Dimensions::new(100, 50);
        assert!(Region::new(0, 0, 100, 50).is_full(full));
        assert!(!Region::new(0, 0, 100, 49).is_full(full));
        assert!(!Region::new(1, 0, 99, 50).is_full(full));
    }
}
