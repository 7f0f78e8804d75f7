// src/info.rs
//
// The information document: a serializable description of what can be
// requested for a source, derived from its geometry and the capabilities
// of the backend that will serve it.

pub mod compliance;

use crate::config::ProcessorConfig;
use crate::geometry::{Dimensions, SourceGeometry};
use crate::processor::Processor;
use compliance::{ComplianceLevel, ServiceFeature};
use serde::Serialize;
use std::collections::BTreeSet;

const CONTEXT: &str = "http://iiif.io/api/image/2/context.json";
const PROTOCOL: &str = "http://iiif.io/api/image";

/// Features the surrounding service provides regardless of backend.
fn service_features() -> std::collections::HashSet<ServiceFeature> {
    ServiceFeature::all().collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tile {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "scaleFactors")]
    pub scale_factors: Vec<u32>,
}

/// The second profile entry: what the backend can deliver.
#[derive(Clone, Debug, Serialize)]
pub struct ProfileDescription {
    pub formats: BTreeSet<String>,
    pub qualities: BTreeSet<String>,
    pub supports: BTreeSet<String>,
    #[serde(rename = "maxArea", skip_serializing_if = "Option::is_none")]
    pub max_area: Option<u64>,
}

/// The full information document. Serializes to the protocol JSON shape;
/// `extra` carries opaque caller-provided keys merged at the top level.
#[derive(Clone, Debug, Serialize)]
pub struct ImageInfo {
    #[serde(rename = "@context")]
    pub context: &'static str,
    #[serde(rename = "@id")]
    pub id: String,
    pub protocol: &'static str,
    pub width: u32,
    pub height: u32,
    pub sizes: Vec<Size>,
    pub tiles: Vec<Tile>,
    /// [compliance URI, profile description]
    pub profile: (String, ProfileDescription),
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ImageInfo {
    /// Build the document for a source. `image_uri` becomes `@id`; `extra`
    /// keys are merged verbatim (the delegate hook stays external).
    pub fn for_source(
        image_uri: impl Into<String>,
        geometry: &SourceGeometry,
        processor: &dyn Processor,
        config: &ProcessorConfig,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        // All protocol-facing math uses the orientation-corrected size.
        let virtual_size = geometry.virtual_size();
        let ceiling = max_reduction_factor(virtual_size, config.min_info_size);

        let output_formats = processor.output_formats(geometry.format);
        let features = processor.supported_features();
        let qualities = processor.supported_qualities();
        let service = service_features();

        let compliance =
            ComplianceLevel::for_capabilities(&service, &features, &qualities, &output_formats);

        let profile = ProfileDescription {
            formats: output_formats
                .iter()
                .map(|f| f.extension().to_string())
                .collect(),
            qualities: qualities.iter().map(|q| q.name().to_string()).collect(),
            supports: features
                .iter()
                .map(|f| f.name().to_string())
                .chain(service.iter().map(|f| f.name().to_string()))
                .collect(),
            max_area: (config.max_area > 0).then_some(config.max_area),
        };

        ImageInfo {
            context: CONTEXT,
            id: image_uri.into(),
            protocol: PROTOCOL,
            width: virtual_size.width,
            height: virtual_size.height,
            sizes: sizes_ladder(virtual_size, ceiling, config.min_info_size),
            tiles: tiles_for(geometry, virtual_size, ceiling, config.min_tile_size),
            profile: (compliance.uri().to_string(), profile),
            extra,
        }
    }
}

/// Number of times the size can be halved before the smaller dimension
/// drops below `min_dimension`.
pub fn max_reduction_factor(size: Dimensions, min_dimension: u32) -> u32 {
    if min_dimension == 0 {
        return 0;
    }
    let mut dim = size.shortest_side();
    let mut factor = 0;
    loop {
        dim /= 2;
        if dim < min_dimension {
            break;
        }
        factor += 1;
    }
    factor
}

/// The power-of-two sizes ladder, ascending. Works for both multi- and
/// mono-resolution sources; entries below `min_size` on either axis are
/// excluded.
fn sizes_ladder(virtual_size: Dimensions, ceiling: u32, min_size: u32) -> Vec<Size> {
    let mut sizes = Vec::new();
    let mut divisor = 2.0f64;
    while divisor <= (1u64 << ceiling) as f64 {
        let width = (virtual_size.width as f64 / divisor).round() as u32;
        let height = (virtual_size.height as f64 / divisor).round() as u32;
        if width < min_size || height < min_size {
            break;
        }
        sizes.insert(0, Size { width, height });
        divisor *= 2.0;
    }
    sizes
}

/// A tile size hint near `min_tile_size` for an untiled source: repeatedly
/// ceil-halve the full size until an axis no longer exceeds the threshold.
pub fn smallest_tile_size(full: Dimensions, min_tile_size: u32) -> Dimensions {
    let mut size = full;
    while size.width > min_tile_size && size.height > min_tile_size {
        size = Dimensions::new(size.width.div_ceil(2), size.height.div_ceil(2));
    }
    size
}

/// For a natively tiled source: the smallest power-of-two multiple of the
/// native tile size that reaches the threshold, clamped to the full size.
pub fn smallest_tile_multiple(
    full: Dimensions,
    native_tile: Dimensions,
    min_tile_size: u32,
) -> Dimensions {
    let mut size = native_tile;
    while size.width < min_tile_size && size.height < min_tile_size {
        size = Dimensions::new(size.width * 2, size.height * 2);
    }
    Dimensions::new(size.width.min(full.width), size.height.min(full.height))
}

/// Tile hints: synthetic for untiled sources, derived from native tiling
/// otherwise, deduplicated by dimensions. Every tile advertises the full
/// scale-factor ladder.
fn tiles_for(
    geometry: &SourceGeometry,
    virtual_size: Dimensions,
    ceiling: u32,
    min_tile_size: u32,
) -> Vec<Tile> {
    let mut unique: Vec<Dimensions> = Vec::new();
    let first_tile = geometry.virtual_tile_size(&geometry.levels[0]);

    if geometry.levels.len() == 1 && first_tile == virtual_size {
        unique.push(smallest_tile_size(virtual_size, min_tile_size));
    } else {
        for level in &geometry.levels {
            let tile = smallest_tile_multiple(
                virtual_size,
                geometry.virtual_tile_size(level),
                min_tile_size,
            );
            if !unique.contains(&tile) {
                unique.push(tile);
            }
        }
    }

    let scale_factors: Vec<u32> = (0..=ceiling).map(|i| 1 << i).collect();
    unique
        .into_iter()
        .map(|size| Tile {
            width: size.width,
            height: size.height,
            scale_factors: scale_factors.clone(),
        })
        .collect()
}
