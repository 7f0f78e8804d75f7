// src/info/compliance.rs
//
// Protocol feature and quality vocabularies, plus compliance-level
// selection from a backend's capability sets.

use crate::ops::Format;
use std::collections::HashSet;

/// Quality renderings a backend can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quality {
    Bitonal,
    Color,
    Default,
    Gray,
}

impl Quality {
    pub fn all() -> impl Iterator<Item = Quality> {
        [Quality::Bitonal, Quality::Color, Quality::Default, Quality::Gray].into_iter()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Quality::Bitonal => "bitonal",
            Quality::Color => "color",
            Quality::Default => "default",
            Quality::Gray => "gray",
        }
    }
}

/// Request features a backend implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcessorFeature {
    Mirroring,
    RegionByPercent,
    RegionByPixels,
    RegionSquare,
    RotationArbitrary,
    RotationBy90s,
    SizeAboveFull,
    SizeByDistortedWidthHeight,
    SizeByForcedWidthHeight,
    SizeByHeight,
    SizeByPercent,
    SizeByWidth,
    SizeByWidthHeight,
}

impl ProcessorFeature {
    pub fn all() -> impl Iterator<Item = ProcessorFeature> {
        [
            ProcessorFeature::Mirroring,
            ProcessorFeature::RegionByPercent,
            ProcessorFeature::RegionByPixels,
            ProcessorFeature::RegionSquare,
            ProcessorFeature::RotationArbitrary,
            ProcessorFeature::RotationBy90s,
            ProcessorFeature::SizeAboveFull,
            ProcessorFeature::SizeByDistortedWidthHeight,
            ProcessorFeature::SizeByForcedWidthHeight,
            ProcessorFeature::SizeByHeight,
            ProcessorFeature::SizeByPercent,
            ProcessorFeature::SizeByWidth,
            ProcessorFeature::SizeByWidthHeight,
        ]
        .into_iter()
    }

    /// Protocol name as it appears in the `supports` list.
    pub fn name(&self) -> &'static str {
        match self {
            ProcessorFeature::Mirroring => "mirroring",
            ProcessorFeature::RegionByPercent => "regionByPct",
            ProcessorFeature::RegionByPixels => "regionByPx",
            ProcessorFeature::RegionSquare => "regionSquare",
            ProcessorFeature::RotationArbitrary => "rotationArbitrary",
            ProcessorFeature::RotationBy90s => "rotationBy90s",
            ProcessorFeature::SizeAboveFull => "sizeAboveFull",
            ProcessorFeature::SizeByDistortedWidthHeight => "sizeByDistortedWh",
            ProcessorFeature::SizeByForcedWidthHeight => "sizeByForcedWh",
            ProcessorFeature::SizeByHeight => "sizeByH",
            ProcessorFeature::SizeByPercent => "sizeByPct",
            ProcessorFeature::SizeByWidth => "sizeByW",
            ProcessorFeature::SizeByWidthHeight => "sizeByWh",
        }
    }
}

/// Features provided by the surrounding service rather than the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceFeature {
    BaseUriRedirect,
    CanonicalLinkHeader,
    Cors,
    JsonldMediaType,
    ProfileLinkHeader,
    SizeByConfinedWidthHeight,
    SizeByWhitelisted,
}

impl ServiceFeature {
    pub fn all() -> impl Iterator<Item = ServiceFeature> {
        [
            ServiceFeature::BaseUriRedirect,
            ServiceFeature::CanonicalLinkHeader,
            ServiceFeature::Cors,
            ServiceFeature::JsonldMediaType,
            ServiceFeature::ProfileLinkHeader,
            ServiceFeature::SizeByConfinedWidthHeight,
            ServiceFeature::SizeByWhitelisted,
        ]
        .into_iter()
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServiceFeature::BaseUriRedirect => "baseUriRedirect",
            ServiceFeature::CanonicalLinkHeader => "canonicalLinkHeader",
            ServiceFeature::Cors => "cors",
            ServiceFeature::JsonldMediaType => "jsonldMediaType",
            ServiceFeature::ProfileLinkHeader => "profileLinkHeader",
            ServiceFeature::SizeByConfinedWidthHeight => "sizeByConfinedWh",
            ServiceFeature::SizeByWhitelisted => "sizeByWhListed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComplianceLevel {
    Zero,
    One,
    Two,
}

struct Requirements {
    service: &'static [ServiceFeature],
    processor: &'static [ProcessorFeature],
    qualities: &'static [Quality],
    formats: &'static [Format],
}

const LEVEL_1: Requirements = Requirements {
    service: &[
        ServiceFeature::BaseUriRedirect,
        ServiceFeature::Cors,
        ServiceFeature::JsonldMediaType,
    ],
    processor: &[
        ProcessorFeature::RegionByPixels,
        ProcessorFeature::SizeByWidth,
        ProcessorFeature::SizeByHeight,
        ProcessorFeature::SizeByPercent,
    ],
    qualities: &[Quality::Default],
    formats: &[Format::Jpg],
};

const LEVEL_2: Requirements = Requirements {
    service: &[
        ServiceFeature::BaseUriRedirect,
        ServiceFeature::Cors,
        ServiceFeature::JsonldMediaType,
        ServiceFeature::SizeByConfinedWidthHeight,
    ],
    processor: &[
        ProcessorFeature::RegionByPixels,
        ProcessorFeature::RegionByPercent,
        ProcessorFeature::RotationBy90s,
        ProcessorFeature::SizeByWidth,
        ProcessorFeature::SizeByHeight,
        ProcessorFeature::SizeByPercent,
        ProcessorFeature::SizeByDistortedWidthHeight,
        ProcessorFeature::SizeByWidthHeight,
    ],
    qualities: &[Quality::Default, Quality::Bitonal],
    formats: &[Format::Jpg, Format::Png],
};

impl ComplianceLevel {
    pub fn uri(&self) -> &'static str {
        match self {
            ComplianceLevel::Zero => "http://iiif.io/api/image/2/level0.json",
            ComplianceLevel::One => "http://iiif.io/api/image/2/level1.json",
            ComplianceLevel::Two => "http://iiif.io/api/image/2/level2.json",
        }
    }

    /// Pick the highest tier whose requirement set is fully covered by the
    /// given capability sets. Monotonic: growing any input set never lowers
    /// the result.
    pub fn for_capabilities(
        service_features: &HashSet<ServiceFeature>,
        processor_features: &HashSet<ProcessorFeature>,
        qualities: &HashSet<Quality>,
        output_formats: &HashSet<Format>,
    ) -> ComplianceLevel {
        let satisfies = |req: &Requirements| {
            req.service.iter().all(|f| service_features.contains(f))
                && req.processor.iter().all(|f| processor_features.contains(f))
                && req.qualities.iter().all(|q| qualities.contains(q))
                && req.formats.iter().all(|f| output_formats.contains(f))
        };
        if satisfies(&LEVEL_2) {
            ComplianceLevel::Two
        } else if satisfies(&LEVEL_1) {
            ComplianceLevel::One
        } else {
            ComplianceLevel::Zero
        }
    }
}
