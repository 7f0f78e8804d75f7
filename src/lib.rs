// lib.rs
//
// casaba: a derivative-image processing core for IIIF Image API 2.0
// services.
//
// Design goals:
// - One operation model, several interchangeable backends
// - Fast partial decodes for pyramidal sources (region + reduction)
// - Safe subprocess plumbing for the delegate backends
// - Protocol-correct information documents and compliance reporting

pub mod config;
pub mod error;
pub mod geometry;
pub mod info;
pub mod ops;
pub mod processor;
pub mod reduction;
pub mod source;
pub mod writer;

pub use config::ProcessorConfig;
pub use error::{CasabaError, Result};
pub use geometry::{Dimensions, Level, Orientation, Region, SourceGeometry};
pub use info::compliance::{ComplianceLevel, ProcessorFeature, Quality, ServiceFeature};
pub use info::ImageInfo;
pub use ops::{
    ColorReduce, Crop, Filter, Format, Operation, OperationList, Rotate, Scale, Sharpen, Transpose,
};
pub use processor::{
    MagickProcessor, NativeProcessor, OpenJpegProcessor, Processor, MAX_DIMENSION, MAX_PIXELS,
};
pub use reduction::ReductionFactor;
pub use source::Source;
