pub mod config;
pub mod data;
pub mod error;
pub mod feature;
pub mod features;
pub mod finalize;
pub mod history;
pub mod normalize;
pub mod panel;
pub mod pipeline;
pub mod rolling;
pub mod storage;
pub mod targets;

pub use config::{Config, OutputFormat, TargetSelection};
pub use error::{ConfigError, SchemaError};
pub use feature::{FeatureCatalog, FeatureCategory, FeatureDescriptor};
pub use features::FeatureEngine;
pub use normalize::{NormalizeReport, Observation, normalize, observations_to_frame};
pub use pipeline::{FeaturePipeline, PipelineReport, build_dataset};
pub use targets::TargetLabeler;
