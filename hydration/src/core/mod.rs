pub mod contracts;
pub mod orchestrator;

pub use contracts::{
    FeatureDescriptor, PluginFeatures, PluginFeaturesListing, PluginSummary, ProfileRequest,
};
pub use orchestrator::HydrationOrchestrator;
