pub mod factory;
pub mod model;
pub mod registry;
pub mod trait_def;

pub use factory::PluginFactory;
pub use model::{PluginSupportedFeature, ProfileData, ProfilePopulationMetadata};
pub use registry::{PluginInfo, PluginRegistry};
pub use trait_def::ProfilePlugin;
