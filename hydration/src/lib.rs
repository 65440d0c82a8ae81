// Grants profile hydration library

pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod etcd;
pub mod external;
pub mod metrics;
pub mod plugin;
pub mod plugins;
pub mod util;

pub use crate::core::{HydrationOrchestrator, ProfileRequest};
pub use crate::error::HydrationError;
