pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod system;

/// Opaque router identifier, unique within the network (e.g. `"r1"`).
pub type RouterId = String;

pub use config::{NetworkMap, RouterConfig};
pub use error::{ConfigError, RouterError};
pub use protocol::{ConvergenceEngine, DistanceVectorRouter};
pub use system::{DryRunKernel, IpRouteCommand, KernelRouteSync};
