pub mod config;
pub mod error;
pub mod filter;
pub mod manifest;
pub mod registry;
pub mod storage;
pub mod sync;
pub mod uplink;
pub mod versions;

pub use config::{Config, Interval, UplinkConfig};
pub use error::{RegistryError, Result, UplinkError};
pub use manifest::{Manifest, VersionRecord};
pub use registry::{GetPackageOptions, PackageResponse, Registry};
pub use storage::{FsStore, LocalStore};
pub use sync::{Merged, SyncOptions, SyncOutcome, UplinkOutcome};
pub use uplink::UplinkSet;
