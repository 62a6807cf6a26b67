pub mod paths;
pub mod provision;
pub mod runtime;

pub use paths::InstallLayout;
pub use provision::{download_url, ProvisionError, ProvisionOptions, RuntimeProvisioner};
pub use runtime::{
    java_exe, parse_major_from_version_output, required_runtime_major, DiscoveryError,
    HostRuntimeProbe, RuntimeDescriptor, RuntimeLocator, RuntimeOrigin, SystemRuntimeProbe,
    GLOBAL_RUNTIME_FLOOR,
};
