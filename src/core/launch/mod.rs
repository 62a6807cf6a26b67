pub mod capability;
pub mod plan;
pub mod supervisor;

pub use capability::{LaunchCapability, LaunchHandle, RawEventSender, RawLaunchEvent, SidecarLauncher};
pub use plan::{
    plan, LaunchConfiguration, LaunchDefaults, LaunchOverrides, LaunchRequest, MemoryBounds,
    Variant, VersionSelection, WindowSize,
};
pub use supervisor::{ProcessSupervisor, SupervisorState};
