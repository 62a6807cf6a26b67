// ─── Mango Launcher Core ───
// Runtime acquisition and game process supervision.
//
// Architecture:
//   core/
//     java/    — Runtime floors, discovery, provisioning, install layout
//     launch/  — Launch planning, launch capability, process supervisor
//     events/  — Normalized front-end events + progress throttle
//     auth/    — Authorization passthrough and offline identities
//     state/   — Persisted launcher settings
//     http     — Shared HTTP client for runtime downloads

pub mod auth;
pub mod error;
pub mod events;
pub mod http;
pub mod java;
pub mod launch;
pub mod state;
