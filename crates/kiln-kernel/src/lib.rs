//! Host-owned runtime surfaces the Kiln reload engine collaborates with.
//!
//! The kernel provides:
//! - the process-wide plugin registry (identifier → [`PluginInfo`])
//! - the scene graph: container nodes, component attachment, deferred
//!   destroy, persistence across scene transitions
//! - the frame scheduler with its one-step deferred task queue
//! - frame-polled key input with edge-triggered press queries
//! - the host configuration surface
//!
//! Everything runs on the host's main update tick; there is no async
//! runtime. Shared handles ([`PluginRegistry`]) are explicit values passed
//! to their users, never implicit statics.

pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod registry;
pub mod scene;
pub mod scheduler;

pub use config::{HostConfig, ReloadSettings};
pub use error::{KernelError, KernelResult};
pub use input::{InputState, Key};
pub use registry::{PluginInfo, PluginRegistry};
pub use scene::{Node, NodeId, Scene, SceneError};
pub use scheduler::{FrameScheduler, TaskHandle};

/// Everything the engine touches during one host frame, bundled so update
/// code takes a single explicit handle.
pub struct FrameContext<'a> {
    pub scene: &'a mut Scene,
    pub scheduler: &'a mut FrameScheduler,
    pub input: &'a InputState,
}
