//! Host application collaborators.
//!
//! The host owns its live state on its own tick thread. Work queued through
//! the dispatcher receives `&mut dyn HostContext` when it runs there, which is
//! the only way server code reaches host state.

use std::any::Any;

/// Queries the server core makes against the host.
///
/// Called only from inside a main-context drain.
pub trait HostContext: Any {
    /// Name of the active scene
    fn scene_name(&self) -> String;

    /// Whether the simulation is currently advancing
    fn is_playing(&self) -> bool;

    /// Seconds of simulation time since the host started
    fn elapsed_secs(&self) -> f32;

    /// Whether a primary controllable subject exists
    fn player_exists(&self) -> bool;

    /// Identifier of the loaded level, if the host has such a notion
    fn current_level(&self) -> Option<String> {
        None
    }

    /// Concrete host access for feature services (see [`downcast_host`])
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Reach the concrete host type from inside a main-context job.
///
/// # Example
/// ```ignore
/// dispatcher.call_and_wait(|host| {
///     let world = downcast_host::<World>(host).ok_or_else(|| anyhow!("unexpected host"))?;
///     Ok(envelope::success(&world.player_position()))
/// }, timeout);
/// ```
#[inline]
pub fn downcast_host<T: HostContext>(host: &mut dyn HostContext) -> Option<&mut T> {
    host.as_any_mut().downcast_mut::<T>()
}
