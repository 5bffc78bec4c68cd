//! Feature services exposing the demo [`World`] over HTTP.
//!
//! | Method | Path                   | Description                          |
//! |--------|------------------------|--------------------------------------|
//! | GET    | `/api/player/position` | Player position                      |
//! | POST   | `/api/player/move`     | Set movement direction `{x, y}`      |
//! | POST   | `/api/player/restart`  | Respawn player, reset task           |
//! | GET    | `/api/game/task`       | Current task and completion          |
//! | POST   | `/api/game/exit`       | Ask the host loop to exit            |

use anyhow::anyhow;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::world::{Vec2, World};
use crate::core::{Dispatcher, HostContext, downcast_host};
use crate::server::envelope::{self, StandardError};
use crate::server::{ApiService, EndpointRegistry, handler, json_body};

/// Run `f` against the concrete world inside the execution context.
fn on_world<F>(dispatcher: &Dispatcher, timeout: Duration, f: F) -> String
where
    F: FnOnce(&mut World) -> String + Send + 'static,
{
    dispatcher.call_and_wait(
        move |host: &mut dyn HostContext| {
            let world = downcast_host::<World>(host).ok_or_else(|| anyhow!("host is not a demo World"))?;
            Ok(f(world))
        },
        timeout,
    )
}

#[derive(Debug, Deserialize)]
struct MoveRequest {
    x: Option<f32>,
    y: Option<f32>,
}

impl MoveRequest {
    fn direction(&self) -> Result<Vec2, String> {
        let (Some(x), Some(y)) = (self.x, self.y) else {
            return Err(envelope::standard_error(
                StandardError::MissingParameter,
                Some("Both 'x' and 'y' are required"),
            ));
        };
        if !x.is_finite() || !y.is_finite() {
            return Err(envelope::standard_error(
                StandardError::InvalidRequest,
                Some("Direction must be finite"),
            ));
        }
        Ok(Vec2::new(x, y))
    }
}

/// Player movement and position
pub struct PlayerService {
    dispatcher: Dispatcher,
    timeout: Duration,
}

impl PlayerService {
    pub fn new(dispatcher: Dispatcher, timeout: Duration) -> Self {
        Self { dispatcher, timeout }
    }
}

impl ApiService for PlayerService {
    fn name(&self) -> &str {
        "PlayerService"
    }

    fn register_endpoints(&self, registry: &mut dyn EndpointRegistry) {
        let (dispatcher, timeout) = (self.dispatcher.clone(), self.timeout);
        registry.register_get(
            "/api/player/position",
            handler(move |_req| {
                Ok(on_world(&dispatcher, timeout, |world| match world.player_position() {
                    Some(pos) => envelope::success(&json!({ "position": pos })),
                    None => envelope::standard_error(StandardError::PlayerNotFound, None),
                }))
            }),
        );

        let (dispatcher, timeout) = (self.dispatcher.clone(), self.timeout);
        registry.register_post(
            "/api/player/move",
            handler(move |req| {
                let input: MoveRequest = match json_body(req) {
                    Ok(input) => input,
                    Err(body) => return Ok(body),
                };
                let direction = match input.direction() {
                    Ok(direction) => direction,
                    Err(body) => return Ok(body),
                };
                Ok(on_world(&dispatcher, timeout, move |world| {
                    if world.set_move_input(direction) {
                        envelope::success(&json!({ "input": direction.clamp_length() }))
                    } else {
                        envelope::standard_error(StandardError::PlayerNotFound, None)
                    }
                }))
            }),
        );

        let (dispatcher, timeout) = (self.dispatcher.clone(), self.timeout);
        registry.register_post(
            "/api/player/restart",
            handler(move |_req| {
                Ok(on_world(&dispatcher, timeout, |world| {
                    world.restart();
                    envelope::success(&json!({ "restarted": true, "position": world.player_position() }))
                }))
            }),
        );
    }
}

/// Task progress and host exit
pub struct GameService {
    dispatcher: Dispatcher,
    timeout: Duration,
}

impl GameService {
    pub fn new(dispatcher: Dispatcher, timeout: Duration) -> Self {
        Self { dispatcher, timeout }
    }
}

impl ApiService for GameService {
    fn name(&self) -> &str {
        "GameService"
    }

    fn register_endpoints(&self, registry: &mut dyn EndpointRegistry) {
        let (dispatcher, timeout) = (self.dispatcher.clone(), self.timeout);
        registry.register_get(
            "/api/game/task",
            handler(move |_req| Ok(on_world(&dispatcher, timeout, |world| envelope::success(&world.task())))),
        );

        let (dispatcher, timeout) = (self.dispatcher.clone(), self.timeout);
        registry.register_post(
            "/api/game/exit",
            handler(move |_req| {
                Ok(on_world(&dispatcher, timeout, |world| {
                    world.request_exit();
                    envelope::success(&json!({ "exiting": true }))
                }))
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MainContext;
    use crate::server::{Envelope, RouteTable};
    use rouille::Request;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    const TIMEOUT: Duration = Duration::from_secs(2);

    /// Host tick loop on its own thread; the world is shared back for assertions
    struct Host {
        world: Arc<Mutex<World>>,
        stop: Arc<AtomicBool>,
        thread: Option<thread::JoinHandle<()>>,
    }

    impl Host {
        fn spawn(mut ctx: MainContext) -> Self {
            let world = Arc::new(Mutex::new(World::new("Level1")));
            let stop = Arc::new(AtomicBool::new(false));
            let (w, s) = (Arc::clone(&world), Arc::clone(&stop));
            let thread = thread::spawn(move || {
                while !s.load(Ordering::SeqCst) {
                    ctx.drain(&mut *w.lock().unwrap());
                    thread::sleep(Duration::from_millis(1));
                }
            });
            Self { world, stop, thread: Some(thread) }
        }
    }

    impl Drop for Host {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::SeqCst);
            if let Some(t) = self.thread.take() {
                let _ = t.join();
            }
        }
    }

    fn setup() -> (RouteTable, Host) {
        let dispatcher = Dispatcher::new();
        let host = Host::spawn(dispatcher.main_context().unwrap());
        let mut routes = RouteTable::new();
        PlayerService::new(dispatcher.clone(), TIMEOUT).register_endpoints(&mut routes);
        GameService::new(dispatcher, TIMEOUT).register_endpoints(&mut routes);
        (routes, host)
    }

    fn call(routes: &RouteTable, method: &str, path: &str, body: &str) -> Envelope {
        let req = Request::fake_http(method, path, vec![], body.as_bytes().to_vec());
        let handler = routes.lookup(method, path).expect("route registered");
        Envelope::parse(&handler(&req).unwrap()).unwrap()
    }

    #[test]
    fn test_routes_registered() {
        let (routes, _host) = setup();
        assert_eq!(routes.len(), 5);
    }

    #[test]
    fn test_position_and_move() {
        let (routes, host) = setup();

        let env = call(&routes, "GET", "/api/player/position", "");
        assert!(env.success);
        assert_eq!(env.data.unwrap()["position"], json!({ "x": 0.0, "y": 0.0 }));

        let env = call(&routes, "POST", "/api/player/move", r#"{"x": 2.0, "y": 0.0}"#);
        assert!(env.success);
        assert_eq!(env.data.unwrap()["input"], json!({ "x": 1.0, "y": 0.0 }));
        let input = host.world.lock().unwrap().player().unwrap().input;
        assert_eq!(input, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_move_validation() {
        let (routes, _host) = setup();

        let env = call(&routes, "POST", "/api/player/move", "");
        assert_eq!(env.error_code(), Some("INVALID_REQUEST"));

        let env = call(&routes, "POST", "/api/player/move", r#"{"x": 1.0}"#);
        assert_eq!(env.error_code(), Some("MISSING_PARAMETER"));

        let env = call(&routes, "POST", "/api/player/move", r#""north""#);
        assert_eq!(env.error_code(), Some("INVALID_REQUEST"));
    }

    #[test]
    fn test_missing_player() {
        let (routes, host) = setup();
        host.world.lock().unwrap().despawn_player();

        let env = call(&routes, "GET", "/api/player/position", "");
        assert_eq!(env.error_code(), Some("PLAYER_NOT_FOUND"));
        let env = call(&routes, "POST", "/api/player/move", r#"{"x": 1.0, "y": 1.0}"#);
        assert_eq!(env.error_code(), Some("PLAYER_NOT_FOUND"));

        let env = call(&routes, "POST", "/api/player/restart", "");
        assert!(env.success);
        assert!(host.world.lock().unwrap().player_exists());
    }

    #[test]
    fn test_task_and_exit() {
        let (routes, host) = setup();

        let env = call(&routes, "GET", "/api/game/task", "");
        let data = env.data.unwrap();
        assert_eq!(data["isCompleted"], false);
        assert_eq!(data["targetPosition"], json!({ "x": 5.0, "y": 3.0 }));
        assert!(data["taskDescription"].as_str().unwrap().contains("5.0"));

        assert!(!host.world.lock().unwrap().exit_requested());
        assert!(call(&routes, "POST", "/api/game/exit", "").success);
        assert!(host.world.lock().unwrap().exit_requested());
    }
}
