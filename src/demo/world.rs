//! Minimal 2D world driven by the demo binary's tick loop.
//!
//! A player walks toward a target; the current task is complete once the
//! player is within [`TARGET_RADIUS`] of it.

use serde::{Deserialize, Serialize};
use std::any::Any;

use crate::core::HostContext;

/// Distance at which the target counts as reached
pub const TARGET_RADIUS: f32 = 0.5;

const PLAYER_SPEED: f32 = 3.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f32 {
        Vec2::new(self.x - other.x, self.y - other.y).length()
    }

    /// Scale down to unit length if longer
    pub fn clamp_length(self) -> Vec2 {
        let len = self.length();
        if len > 1.0 { Vec2::new(self.x / len, self.y / len) } else { self }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub position: Vec2,
    pub input: Vec2,
}

/// `/api/game/task` payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_description: String,
    pub target_position: Vec2,
    pub is_completed: bool,
}

#[derive(Debug)]
pub struct World {
    scene: String,
    level: String,
    elapsed: f32,
    playing: bool,
    spawn: Vec2,
    target: Vec2,
    completed: bool,
    player: Option<Player>,
    exit_requested: bool,
}

impl World {
    pub fn new(level: &str) -> Self {
        let spawn = Vec2::ZERO;
        Self {
            scene: "DemoScene".to_string(),
            level: level.to_string(),
            elapsed: 0.0,
            playing: true,
            spawn,
            target: Vec2::new(5.0, 3.0),
            completed: false,
            player: Some(Player {
                position: spawn,
                input: Vec2::ZERO,
            }),
            exit_requested: false,
        }
    }

    /// Advance by `dt` seconds
    pub fn tick(&mut self, dt: f32) {
        if !self.playing {
            return;
        }
        self.elapsed += dt;

        let Some(player) = self.player.as_mut() else {
            return;
        };
        player.position.x += player.input.x * PLAYER_SPEED * dt;
        player.position.y += player.input.y * PLAYER_SPEED * dt;

        if !self.completed && player.position.distance(self.target) <= TARGET_RADIUS {
            self.completed = true;
            player.input = Vec2::ZERO;
        }
    }

    /// Set the movement direction. False when there is no player.
    pub fn set_move_input(&mut self, direction: Vec2) -> bool {
        match self.player.as_mut() {
            Some(player) => {
                player.input = direction.clamp_length();
                true
            }
            None => false,
        }
    }

    /// Respawn the player and reset the task
    pub fn restart(&mut self) {
        self.player = Some(Player {
            position: self.spawn,
            input: Vec2::ZERO,
        });
        self.completed = false;
        self.playing = true;
    }

    pub fn despawn_player(&mut self) {
        self.player = None;
    }

    pub fn player(&self) -> Option<&Player> {
        self.player.as_ref()
    }

    pub fn player_position(&self) -> Option<Vec2> {
        self.player.as_ref().map(|p| p.position)
    }

    pub fn task(&self) -> TaskInfo {
        TaskInfo {
            task_description: format!(
                "Move the player to ({:.1}, {:.1})",
                self.target.x, self.target.y
            ),
            target_position: self.target,
            is_completed: self.completed,
        }
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }
}

impl HostContext for World {
    fn scene_name(&self) -> String {
        self.scene.clone()
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn elapsed_secs(&self) -> f32 {
        self.elapsed
    }

    fn player_exists(&self) -> bool {
        self.player.is_some()
    }

    fn current_level(&self) -> Option<String> {
        Some(self.level.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
