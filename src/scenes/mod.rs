mod command;
mod config;
mod controller;
mod router;
mod scene;

pub use self::command::{Command, EMPTY_PREFIX};
pub use self::config::{SceneConfig, resolve_config_path};
pub use self::controller::{ROTATE_DEAD_ZONE, Resolution, SceneController};
pub use self::router::{CommandRouter, ListenerId, RouteOutcome};
pub use self::scene::{NULL_SCENE_NAME, Scene, SceneTable};
