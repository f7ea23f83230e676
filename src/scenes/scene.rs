use std::collections::HashMap;

/// Name of the scene built from the `default` section.
pub const NULL_SCENE_NAME: &str = "null";

/// A named map from event keys to raw command templates.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Scene {
    name: String,
    commands: HashMap<String, String>,
}

impl Scene {
    /// Creates a scene.
    #[must_use]
    pub fn new(name: impl Into<String>, commands: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            commands,
        }
    }

    pub(crate) fn null(commands: HashMap<String, String>) -> Self {
        Self::new(NULL_SCENE_NAME, commands)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the template bound to `key`, or `""` when unmapped.
    #[must_use]
    pub fn handle(&self, key: &str) -> &str {
        self.commands.get(key).map_or("", String::as_str)
    }
}

/// The null scene plus the ordered scenes swipes cycle through.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SceneTable {
    null_scene: Scene,
    scenes: Vec<Scene>,
}

impl SceneTable {
    pub(crate) fn new(null_scene: Scene, scenes: Vec<Scene>) -> Self {
        Self { null_scene, scenes }
    }

    #[must_use]
    pub fn null_scene(&self) -> &Scene {
        &self.null_scene
    }

    /// Returns the scene at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Scene> {
        self.scenes.get(index)
    }

    /// Number of configured scenes, excluding the null scene.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn handle_returns_empty_template_for_unmapped_keys() {
        let scene = Scene::new(
            "light",
            HashMap::from([("press".to_string(), "fhem:set lamp on".to_string())]),
        );
        assert_eq!("fhem:set lamp on", scene.handle("press"));
        assert_eq!("", scene.handle("release"));
    }
}
