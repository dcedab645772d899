//! Scene graph.
//!
//! Nodes are host-owned container objects; plugin instances attach to a
//! node as child components. Two behaviors matter to the reload engine:
//!
//! - destroys are deferred: [`Scene::destroy_deferred`] marks a node and
//!   the removal happens at the end of the current frame
//! - persistent nodes survive [`Scene::transition`], the host's scene-load
//!   boundary that clears everything else

use std::collections::HashMap;
use std::fmt;

use kiln_plugin_api::{ComponentError, PluginComponent};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Handle to a live scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scene-graph errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SceneError {
    /// The referenced node does not exist (or was already destroyed).
    #[error("node {0} does not exist")]
    NodeMissing(NodeId),

    /// A component rejected its own attachment. The instance is dropped.
    #[error("component `{id}` failed to attach: {source}")]
    AttachFailed {
        id: String,
        #[source]
        source: ComponentError,
    },
}

struct ComponentSlot {
    instance_id: Uuid,
    identifier: String,
    component: Box<dyn PluginComponent>,
}

/// A container object in the scene graph.
pub struct Node {
    id: NodeId,
    name: String,
    persistent: bool,
    components: Vec<ComponentSlot>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this node survives scene transitions.
    pub fn persistent(&self) -> bool {
        self.persistent
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Identifiers of the attached components, in attachment order.
    pub fn component_identifiers(&self) -> Vec<String> {
        self.components
            .iter()
            .map(|slot| slot.identifier.clone())
            .collect()
    }
}

/// The live scene graph, owned by the host and mutated only on the main
/// update tick.
#[derive(Default)]
pub struct Scene {
    nodes: HashMap<u64, Node>,
    pending_destroy: Vec<NodeId>,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty node.
    pub fn spawn(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let name = name.into();
        debug!(node = %id, %name, "spawning node");
        self.nodes.insert(
            id.0,
            Node {
                id,
                name,
                persistent: false,
                components: Vec::new(),
            },
        );
        id
    }

    /// Creates an empty node that survives scene transitions.
    pub fn spawn_persistent(&mut self, name: impl Into<String>) -> NodeId {
        let id = self.spawn(name);
        if let Some(node) = self.nodes.get_mut(&id.0) {
            node.persistent = true;
        }
        id
    }

    /// Marks a node to survive scene transitions.
    pub fn set_persistent(&mut self, id: NodeId, persistent: bool) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(&id.0).ok_or(SceneError::NodeMissing(id))?;
        node.persistent = persistent;
        Ok(())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id.0)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attaches a live component instance to a node, running its
    /// `on_attach` hook. On failure the instance is dropped and the node is
    /// left unchanged.
    pub fn attach_component(
        &mut self,
        node: NodeId,
        identifier: &str,
        mut component: Box<dyn PluginComponent>,
    ) -> Result<Uuid, SceneError> {
        let target = self
            .nodes
            .get_mut(&node.0)
            .ok_or(SceneError::NodeMissing(node))?;

        component
            .on_attach()
            .map_err(|source| SceneError::AttachFailed {
                id: identifier.to_string(),
                source,
            })?;

        let instance_id = Uuid::now_v7();
        debug!(node = %node, %identifier, %instance_id, "component attached");
        target.components.push(ComponentSlot {
            instance_id,
            identifier: identifier.to_string(),
            component,
        });
        Ok(instance_id)
    }

    /// Marks a node for destruction at the end of the current frame.
    /// Marking a node that no longer exists is a no-op.
    pub fn destroy_deferred(&mut self, id: NodeId) {
        debug!(node = %id, "deferred destroy requested");
        self.pending_destroy.push(id);
    }

    /// Processes deferred destroys. Called once per frame by the scheduler.
    pub fn end_frame(&mut self) {
        for id in std::mem::take(&mut self.pending_destroy) {
            if let Some(mut node) = self.nodes.remove(&id.0) {
                debug!(node = %id, name = %node.name, "destroying node");
                for slot in &mut node.components {
                    slot.component.on_detach();
                }
            }
        }
    }

    /// Scene-load boundary: destroys every node not marked persistent.
    pub fn transition(&mut self) {
        let doomed: Vec<u64> = self
            .nodes
            .values()
            .filter(|node| !node.persistent)
            .map(|node| node.id.0)
            .collect();

        for key in doomed {
            if let Some(mut node) = self.nodes.remove(&key) {
                for slot in &mut node.components {
                    slot.component.on_detach();
                }
            }
        }
    }

    /// Drives the per-frame hook of every attached component.
    pub fn update(&mut self, frame: u64) {
        for node in self.nodes.values_mut() {
            for slot in &mut node.components {
                slot.component.on_update(frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        fail_attach: bool,
        detached: std::rc::Rc<std::cell::Cell<bool>>,
    }

    impl PluginComponent for Recorder {
        fn on_attach(&mut self) -> Result<(), ComponentError> {
            if self.fail_attach {
                Err(ComponentError::Init("boom".into()))
            } else {
                Ok(())
            }
        }

        fn on_detach(&mut self) {
            self.detached.set(true);
        }
    }

    #[test]
    fn attach_and_count_components() {
        let mut scene = Scene::new();
        let node = scene.spawn("container");

        scene
            .attach_component(node, "com.test.a", Box::new(Recorder::default()))
            .unwrap();

        assert_eq!(scene.node(node).unwrap().component_count(), 1);
        assert_eq!(
            scene.node(node).unwrap().component_identifiers(),
            vec!["com.test.a".to_string()]
        );
    }

    #[test]
    fn failed_attach_leaves_node_unchanged() {
        let mut scene = Scene::new();
        let node = scene.spawn("container");

        let failing = Box::new(Recorder {
            fail_attach: true,
            ..Recorder::default()
        });
        let err = scene
            .attach_component(node, "com.test.bad", failing)
            .unwrap_err();

        assert!(matches!(err, SceneError::AttachFailed { ref id, .. } if id == "com.test.bad"));
        assert_eq!(scene.node(node).unwrap().component_count(), 0);
    }

    #[test]
    fn destroy_is_deferred_to_end_of_frame() {
        let mut scene = Scene::new();
        let node = scene.spawn("container");
        let detached = std::rc::Rc::new(std::cell::Cell::new(false));

        scene
            .attach_component(
                node,
                "com.test.a",
                Box::new(Recorder {
                    detached: detached.clone(),
                    ..Recorder::default()
                }),
            )
            .unwrap();

        scene.destroy_deferred(node);
        assert!(scene.contains(node), "node lives until frame end");
        assert!(!detached.get());

        scene.end_frame();
        assert!(!scene.contains(node));
        assert!(detached.get(), "on_detach ran during destroy");
    }

    #[test]
    fn persistent_node_survives_transition() {
        let mut scene = Scene::new();
        let volatile = scene.spawn("level-geometry");
        let container = scene.spawn("scripts-container");
        scene.set_persistent(container, true).unwrap();

        scene.transition();

        assert!(!scene.contains(volatile));
        assert!(scene.contains(container));
    }

    #[test]
    fn destroying_missing_node_is_a_no_op() {
        let mut scene = Scene::new();
        let node = scene.spawn("container");
        scene.destroy_deferred(node);
        scene.end_frame();

        // second mark after removal must not panic
        scene.destroy_deferred(node);
        scene.end_frame();
        assert!(scene.is_empty());
    }
}
