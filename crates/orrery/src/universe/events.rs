//! # Events — Synchronous Multicast Notifications
//!
//! The universe fires an event after every structural change so other
//! systems (renderer mirrors, physics, editor selection) can follow along.
//!
//! | Delegate               | Payload          | Fired by                                  |
//! |------------------------|------------------|-------------------------------------------|
//! | `entity_created`       | [`Entity`]       | `create_entity`, `emplace_entity`         |
//! | `entity_destroyed`     | [`Entity`]       | `destroy_entity`                          |
//! | `entity_transformed`   | [`Entity`]       | every transform setter, once per moved entity |
//! | `component_added`      | [`ComponentUid`] | `on_component_created`                    |
//! | `component_destroyed`  | [`ComponentUid`] | `on_component_destroyed`                  |
//!
//! ## Re-entrancy
//!
//! Listeners receive `&mut Universe` and may call straight back into it,
//! including destroying entities. The universe finishes all index
//! bookkeeping before firing, and the listener list is snapshotted before
//! invocation, so a listener that subscribes or unsubscribes mid-dispatch
//! affects only the next dispatch.

use std::rc::Rc;

use super::component::ComponentUid;
use super::entity::Entity;
use super::Universe;

/// Identifies one subscription so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<A> = Rc<dyn Fn(&mut Universe, A)>;

/// A list of callbacks invoked in subscription order.
pub struct Delegate<A> {
    listeners: Vec<(ListenerId, Listener<A>)>,
    next_id: u64,
}

impl<A: Copy + 'static> Delegate<A> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    pub fn subscribe(&mut self, listener: impl Fn(&mut Universe, A) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Rc::new(listener)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(l, _)| *l != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    fn snapshot(&self) -> Vec<Listener<A>> {
        self.listeners.iter().map(|(_, l)| Rc::clone(l)).collect()
    }
}

impl<A: Copy + 'static> Default for Delegate<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// All delegates a universe fires.
#[derive(Default)]
pub struct UniverseEvents {
    pub entity_created: Delegate<Entity>,
    pub entity_destroyed: Delegate<Entity>,
    pub entity_transformed: Delegate<Entity>,
    pub component_added: Delegate<ComponentUid>,
    pub component_destroyed: Delegate<ComponentUid>,
}

impl Universe {
    fn emit<A: Copy + 'static>(&mut self, listeners: Vec<Listener<A>>, arg: A) {
        for listener in listeners {
            listener(self, arg);
        }
    }

    pub(crate) fn fire_entity_created(&mut self, entity: Entity) {
        let listeners = self.events.entity_created.snapshot();
        self.emit(listeners, entity);
    }

    pub(crate) fn fire_entity_destroyed(&mut self, entity: Entity) {
        let listeners = self.events.entity_destroyed.snapshot();
        self.emit(listeners, entity);
    }

    pub(crate) fn fire_entity_transformed(&mut self, entity: Entity) {
        let listeners = self.events.entity_transformed.snapshot();
        self.emit(listeners, entity);
    }

    pub(crate) fn fire_component_added(&mut self, cmp: ComponentUid) {
        let listeners = self.events.component_added.snapshot();
        self.emit(listeners, cmp);
    }

    pub(crate) fn fire_component_destroyed(&mut self, cmp: ComponentUid) {
        let listeners = self.events.component_destroyed.snapshot();
        self.emit(listeners, cmp);
    }
}
