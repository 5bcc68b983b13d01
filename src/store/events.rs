use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::model::Model;

/// Points in a model's lifecycle that listeners can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    PostLoad,
    PreCommit,
    PostCommit,
    PreCreate,
    PostCreate,
    PreUpdate,
    PostUpdate,
    PreDelete,
    PostDelete,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 9] = [
        LifecycleEvent::PostLoad,
        LifecycleEvent::PreCommit,
        LifecycleEvent::PostCommit,
        LifecycleEvent::PreCreate,
        LifecycleEvent::PostCreate,
        LifecycleEvent::PreUpdate,
        LifecycleEvent::PostUpdate,
        LifecycleEvent::PreDelete,
        LifecycleEvent::PostDelete,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::PostLoad => "postLoad",
            LifecycleEvent::PreCommit => "preCommit",
            LifecycleEvent::PostCommit => "postCommit",
            LifecycleEvent::PreCreate => "preCreate",
            LifecycleEvent::PostCreate => "postCreate",
            LifecycleEvent::PreUpdate => "preUpdate",
            LifecycleEvent::PostUpdate => "postUpdate",
            LifecycleEvent::PreDelete => "preDelete",
            LifecycleEvent::PostDelete => "postDelete",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

type Listener = Rc<dyn Fn(LifecycleEvent, &Model)>;

/// Synchronous listener registry, scoped to one store.
#[derive(Default)]
pub(crate) struct EventDispatcher {
    listeners: RefCell<Vec<(LifecycleEvent, Listener)>>,
}

impl EventDispatcher {
    pub(crate) fn on(&self, event: LifecycleEvent, listener: impl Fn(LifecycleEvent, &Model) + 'static) {
        self.listeners.borrow_mut().push((event, Rc::new(listener)));
    }

    /// Listeners run in registration order. They may call back into the store.
    pub(crate) fn dispatch(&self, event: LifecycleEvent, model: &Model) {
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(registered, _)| *registered == event)
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(event, model);
        }
    }
}

#[cfg(feature = "emitter")]
mod emitter {
    use std::cell::RefCell;
    use std::rc::Rc;

    use event_emitter_rs::EventEmitter;

    use super::{EventDispatcher, LifecycleEvent};

    impl EventDispatcher {
        /// Re-broadcast every lifecycle event through `emitter` as `"type:id"`.
        ///
        /// `EventEmitter` runs its listeners on background threads, so delivery is
        /// asynchronous.
        pub(crate) fn forward_to(&self, emitter: EventEmitter) {
            let emitter = Rc::new(RefCell::new(emitter));
            for event in LifecycleEvent::ALL {
                let emitter = Rc::clone(&emitter);
                self.on(event, move |event, model| {
                    emitter
                        .borrow_mut()
                        .emit(event.name(), model.key().to_string());
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(LifecycleEvent::PostLoad.to_string(), "postLoad");
        assert_eq!(LifecycleEvent::PreDelete.name(), "preDelete");
        assert_eq!(LifecycleEvent::ALL.len(), 9);
    }
}
