use std::any::{Any, TypeId};

/// A fact some step makes discoverable to the steps after it.
///
/// Steps advertise milestones from [`crate::Reactor::provide`]; consumers
/// look them up with [`crate::Graph::find_milestone`] without knowing which
/// concrete step provides them.
pub trait Milestone: Any + Send {}

/// A typed request for one milestone.
pub struct Demand {
    wanted: TypeId,
    found: Option<Box<dyn Any + Send>>,
}

impl Demand {
    pub fn new<M: Milestone>() -> Self {
        Self {
            wanted: TypeId::of::<M>(),
            found: None,
        }
    }

    pub fn wants<M: Milestone>(&self) -> bool {
        self.wanted == TypeId::of::<M>() && self.found.is_none()
    }

    /// Offers `M`. The value is only built when `M` is what was asked for,
    /// and the first offer sticks.
    pub fn provide<M: Milestone>(&mut self, make: impl FnOnce() -> M) -> &mut Self {
        if self.wants::<M>() {
            self.found = Some(Box::new(make()));
        }
        self
    }

    pub fn is_satisfied(&self) -> bool {
        self.found.is_some()
    }

    pub fn into_value<M: Milestone>(self) -> Option<M> {
        self.found
            .and_then(|boxed| boxed.downcast::<M>().ok())
            .map(|m| *m)
    }
}
