//! Forward target ownership.
//!
//! The proxy either owns its forward target or merely points at it. The mode
//! is part of the state itself: dropping an `Owning` target releases the one
//! strong reference the proxy held, dropping a `NonOwning` target never
//! touches the delegate's lifetime.

use std::fmt;
use std::rc::{Rc, Weak};

/// Current forward target of a proxy.
pub enum ForwardTarget<D: ?Sized> {
    /// No delegate attached.
    Empty,
    /// The delegate is owned elsewhere; it may disappear at any time.
    NonOwning(Weak<D>),
    /// The proxy holds a strong reference for as long as the target stays assigned.
    Owning(Rc<D>),
}

impl<D: ?Sized> ForwardTarget<D> {
    /// Build the target state for an assignment.
    pub fn new(target: Option<Rc<D>>, retain: bool) -> Self {
        match target {
            None => ForwardTarget::Empty,
            Some(target) if retain => ForwardTarget::Owning(target),
            Some(target) => ForwardTarget::NonOwning(Rc::downgrade(&target)),
        }
    }

    /// Live delegate, if any. A non-owning target whose delegate has been
    /// deallocated reads as `None`.
    pub fn get(&self) -> Option<Rc<D>> {
        match self {
            ForwardTarget::Empty => None,
            ForwardTarget::NonOwning(weak) => weak.upgrade(),
            ForwardTarget::Owning(strong) => Some(Rc::clone(strong)),
        }
    }

    /// Whether the proxy currently owns its target.
    pub fn is_owning(&self) -> bool {
        matches!(self, ForwardTarget::Owning(_))
    }

    /// Whether a live delegate is attached.
    pub fn is_live(&self) -> bool {
        match self {
            ForwardTarget::Empty => false,
            ForwardTarget::NonOwning(weak) => weak.strong_count() > 0,
            ForwardTarget::Owning(_) => true,
        }
    }

    /// Whether this state refers to exactly `delegate` (pointer identity).
    pub fn points_to(&self, delegate: &Rc<D>) -> bool {
        match self {
            ForwardTarget::Empty => false,
            ForwardTarget::NonOwning(weak) => {
                std::ptr::addr_eq(weak.as_ptr(), Rc::as_ptr(delegate))
            }
            ForwardTarget::Owning(strong) => Rc::ptr_eq(strong, delegate),
        }
    }

    fn mode(&self) -> &'static str {
        match self {
            ForwardTarget::Empty => "empty",
            ForwardTarget::NonOwning(_) => "non-owning",
            ForwardTarget::Owning(_) => "owning",
        }
    }
}

impl<D: ?Sized> fmt::Debug for ForwardTarget<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardTarget")
            .field("mode", &self.mode())
            .field("live", &self.is_live())
            .finish()
    }
}
