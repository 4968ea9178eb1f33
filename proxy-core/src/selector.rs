//! Selectors and delegate protocols.
//!
//! A selector names one call of a delegate protocol. Selector sets are closed
//! enums fixed at compile time, so "is this call wired" and "does this call
//! return a value" are table lookups rather than runtime introspection.

use std::fmt;
use std::hash::Hash;

/// Opaque, stable identifier for one delegate call.
///
/// Implemented by a protocol's selector enum:
///
/// ```rust
/// use proxy_core::Selector;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum ButtonSelector {
///     Tapped,
///     ShouldHighlight,
/// }
///
/// impl Selector for ButtonSelector {
///     const ALL: &'static [Self] = &[ButtonSelector::Tapped, ButtonSelector::ShouldHighlight];
///
///     fn name(&self) -> &'static str {
///         match self {
///             ButtonSelector::Tapped => "tapped",
///             ButtonSelector::ShouldHighlight => "shouldHighlight",
///         }
///     }
///
///     fn returns_void(&self) -> bool {
///         matches!(self, ButtonSelector::Tapped)
///     }
/// }
///
/// assert_eq!(ButtonSelector::from_name("tapped"), Some(ButtonSelector::Tapped));
/// assert_eq!(ButtonSelector::from_name("pressed"), None);
/// ```
pub trait Selector: Copy + Eq + Hash + fmt::Debug + 'static {
    /// Every selector of the protocol.
    const ALL: &'static [Self];

    /// Stable name of the call (name + signature in the host's vocabulary).
    fn name(&self) -> &'static str;

    /// Whether the call's result carries no value that must be threaded back
    /// to the caller.
    fn returns_void(&self) -> bool;

    /// Resolve a selector from its name; unknown names resolve to `None`.
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|selector| selector.name() == name)
    }
}

/// The capability set a forward target must satisfy, together with the calls
/// the proxy implements natively.
///
/// `Delegate` is normally a trait object type such as `dyn ScrollViewDelegate`.
/// Conformance of a target is checked by the type system at the point where it
/// is supplied; the proxy performs no capability checks of its own.
pub trait DelegateProtocol: 'static {
    /// Selector space of the protocol.
    type Selector: Selector;

    /// The delegate capability set.
    type Delegate: ?Sized + 'static;

    /// Selectors for which the proxy supplies its own implementation.
    fn wired_selectors() -> &'static [Self::Selector] {
        &[]
    }

    /// Whether `delegate` actually answers `selector`.
    ///
    /// Delegate traits usually give optional calls default bodies, so the
    /// default answer is `true`. Override when the delegate can report that
    /// it leaves a call unimplemented.
    fn target_responds(delegate: &Self::Delegate, selector: Self::Selector) -> bool {
        let _ = (delegate, selector);
        true
    }
}
