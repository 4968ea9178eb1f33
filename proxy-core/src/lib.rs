//! # Proxy Core Library
//!
//! `proxy-core` implements a delegate interception proxy: an object that sits
//! in a host component's single delegate slot, relays calls to the real
//! delegate supplied by the application, and lets independent observers react
//! to calls before and after they reach it.
//!
//! ## Features
//!
//! - **Explicit ownership**: the forward target is either owned or weakly
//!   referenced, chosen per assignment and encoded in [`ForwardTarget`]
//! - **Compile-time selector tables**: wired and void calls are lookups keyed
//!   by a protocol's selector enum
//! - **Ordered hooks**: `before → wired/forward → after`, always, even without a target
//! - **Isolated observers**: one observer's error or panic never stops the others
//!   nor the call itself
//! - **Re-entrancy**: observers and wired implementations may change the
//!   target mid-call; the change applies to the next call
//!
//! ## Quick Start
//!
//! ```rust
//! use std::rc::Rc;
//! use proxy_core::hooks::{CallContext, FnObserver};
//! use proxy_core::{DelegateProtocol, InterceptionProxy, Selector};
//!
//! trait Listener {
//!     fn on_event(&self, value: i64);
//! }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum ListenerSelector {
//!     OnEvent,
//! }
//!
//! impl Selector for ListenerSelector {
//!     const ALL: &'static [Self] = &[ListenerSelector::OnEvent];
//!     fn name(&self) -> &'static str { "onEvent:" }
//!     fn returns_void(&self) -> bool { true }
//! }
//!
//! struct ListenerProtocol;
//!
//! impl DelegateProtocol for ListenerProtocol {
//!     type Selector = ListenerSelector;
//!     type Delegate = dyn Listener;
//! }
//!
//! struct Printer;
//!
//! impl Listener for Printer {
//!     fn on_event(&self, value: i64) {
//!         println!("event {}", value);
//!     }
//! }
//!
//! let proxy = InterceptionProxy::<ListenerProtocol>::with_defaults();
//! proxy
//!     .sent_message(
//!         ListenerSelector::OnEvent,
//!         Rc::new(FnObserver::new("audit", |call: &CallContext<ListenerSelector>| {
//!             println!("about to deliver {:?}", call.arguments);
//!             Ok(())
//!         })),
//!     )
//!     .unwrap();
//!
//! let printer: Rc<dyn Listener> = Rc::new(Printer);
//! proxy.set_forward_target(Some(Rc::clone(&printer)), false);
//!
//! proxy
//!     .invocation(ListenerSelector::OnEvent, vec![serde_json::json!(42)])
//!     .notify(|listener| listener.on_event(42))
//!     .unwrap();
//! ```
//!
//! ## Architecture
//!
//! - [`selector`]: selector and delegate protocol traits
//! - [`target`]: owning / non-owning forward target state
//! - [`hooks`]: call contexts, observers and hook registries
//! - [`proxy`]: the [`InterceptionProxy`] itself
//! - [`dispatch`]: the dispatch driver routing calls through a proxy
//! - [`config`]: proxy configuration
//! - [`error`]: error types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod proxy;
pub mod selector;
pub mod target;

// Re-export commonly used types for convenience
pub use config::{ObserverFailurePolicy, ProxyConfig};
pub use dispatch::{Call, Invocation};
pub use error::{ConfigError, ObserverError, ObserverFailure, ProxyError, ProxyResult};
pub use hooks::{CallContext, CallObserver, FnObserver, HookKey, HookPhase, HookReport};
pub use proxy::{ForwardGuard, InterceptionProxy, ProxyId, ProxyStats};
pub use selector::{DelegateProtocol, Selector};
pub use target::ForwardTarget;

/// Current version of the proxy-core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
