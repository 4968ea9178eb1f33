//! A simulated scroll view host and its typed delegate proxy.
//!
//! The scroll view has a single, non-owning delegate slot. Installing the
//! proxy moves whatever delegate was set into the proxy as a non-owning
//! forward target and puts the proxy in the slot instead, so the application
//! delegate keeps receiving calls while observers watch them.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use proxy_core::{DelegateProtocol, InterceptionProxy, ProxyConfig, ProxyResult, Selector};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

/// Content offset of a scroll view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Calls a scroll view makes on its delegate. Every call is optional.
pub trait ScrollViewDelegate {
    fn did_scroll(&self, _offset: Point) {}

    fn did_zoom(&self, _scale: f64) {}

    fn did_end_dragging(&self, _will_decelerate: bool) {}

    fn should_scroll_to_top(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollViewSelector {
    DidScroll,
    DidZoom,
    DidEndDragging,
    ShouldScrollToTop,
}

impl Selector for ScrollViewSelector {
    const ALL: &'static [Self] = &[
        ScrollViewSelector::DidScroll,
        ScrollViewSelector::DidZoom,
        ScrollViewSelector::DidEndDragging,
        ScrollViewSelector::ShouldScrollToTop,
    ];

    fn name(&self) -> &'static str {
        match self {
            ScrollViewSelector::DidScroll => "scrollViewDidScroll:",
            ScrollViewSelector::DidZoom => "scrollViewDidZoom:",
            ScrollViewSelector::DidEndDragging => "scrollViewDidEndDragging:willDecelerate:",
            ScrollViewSelector::ShouldScrollToTop => "scrollViewShouldScrollToTop:",
        }
    }

    fn returns_void(&self) -> bool {
        !matches!(self, ScrollViewSelector::ShouldScrollToTop)
    }
}

pub struct ScrollViewProtocol;

impl DelegateProtocol for ScrollViewProtocol {
    type Selector = ScrollViewSelector;
    type Delegate = dyn ScrollViewDelegate;

    fn wired_selectors() -> &'static [ScrollViewSelector] {
        &[ScrollViewSelector::DidScroll]
    }
}

/// Delegate proxy occupying a scroll view's delegate slot.
///
/// `did_scroll` is wired: the proxy tracks the content offset itself before
/// forwarding.
pub struct ScrollViewDelegateProxy {
    inner: Rc<InterceptionProxy<ScrollViewProtocol>>,
    content_offset: Cell<Point>,
    offset_changes: Cell<u64>,
}

impl ScrollViewDelegateProxy {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            inner: Rc::new(InterceptionProxy::new(config)),
            content_offset: Cell::new(Point::default()),
            offset_changes: Cell::new(0),
        }
    }

    /// The interception proxy, for registering observers and forward targets.
    pub fn interception(&self) -> &Rc<InterceptionProxy<ScrollViewProtocol>> {
        &self.inner
    }

    /// Last content offset seen by the wired `did_scroll`.
    pub fn content_offset(&self) -> Point {
        self.content_offset.get()
    }

    pub fn offset_changes(&self) -> u64 {
        self.offset_changes.get()
    }

    fn finish<R>(&self, selector: ScrollViewSelector, result: ProxyResult<R>, default: R) -> R {
        result.unwrap_or_else(|error| {
            warn!(
                selector = selector.name(),
                category = error.category(),
                "Delegate call completed with errors: {}",
                error
            );
            default
        })
    }
}

impl ScrollViewDelegate for ScrollViewDelegateProxy {
    fn did_scroll(&self, offset: Point) {
        let selector = ScrollViewSelector::DidScroll;
        let result = self
            .inner
            .invocation(selector, vec![json!(offset)])
            .wired(|call| {
                if self.content_offset.get() != offset {
                    self.offset_changes.set(self.offset_changes.get() + 1);
                }
                self.content_offset.set(offset);
                call.forward(|delegate| delegate.did_scroll(offset));
            })
            .notify(|delegate| delegate.did_scroll(offset));
        self.finish(selector, result, ())
    }

    fn did_zoom(&self, scale: f64) {
        let selector = ScrollViewSelector::DidZoom;
        let result = self
            .inner
            .invocation(selector, vec![json!(scale)])
            .notify(|delegate| delegate.did_zoom(scale));
        self.finish(selector, result, ())
    }

    fn did_end_dragging(&self, will_decelerate: bool) {
        let selector = ScrollViewSelector::DidEndDragging;
        let result = self
            .inner
            .invocation(selector, vec![json!(will_decelerate)])
            .notify(|delegate| delegate.did_end_dragging(will_decelerate));
        self.finish(selector, result, ())
    }

    fn should_scroll_to_top(&self) -> bool {
        let selector = ScrollViewSelector::ShouldScrollToTop;
        let result = self
            .inner
            .invocation(selector, Vec::new())
            .dispatch(|delegate| delegate.should_scroll_to_top(), || true);
        self.finish(selector, result, true)
    }
}

/// Host component with a single delegate slot.
pub struct ScrollView {
    delegate: RefCell<Option<Weak<dyn ScrollViewDelegate>>>,
    proxy: RefCell<Option<Rc<ScrollViewDelegateProxy>>>,
    content_offset: Cell<Point>,
    zoom_scale: Cell<f64>,
}

impl ScrollView {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            delegate: RefCell::new(None),
            proxy: RefCell::new(None),
            content_offset: Cell::new(Point::default()),
            zoom_scale: Cell::new(1.0),
        })
    }

    /// Set the delegate slot. The scroll view does not own its delegate.
    pub fn set_delegate(&self, delegate: Option<&Rc<dyn ScrollViewDelegate>>) {
        *self.delegate.borrow_mut() = delegate.map(Rc::downgrade);
    }

    pub fn delegate(&self) -> Option<Rc<dyn ScrollViewDelegate>> {
        self.delegate.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Install (or return the already installed) delegate proxy.
    ///
    /// The current delegate, if it is not the proxy itself, becomes the
    /// proxy's non-owning forward target.
    pub fn delegate_proxy(&self, config: ProxyConfig) -> Rc<ScrollViewDelegateProxy> {
        let existing = self.proxy.borrow().clone();
        let proxy = match existing {
            Some(proxy) => proxy,
            None => {
                let proxy = Rc::new(ScrollViewDelegateProxy::new(config));
                *self.proxy.borrow_mut() = Some(Rc::clone(&proxy));
                proxy
            }
        };

        let as_delegate: Rc<dyn ScrollViewDelegate> = proxy.clone();
        let current = self.delegate();
        let already_installed = current
            .as_ref()
            .map(|delegate| Rc::ptr_eq(delegate, &as_delegate))
            .unwrap_or(false);

        if !already_installed {
            debug!(has_delegate = current.is_some(), "Installing scroll view delegate proxy");
            proxy.interception().set_forward_target(current, false);
            self.set_delegate(Some(&as_delegate));
        }
        proxy
    }

    pub fn content_offset(&self) -> Point {
        self.content_offset.get()
    }

    pub fn zoom_scale(&self) -> f64 {
        self.zoom_scale.get()
    }

    pub fn scroll_to(&self, offset: Point) {
        self.content_offset.set(offset);
        if let Some(delegate) = self.delegate() {
            delegate.did_scroll(offset);
        }
    }

    pub fn zoom(&self, scale: f64) {
        self.zoom_scale.set(scale);
        if let Some(delegate) = self.delegate() {
            delegate.did_zoom(scale);
        }
    }

    pub fn end_dragging(&self, will_decelerate: bool) {
        if let Some(delegate) = self.delegate() {
            delegate.did_end_dragging(will_decelerate);
        }
    }

    /// Status bar tap: scrolls to the top unless the delegate objects.
    pub fn tap_status_bar(&self) -> bool {
        let allowed = self
            .delegate()
            .map(|delegate| delegate.should_scroll_to_top())
            .unwrap_or(true);
        if allowed {
            self.scroll_to(Point::default());
        }
        allowed
    }
}
