use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proxy_core::{DelegateProtocol, ProxyConfig, Selector};
use proxy_observers::{LoggingObserver, RecordingObserver, StatsObserver};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod scroll_view;

use scroll_view::{Point, ScrollView, ScrollViewDelegate, ScrollViewProtocol, ScrollViewSelector};

#[derive(Parser)]
#[command(name = "delegate-proxy")]
#[command(about = "Drive a simulated scroll view through a delegate interception proxy")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a scripted scrolling session (default if no subcommand provided)
    Run {
        /// Number of scroll events to simulate
        #[arg(short, long, default_value_t = 5)]
        events: u32,

        /// Let the proxy own the application delegate
        #[arg(short, long)]
        retain: bool,

        /// Proxy configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Log call arguments from the logging observer
        #[arg(long)]
        log_arguments: bool,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print the scroll view selector table
    Selectors,
}

/// Application delegate counting what reaches it.
#[derive(Default)]
struct AppDelegate {
    scrolls: Cell<u64>,
    zooms: Cell<u64>,
    drags: Cell<u64>,
}

impl ScrollViewDelegate for AppDelegate {
    fn did_scroll(&self, offset: Point) {
        self.scrolls.set(self.scrolls.get() + 1);
        info!("Application delegate scrolled to ({}, {})", offset.x, offset.y);
    }

    fn did_zoom(&self, scale: f64) {
        self.zooms.set(self.zooms.get() + 1);
        info!("Application delegate zoomed to {}", scale);
    }

    fn did_end_dragging(&self, will_decelerate: bool) {
        self.drags.set(self.drags.get() + 1);
        info!("Application delegate finished dragging (decelerate: {})", will_decelerate);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            events,
            retain,
            config,
            log_arguments,
            verbose,
        }) => run_session(events, retain, config, log_arguments, verbose),
        Some(Commands::Selectors) => print_selectors(),
        None => run_session(5, false, None, false, false),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_session(
    events: u32,
    retain: bool,
    config: Option<PathBuf>,
    log_arguments: bool,
    verbose: bool,
) -> Result<()> {
    init_logging(verbose);

    let config = match config {
        Some(path) => ProxyConfig::from_file(&path)
            .with_context(|| format!("Failed to load proxy configuration from {}", path.display()))?,
        None => ProxyConfig::named("scroll-view"),
    };
    info!("Starting session with proxy '{}'", config.name);

    let view = ScrollView::new();
    let app = Rc::new(AppDelegate::default());
    let app_delegate: Rc<dyn ScrollViewDelegate> = app.clone();
    view.set_delegate(Some(&app_delegate));

    let proxy = view.delegate_proxy(config);
    let interception = proxy.interception();
    if retain {
        interception.set_forward_target(Some(Rc::clone(&app_delegate)), true);
    }

    let stats = Rc::new(StatsObserver::new("session-stats"));
    let logging = Rc::new(LoggingObserver::new(log_arguments));
    let drags = Rc::new(RecordingObserver::<ScrollViewSelector>::new("drags"));
    for &selector in ScrollViewSelector::ALL {
        if selector.returns_void() {
            interception.sent_message(selector, stats.clone())?;
        }
    }
    interception.method_invoked(ScrollViewSelector::DidScroll, logging.clone())?;
    interception.method_invoked(ScrollViewSelector::DidEndDragging, drags.clone())?;

    for step in 1..=events {
        view.scroll_to(Point::new(0.0, f64::from(step) * 40.0));
    }
    view.zoom(1.5);
    view.end_dragging(true);
    let scrolled_to_top = view.tap_status_bar();

    // Detach the application delegate; observers keep seeing calls.
    interception.set_forward_target(None, false);
    view.scroll_to(Point::new(0.0, 10.0));

    let report = json!({
        "proxy": interception.stats(),
        "observers": stats.stats(),
        "logged_scrolls": logging.total_logged(),
        "recorded_drags": drags.len(),
        "application": {
            "scrolls": app.scrolls.get(),
            "zooms": app.zooms.get(),
            "drags": app.drags.get(),
        },
        "content_offset": proxy.content_offset(),
        "offset_changes": proxy.offset_changes(),
        "zoom_scale": view.zoom_scale(),
        "scrolled_to_top": scrolled_to_top,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_selectors() -> Result<()> {
    let wired = <ScrollViewProtocol as DelegateProtocol>::wired_selectors();
    let table: Vec<_> = ScrollViewSelector::ALL
        .iter()
        .map(|selector| {
            json!({
                "selector": selector.name(),
                "void": selector.returns_void(),
                "wired": wired.contains(selector),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}
