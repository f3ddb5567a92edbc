//! Structured logging setup shared by the engine binary and its tests.
//!
//! Development gets compact, colorized output; release builds emit flat
//! JSON lines suitable for an external log shipper. A global panic hook
//! routes panics through `tracing` so they land in the same sink instead
//! of bypassing it on stderr.

use std::panic;

use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global `tracing` subscriber and panic hook for `service_name`.
///
/// # Panics
/// Panics if a global subscriber has already been installed.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let default_level = if cfg!(debug_assertions) { "debug" } else { "info" };
        format!("{service_name}={default_level},tower_http=warn,hyper=warn").into()
    });

    if cfg!(debug_assertions) {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().flatten_event(true))
            .init();
    }

    install_panic_hook(service_name);
    info!(service = service_name, "tracing initialized");
}

fn install_panic_hook(service_name: &str) {
    let service_name = service_name.to_string();
    panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("no panic message");

        error!(target: "panic", service = %service_name, location = %location, "{message}");
    }));
}
