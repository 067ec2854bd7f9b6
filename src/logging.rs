//! Tracing setup with a runtime-adjustable filter

use anyhow::Context;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

use crate::error::{Error, Result};

type FilterLayer = reload::Layer<EnvFilter, Registry>;

/// Changes the active log filter of the running process
#[derive(Clone)]
pub struct LogLevelHandle {
    inner: reload::Handle<EnvFilter, Registry>,
}

impl LogLevelHandle {
    /// A reloadable filter layer and the handle driving it
    pub fn layer(directive: &str) -> Result<(FilterLayer, Self)> {
        let (layer, inner) = reload::Layer::new(parse_filter(directive)?);
        Ok((layer, Self { inner }))
    }

    /// Replace the filter, e.g. `info` or `mining_companion=trace,reqwest=warn`
    pub fn set(&self, directive: &str) -> Result<()> {
        let filter = parse_filter(directive)?;
        self.inner
            .reload(filter)
            .map_err(|e| Error::Internal(format!("failed to reload log filter: {}", e)))
    }

    pub fn current(&self) -> Option<String> {
        self.inner.with_current(|filter| filter.to_string()).ok()
    }
}

fn parse_filter(directive: &str) -> Result<EnvFilter> {
    let directive = directive.trim();
    if directive.is_empty() {
        return Err(Error::Config("log level is empty".to_string()));
    }
    EnvFilter::try_new(directive)
        .map_err(|e| Error::Config(format!("invalid log level '{}': {}", directive, e)))
}

/// Install the global subscriber. `RUST_LOG` wins over `default_directive`.
pub fn init(default_directive: &str, json: bool) -> anyhow::Result<LogLevelHandle> {
    let directive = std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default_directive.to_string());
    let (filter, handle) = LogLevelHandle::layer(&directive)?;

    let text = (!json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });
    let structured = json.then(|| fmt::layer().json().with_current_span(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(structured)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(handle)
}

/// True when the operator pinned the filter through `RUST_LOG`
pub fn env_override() -> bool {
    std::env::var("RUST_LOG")
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false)
}
