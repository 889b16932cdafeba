//! Map renderer capability.
//!
//! The tracking loop pushes every fix to a map. The map itself is an
//! external collaborator that may not be initialised yet or may fail; the
//! [`RetryCoordinator`](super::RetryCoordinator) shields the controller from
//! that. When no map exists at all, compose the controller with
//! [`NoOpRenderer`] instead of probing for one at call time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;

/// Failure reported by a map renderer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The map has not been initialised (or was torn down).
    #[error("Map renderer is not ready")]
    NotReady,

    /// The renderer raised an error.
    #[error("Map renderer failed: {0}")]
    Failed(String),
}

/// Visual map that displays the current position.
pub trait MapRenderer: Send + Sync {
    /// Move the marker to the given position with an accuracy circle.
    fn update(&self, latitude: f64, longitude: f64, accuracy_meters: f64)
        -> Result<(), RenderError>;

    /// Tear down and rebuild the map.
    fn reinitialize(&self) -> Result<(), RenderError>;

    /// Show a degraded, non-interactive location display.
    fn show_fallback(&self, latitude: f64, longitude: f64) -> Result<(), RenderError>;
}

/// Renderer used when there is no map at all. Every call succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRenderer;

impl MapRenderer for NoOpRenderer {
    fn update(
        &self,
        _latitude: f64,
        _longitude: f64,
        _accuracy_meters: f64,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    fn reinitialize(&self) -> Result<(), RenderError> {
        Ok(())
    }

    fn show_fallback(&self, _latitude: f64, _longitude: f64) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Renderer that writes marker movements to the log.
///
/// Used by the CLI as a stand-in for a map widget. It starts uninitialised
/// unless created with [`LogRenderer::ready`], which exercises the retry
/// path on the first fix.
#[derive(Debug, Default)]
pub struct LogRenderer {
    ready: AtomicBool,
    updates: AtomicU64,
}

impl LogRenderer {
    /// Create a renderer that must be reinitialised before first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a renderer that is ready immediately.
    pub fn ready() -> Self {
        let renderer = Self::default();
        renderer.ready.store(true, Ordering::SeqCst);
        renderer
    }

    /// Number of successful marker updates.
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

impl MapRenderer for LogRenderer {
    fn update(
        &self,
        latitude: f64,
        longitude: f64,
        accuracy_meters: f64,
    ) -> Result<(), RenderError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(RenderError::NotReady);
        }

        self.updates.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            lat = format!("{:.6}", latitude),
            lon = format!("{:.6}", longitude),
            accuracy_m = format!("{:.0}", accuracy_meters),
            "Map marker moved"
        );
        Ok(())
    }

    fn reinitialize(&self) -> Result<(), RenderError> {
        tracing::debug!("Map renderer initialised");
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn show_fallback(&self, latitude: f64, longitude: f64) -> Result<(), RenderError> {
        tracing::warn!(
            lat = format!("{:.6}", latitude),
            lon = format!("{:.6}", longitude),
            "Showing fallback location display"
        );
        Ok(())
    }
}
