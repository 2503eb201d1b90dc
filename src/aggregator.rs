//! Page-view aggregation
//!
//! Owns the current page-view slot and the ordered list of finalized views
//! for the active session. Only the aggregator replaces or finalizes the
//! current view; the scroll listener is re-attached on every transition and
//! tagged with the generation of the view it was attached for.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::host::HostEnvironment;
use crate::scroll::ScrollDepthMonitor;
use crate::types::{PageView, PageViewRecord};

/// Aggregates page-views for one session
#[derive(Debug)]
pub struct PageViewAggregator {
    current: Option<PageView>,
    /// Incremented every time a view is opened
    generation: u64,
    finalized: Vec<PageViewRecord>,
    monitor: ScrollDepthMonitor,
    min_secs: u64,
}

impl PageViewAggregator {
    pub fn new(min_secs: u64) -> Self {
        Self {
            current: None,
            generation: 0,
            finalized: Vec::new(),
            monitor: ScrollDepthMonitor::new(),
            min_secs: min_secs.max(1),
        }
    }

    /// Finalize the current view and open `page` as the new current view.
    ///
    /// `on_depth` is called with the new view's generation and the depth of
    /// each scroll tick; pass both on to [`Self::record_scroll`].
    pub fn track<F>(
        &mut self,
        page: impl Into<String>,
        now: DateTime<Utc>,
        host: &dyn HostEnvironment,
        on_depth: F,
    ) where
        F: Fn(u64, u8) + Send + Sync + 'static,
    {
        self.finalize_current(now);

        self.generation += 1;
        let generation = self.generation;
        let view = PageView::open(page, now);
        debug!(page = %view.page, generation, "page view opened");
        self.current = Some(view);
        self.monitor.attach(host, move |depth| on_depth(generation, depth));
    }

    /// Close the current view, keeping it only if it meets the minimum duration.
    ///
    /// The scroll listener is detached before the duration is computed.
    pub fn finalize_current(&mut self, now: DateTime<Utc>) -> Option<PageViewRecord> {
        self.monitor.detach();
        let view = self.current.take()?;
        match view.summarize(now, self.min_secs) {
            Some(record) => {
                debug!(
                    page = %record.page,
                    duration_seconds = record.duration_seconds,
                    scroll_depth_percent = record.scroll_depth_percent,
                    "page view finalized"
                );
                self.finalized.push(record.clone());
                Some(record)
            }
            None => {
                debug!(page = %view.page, "page view discarded below minimum duration");
                None
            }
        }
    }

    /// Finalize the current view and hand back the complete ordered list.
    ///
    /// Leaves the aggregator empty.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Vec<PageViewRecord> {
        self.finalize_current(now);
        std::mem::take(&mut self.finalized)
    }

    /// Finalized views plus a synthetic entry for the live view.
    ///
    /// Non-destructive: the current view stays open and keeps its scroll
    /// listener.
    pub fn capture_snapshot(&self, now: DateTime<Utc>) -> Vec<PageViewRecord> {
        let mut views = self.finalized.clone();
        if let Some(live) = self
            .current
            .as_ref()
            .and_then(|view| view.summarize(now, self.min_secs))
        {
            views.push(live);
        }
        views
    }

    /// Raise the scroll depth of the current view.
    ///
    /// Ignored unless `generation` still identifies the current view.
    pub fn record_scroll(&mut self, generation: u64, depth: u8) -> bool {
        if generation != self.generation {
            return false;
        }
        match self.current.as_mut() {
            Some(view) => {
                view.scroll_depth_percent = view.scroll_depth_percent.max(depth.min(100));
                true
            }
            None => false,
        }
    }

    pub fn current(&self) -> Option<&PageView> {
        self.current.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn finalized(&self) -> &[PageViewRecord] {
        &self.finalized
    }
}
