//! In-memory viewer.
//!
//! Keeps the sources it was asked to attach, their opacity and stack
//! position, and the load notifiers it has not fired yet. Loads complete
//! either automatically or when the owner calls [`RecordingViewer::complete_load`].
//! Used for headless playback and throughout the tests.
//!
//! The call log is off unless requested with [`RecordingViewer::with_call_log`],
//! so long headless runs keep constant memory.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::trace;

use super::viewer::{LoadNotifier, SourceHandle, SourceSpec, Viewer};

/// Opacity a freshly attached source starts with, before the slot hides it.
const INITIAL_OPACITY: f32 = 1.0;

/// A source currently attached to the viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSource {
    pub handle: SourceHandle,
    pub spec: SourceSpec,
    pub opacity: f32,
    pub loaded: bool,
}

/// A call made against the viewer, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerCall {
    Add { handle: SourceHandle, url: String },
    SetOpacity { handle: SourceHandle, opacity: f32, transition: Duration },
    Remove { handle: SourceHandle },
}

#[derive(Debug, Default)]
pub struct RecordingViewer {
    next_handle: u64,
    sources: BTreeMap<SourceHandle, RecordedSource>,
    waiting: BTreeMap<SourceHandle, LoadNotifier>,
    auto_load: bool,
    failing_patterns: Vec<String>,
    /// `None` while call logging is off.
    calls: Option<Vec<ViewerCall>>,
}

impl RecordingViewer {
    /// Viewer whose loads complete only on request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Viewer that reports every source as loaded as soon as it is watched.
    pub fn auto_loading() -> Self {
        Self {
            auto_load: true,
            ..Self::default()
        }
    }

    /// Make loads fail for any source whose URL contains `pattern`.
    pub fn fail_urls_containing(mut self, pattern: impl Into<String>) -> Self {
        self.failing_patterns.push(pattern.into());
        self
    }

    /// Record every viewer call, see [`RecordingViewer::calls`].
    pub fn with_call_log(mut self) -> Self {
        self.calls = Some(Vec::new());
        self
    }

    fn log(&mut self, call: ViewerCall) {
        if let Some(calls) = self.calls.as_mut() {
            calls.push(call);
        }
    }

    /// Fire the pending load notification for `handle`.
    pub fn complete_load(&mut self, handle: SourceHandle) -> bool {
        match self.waiting.remove(&handle) {
            Some(notifier) => {
                if let Some(source) = self.sources.get_mut(&handle) {
                    source.loaded = true;
                }
                notifier.loaded();
                true
            }
            None => false,
        }
    }

    /// Fail the pending load notification for `handle`.
    pub fn fail_load(&mut self, handle: SourceHandle, reason: &str) -> bool {
        match self.waiting.remove(&handle) {
            Some(notifier) => {
                notifier.failed(reason);
                true
            }
            None => false,
        }
    }

    /// Complete every pending load; returns how many fired.
    pub fn complete_all(&mut self) -> usize {
        let handles: Vec<SourceHandle> = self.waiting.keys().copied().collect();
        handles
            .into_iter()
            .filter(|handle| self.complete_load(*handle))
            .count()
    }

    /// Remove a pending notifier without firing it, e.g. to deliver it late.
    pub fn take_notifier(&mut self, handle: SourceHandle) -> Option<LoadNotifier> {
        self.waiting.remove(&handle)
    }

    /// Handles whose load has not been reported yet.
    pub fn waiting_loads(&self) -> Vec<SourceHandle> {
        self.waiting.keys().copied().collect()
    }

    pub fn source(&self, handle: SourceHandle) -> Option<&RecordedSource> {
        self.sources.get(&handle)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Attached sources bottom to top. Within a stack position, later
    /// sources draw above earlier ones.
    pub fn stacking(&self) -> Vec<&RecordedSource> {
        let mut sources: Vec<&RecordedSource> = self.sources.values().collect();
        sources.sort_by_key(|source| (source.spec.stack, source.handle));
        sources
    }

    /// Attached sources with non-zero opacity, bottom to top.
    pub fn visible_sources(&self) -> Vec<&RecordedSource> {
        self.stacking()
            .into_iter()
            .filter(|source| source.opacity > 0.0)
            .collect()
    }

    /// Calls made so far; empty unless the call log is on.
    pub fn calls(&self) -> &[ViewerCall] {
        self.calls.as_deref().unwrap_or_default()
    }
}

impl Viewer for RecordingViewer {
    fn add_raster_source(&mut self, spec: &SourceSpec) -> SourceHandle {
        self.next_handle += 1;
        let handle = SourceHandle(self.next_handle);
        trace!(%handle, label = %spec.label, url = %spec.url, "attach source");

        self.sources.insert(
            handle,
            RecordedSource {
                handle,
                spec: spec.clone(),
                opacity: INITIAL_OPACITY,
                loaded: false,
            },
        );
        self.log(ViewerCall::Add {
            handle,
            url: spec.url.clone(),
        });
        handle
    }

    fn set_opacity(&mut self, handle: SourceHandle, opacity: f32, transition: Duration) {
        if let Some(source) = self.sources.get_mut(&handle) {
            source.opacity = opacity;
        }
        self.log(ViewerCall::SetOpacity {
            handle,
            opacity,
            transition,
        });
    }

    fn remove_source(&mut self, handle: SourceHandle) {
        trace!(%handle, "detach source");
        self.sources.remove(&handle);
        // Dropping the notifier reports the abandoned load.
        self.waiting.remove(&handle);
        self.log(ViewerCall::Remove { handle });
    }

    fn on_source_loaded(&mut self, handle: SourceHandle, notifier: LoadNotifier) {
        let Some(source) = self.sources.get_mut(&handle) else {
            notifier.failed(format!("unknown source {handle}"));
            return;
        };

        if self
            .failing_patterns
            .iter()
            .any(|pattern| source.spec.url.contains(pattern.as_str()))
        {
            notifier.failed(format!("tiles unavailable for {}", source.spec.url));
        } else if self.auto_load {
            source.loaded = true;
            notifier.loaded();
        } else {
            self.waiting.insert(handle, notifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::viewer::{BufferId, LoadOutcome, LoadTag};
    use crate::layers::{StackPosition, Tier};
    use tokio::sync::mpsc;

    fn spec(url: &str, tier: Tier, index: usize) -> SourceSpec {
        SourceSpec {
            url: url.to_string(),
            min_zoom: 0,
            max_zoom: 7,
            stack: StackPosition { tier, index },
            label: format!("layer{index}"),
        }
    }

    fn tag() -> LoadTag {
        LoadTag {
            layer_id: "sst".to_string(),
            epoch: 1,
            buffer: BufferId::A,
            generation: 1,
        }
    }

    #[test]
    fn test_manual_load_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut viewer = RecordingViewer::new();
        let handle = viewer.add_raster_source(&spec("https://a/1", Tier::Overlay, 1));
        viewer.on_source_loaded(handle, LoadNotifier::new(tag(), tx));

        assert!(rx.try_recv().is_err());
        assert_eq!(viewer.waiting_loads(), vec![handle]);

        assert!(viewer.complete_load(handle));
        assert_eq!(rx.try_recv().unwrap().outcome, LoadOutcome::Loaded);
        assert!(viewer.source(handle).unwrap().loaded);
    }

    #[test]
    fn test_failure_pattern() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut viewer = RecordingViewer::auto_loading().fail_urls_containing("2024-09-12");
        let handle = viewer.add_raster_source(&spec("https://a/2024-09-12/x", Tier::Overlay, 1));
        viewer.on_source_loaded(handle, LoadNotifier::new(tag(), tx));

        assert!(matches!(rx.try_recv().unwrap().outcome, LoadOutcome::Failed(_)));
    }

    #[test]
    fn test_stacking_puts_base_first() {
        let mut viewer = RecordingViewer::new();
        let overlay = viewer.add_raster_source(&spec("https://overlay", Tier::Overlay, 1));
        let base = viewer.add_raster_source(&spec("https://base", Tier::Base, 3));

        let order: Vec<SourceHandle> = viewer.stacking().iter().map(|s| s.handle).collect();
        assert_eq!(order, vec![base, overlay]);
    }

    #[test]
    fn test_remove_abandons_waiting_load() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut viewer = RecordingViewer::new();
        let handle = viewer.add_raster_source(&spec("https://a", Tier::Overlay, 1));
        viewer.on_source_loaded(handle, LoadNotifier::new(tag(), tx));

        viewer.remove_source(handle);
        assert_eq!(viewer.source_count(), 0);
        assert!(matches!(rx.try_recv().unwrap().outcome, LoadOutcome::Failed(_)));
    }

    #[test]
    fn test_call_log_is_opt_in() {
        let mut quiet = RecordingViewer::auto_loading();
        let mut logged = RecordingViewer::auto_loading().with_call_log();
        for viewer in [&mut quiet, &mut logged] {
            let handle = viewer.add_raster_source(&spec("https://a", Tier::Overlay, 1));
            viewer.set_opacity(handle, 0.0, Duration::ZERO);
            viewer.remove_source(handle);
        }

        assert!(quiet.calls().is_empty());
        assert_eq!(logged.calls().len(), 3);
        assert!(matches!(logged.calls()[2], ViewerCall::Remove { .. }));
    }
}
