//! Reloading views after a directory changes.

use std::collections::HashSet;
use std::path::Path;

use veld_core::{Panel, ViewId};

use crate::outcome::BatchReport;

/// A view that shows the contents of one directory.
pub trait RefreshTarget {
    fn id(&self) -> ViewId;

    /// The directory the view is rooted at.
    fn root(&self) -> &Path;

    /// Re-read the directory listing.
    fn reload(&mut self);
}

impl RefreshTarget for Panel {
    fn id(&self) -> ViewId {
        Panel::id(self)
    }

    fn root(&self) -> &Path {
        Panel::root(self)
    }

    fn reload(&mut self) {
        Panel::reload(self);
    }
}

/// Tells open views that a directory changed.
///
/// Existence of the changed path is not checked; a deleted directory still
/// refreshes the views that were showing it.
#[derive(Debug, Default, Clone, Copy)]
pub struct RefreshBroadcaster;

impl RefreshBroadcaster {
    /// Whether a view rooted at `root` shows something under `changed`.
    ///
    /// Matching is component-wise, so `/home/u/doc` does not match
    /// `/home/u/docs`.
    pub fn affects(root: &Path, changed: &Path) -> bool {
        changed.starts_with(root)
    }

    /// Reload every view affected by `changed`. Returns how many reloaded.
    pub fn notify<V: RefreshTarget>(&self, views: &mut [V], changed: &Path) -> usize {
        self.notify_all(views, std::iter::once(changed))
    }

    /// Reload every view affected by any of `changed`, each at most once.
    pub fn notify_all<'a, V, I>(&self, views: &mut [V], changed: I) -> usize
    where
        V: RefreshTarget,
        I: IntoIterator<Item = &'a Path>,
    {
        let changed: Vec<&Path> = changed.into_iter().collect();
        let mut reloaded = HashSet::new();

        for view in views.iter_mut() {
            if reloaded.contains(&view.id()) {
                continue;
            }
            if changed.iter().any(|path| Self::affects(view.root(), path)) {
                tracing::debug!(view = %view.id(), root = %view.root().display(), "Reloading view");
                view.reload();
                reloaded.insert(view.id());
            }
        }

        reloaded.len()
    }

    /// Settle the views after a batch of changes: clear the originating
    /// view's selection, then reload every view showing a changed directory.
    pub fn finish<'a, I>(
        &self,
        panels: &mut [Panel],
        origin: Option<ViewId>,
        changed: I,
    ) -> usize
    where
        I: IntoIterator<Item = &'a Path>,
    {
        if let Some(panel) = origin.and_then(|id| panels.iter_mut().find(|p| p.id() == id)) {
            panel.selection_mut().clear();
        }
        self.notify_all(panels, changed)
    }

    /// Settle the views once a move or copy batch has finished.
    pub fn batch_finished(
        &self,
        panels: &mut [Panel],
        origin: Option<ViewId>,
        report: &BatchReport,
    ) -> usize {
        let reloaded = self.finish(panels, origin, report.touched_dirs());
        tracing::debug!(kind = %report.kind, reloaded, "Views refreshed after batch");
        reloaded
    }
}
