use std::collections::HashMap;

use crate::host::{ElementId, Host, IntersectionEntry, WatchId};

struct Watch<T> {
    targets: Vec<ElementId>,
    payload: T,
}

/// One-shot visibility detection.
///
/// Each [`observe`](Self::observe) call registers a watch carrying a payload.
/// The payload is handed back exactly once, for the first intersection batch
/// in which any watched element intersects, and the host observer is
/// disconnected at the same time.
pub struct VisibilityWatcher<T> {
    next_id: u64,
    watches: HashMap<WatchId, Watch<T>>,
}

impl<T> Default for VisibilityWatcher<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            watches: HashMap::new(),
        }
    }
}

impl<T> VisibilityWatcher<T> {
    pub fn observe(&mut self, host: &mut impl Host, targets: &[ElementId], payload: T) -> WatchId {
        let watch = WatchId(self.next_id);
        self.next_id += 1;
        host.observe_visibility(watch, targets);
        self.watches.insert(
            watch,
            Watch {
                targets: targets.to_vec(),
                payload,
            },
        );
        watch
    }

    pub fn handle(
        &mut self,
        host: &mut impl Host,
        watch: WatchId,
        entries: &[IntersectionEntry],
    ) -> Option<T> {
        let registered = self.watches.get(&watch)?;
        let visible = entries
            .iter()
            .any(|entry| entry.is_intersecting && registered.targets.contains(&entry.target));
        if !visible {
            return None;
        }

        host.disconnect_visibility(watch);
        self.watches.remove(&watch).map(|watch| watch.payload)
    }

    /// Stop watching `element` without firing anything. A watch is dropped
    /// and disconnected only once none of its targets remain.
    pub fn forget(&mut self, host: &mut impl Host, element: ElementId) {
        let mut emptied: Vec<WatchId> = Vec::new();
        for (id, watch) in self.watches.iter_mut() {
            watch.targets.retain(|target| *target != element);
            if watch.targets.is_empty() {
                emptied.push(*id);
            }
        }
        emptied.sort_by_key(|watch| watch.0);
        for watch in emptied {
            host.disconnect_visibility(watch);
            self.watches.remove(&watch);
        }
    }

    pub fn is_watching(&self, watch: WatchId) -> bool {
        self.watches.contains_key(&watch)
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }
}
