use crate::HashMap;
use kiln_base::AssetPath;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetEvent {
    Loaded(AssetPath),
    Unloaded(AssetPath),
    // Cache entries were dropped and later loads will pick up the current source
    Invalidated(AssetPath),
}

impl AssetEvent {
    pub fn path(&self) -> &AssetPath {
        match self {
            AssetEvent::Loaded(path) => path,
            AssetEvent::Unloaded(path) => path,
            AssetEvent::Invalidated(path) => path,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type SubscriptionCallback = Box<dyn FnMut(&AssetEvent)>;

// Per-path listeners. Events are queued as they happen and delivered together during tick.
#[derive(Default)]
pub(crate) struct Subscriptions {
    next_id: u64,
    subscribers: HashMap<AssetPath, Vec<(SubscriptionId, SubscriptionCallback)>>,
    subscription_paths: HashMap<SubscriptionId, AssetPath>,
    queued_events: VecDeque<AssetEvent>,
}

impl Subscriptions {
    pub(crate) fn subscribe(
        &mut self,
        path: AssetPath,
        callback: SubscriptionCallback,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscription_paths.insert(id, path.clone());
        self.subscribers
            .entry(path)
            .or_default()
            .push((id, callback));
        id
    }

    pub(crate) fn unsubscribe(
        &mut self,
        id: SubscriptionId,
    ) -> bool {
        let path = match self.subscription_paths.remove(&id) {
            Some(path) => path,
            None => return false,
        };

        if let Some(subscribers) = self.subscribers.get_mut(&path) {
            subscribers.retain(|(x, _)| *x != id);
            if subscribers.is_empty() {
                self.subscribers.remove(&path);
            }
        }

        true
    }

    pub(crate) fn queue_event(
        &mut self,
        event: AssetEvent,
    ) {
        if self.subscribers.contains_key(event.path()) {
            self.queued_events.push_back(event);
        }
    }

    pub(crate) fn dispatch(&mut self) -> usize {
        let mut dispatched = 0;
        while let Some(event) = self.queued_events.pop_front() {
            if let Some(subscribers) = self.subscribers.get_mut(event.path()) {
                for (_, callback) in subscribers {
                    (callback)(&event);
                    dispatched += 1;
                }
            }
        }

        dispatched
    }
}
