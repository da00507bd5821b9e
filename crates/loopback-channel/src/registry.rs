use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::channel::Channel;

/// Name table of channels shared by every stream in a process.
///
/// Construct one at startup and hand it to each stream. Channels are never
/// removed, so repeated activation cycles reuse the same pool. The table lock
/// is separate from every channel's own lock: looking up a name never waits
/// on frame traffic.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, Arc<Channel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the channel registered under `name`, creating an empty one if absent.
    pub fn get_or_create(&self, name: &str) -> Arc<Channel> {
        let mut channels = self.channels.lock();
        if let Some(existing) = channels.get(name) {
            tracing::debug!(channel = name, "using existing channel");
            return Arc::clone(existing);
        }

        tracing::info!(channel = name, "creating channel");
        let channel = Arc::new(Channel::new(name));
        channels.insert(name.to_string(), Arc::clone(&channel));
        channel
    }

    /// Look up a channel without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.lock().get(name).cloned()
    }

    /// Registered channel names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }
}
