//! Channel id → handler dispatch table.
//!
//! Each distinct channel owns one wire subscription (the id sent to the
//! broker); any number of local handlers may hang off it. Channels are kept in
//! first-subscription order so re-subscription after a reconnect is
//! deterministic.

/// Disposable handle returned by [`SubscriptionRegistry::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    channel: String,
}

/// A subscription as the broker sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireSubscription {
    pub id: String,
    pub channel: String,
}

/// Outcome of [`SubscriptionRegistry::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsubscribed {
    /// The handle was unknown (already removed)
    NotFound,
    /// The handler was removed; other handlers still use the channel
    Removed,
    /// The last handler of the channel was removed
    ChannelReleased(WireSubscription),
}

#[derive(Debug)]
struct ChannelEntry<H> {
    wire: WireSubscription,
    handlers: Vec<(u64, H)>,
}

/// Dispatch table from channel ids to handlers of type `H`.
#[derive(Debug)]
pub struct SubscriptionRegistry<H> {
    channels: Vec<ChannelEntry<H>>,
    next_handler_id: u64,
    next_wire_id: u64,
}

impl<H> Default for SubscriptionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> SubscriptionRegistry<H> {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            next_handler_id: 0,
            next_wire_id: 0,
        }
    }

    /// Register `handler` for `channel`.
    ///
    /// The second element is `Some` when this is the first handler for the
    /// channel, i.e. when a wire subscription has to be issued.
    pub fn subscribe(
        &mut self,
        channel: impl Into<String>,
        handler: H,
    ) -> (SubscriptionHandle, Option<WireSubscription>) {
        let channel = channel.into();
        let id = self.next_handler_id;
        self.next_handler_id += 1;

        let handle = SubscriptionHandle {
            id,
            channel: channel.clone(),
        };

        if let Some(entry) = self.channels.iter_mut().find(|e| e.wire.channel == channel) {
            entry.handlers.push((id, handler));
            return (handle, None);
        }

        let wire = WireSubscription {
            id: format!("sub-{}", self.next_wire_id),
            channel,
        };
        self.next_wire_id += 1;
        tracing::debug!("Channel '{}' registered as {}", wire.channel, wire.id);
        self.channels.push(ChannelEntry {
            wire: wire.clone(),
            handlers: vec![(id, handler)],
        });
        (handle, Some(wire))
    }

    /// Remove the handler behind `handle`.
    ///
    /// The handler is gone from the table when this returns, so no later
    /// dispatch can reach it.
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> Unsubscribed {
        let Some(index) = self
            .channels
            .iter()
            .position(|e| e.wire.channel == handle.channel)
        else {
            return Unsubscribed::NotFound;
        };

        let entry = &mut self.channels[index];
        let before = entry.handlers.len();
        entry.handlers.retain(|(id, _)| *id != handle.id);
        if entry.handlers.len() == before {
            return Unsubscribed::NotFound;
        }

        if entry.handlers.is_empty() {
            let entry = self.channels.remove(index);
            tracing::debug!("Channel '{}' released", entry.wire.channel);
            Unsubscribed::ChannelReleased(entry.wire)
        } else {
            Unsubscribed::Removed
        }
    }

    /// Handlers registered for `channel`, in registration order.
    ///
    /// Empty for unknown channels.
    pub fn handlers_mut(&mut self, channel: &str) -> impl Iterator<Item = &mut H> {
        self.channels
            .iter_mut()
            .filter(move |e| e.wire.channel == channel)
            .flat_map(|e| e.handlers.iter_mut().map(|(_, h)| h))
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.iter().any(|e| e.wire.channel == channel)
    }

    /// Wire subscriptions currently active, in first-subscription order
    pub fn wire_subscriptions(&self) -> impl Iterator<Item = &WireSubscription> {
        self.channels.iter().map(|e| &e.wire)
    }

    /// Active channel ids, in first-subscription order
    pub fn channels(&self) -> Vec<String> {
        self.wire_subscriptions().map(|w| w.channel.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Drop every handler and wire subscription
    pub fn clear(&mut self) {
        self.channels.clear();
    }
}
