//! Subscriber registry: maps a data-type to the local API connections
//! that registered interest in it.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::codec::Message;

pub type ApiId = u64;

/// Handle the dissemination engine uses to push a GOSSIP_NOTIFICATION (or
/// request close) to a subscriber's API connection task.
#[derive(Clone)]
pub struct ApiHandle {
    pub id: ApiId,
    outbound: mpsc::UnboundedSender<Message>,
}

impl ApiHandle {
    pub fn new(id: ApiId, outbound: mpsc::UnboundedSender<Message>) -> Self {
        Self { id, outbound }
    }

    pub fn send(&self, msg: Message) -> bool {
        self.outbound.send(msg).is_ok()
    }
}

impl PartialEq for ApiHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for ApiHandle {}

#[derive(Default)]
pub struct SubscriberRegistry {
    by_type: HashMap<u16, Vec<ApiHandle>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: a handle already registered for `data_type` is not
    /// duplicated.
    pub fn add(&mut self, data_type: u16, api: ApiHandle) {
        let entries = self.by_type.entry(data_type).or_default();
        if !entries.iter().any(|h| h.id == api.id) {
            entries.push(api);
        }
    }

    /// Removes `api_id` from every data-type's subscriber list.
    pub fn remove(&mut self, api_id: ApiId) {
        for entries in self.by_type.values_mut() {
            entries.retain(|h| h.id != api_id);
        }
        self.by_type.retain(|_, v| !v.is_empty());
    }

    pub fn subscribers_for(&self, data_type: u16) -> Vec<ApiHandle> {
        self.by_type.get(&data_type).cloned().unwrap_or_default()
    }

    pub fn has_subscribers(&self, data_type: u16) -> bool {
        self.by_type.get(&data_type).is_some_and(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: ApiId) -> (ApiHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ApiHandle::new(id, tx), rx)
    }

    #[test]
    fn add_is_idempotent() {
        let mut reg = SubscriberRegistry::new();
        let (h, _rx) = handle(1);
        reg.add(7, h.clone());
        reg.add(7, h);
        assert_eq!(reg.subscribers_for(7).len(), 1);
    }

    #[test]
    fn remove_clears_every_type() {
        let mut reg = SubscriberRegistry::new();
        let (h, _rx) = handle(1);
        reg.add(7, h.clone());
        reg.add(8, h.clone());
        reg.remove(h.id);
        assert!(reg.subscribers_for(7).is_empty());
        assert!(reg.subscribers_for(8).is_empty());
    }

    #[test]
    fn has_subscribers_reflects_membership() {
        let mut reg = SubscriberRegistry::new();
        assert!(!reg.has_subscribers(7));
        let (h, _rx) = handle(1);
        reg.add(7, h);
        assert!(reg.has_subscribers(7));
    }
}
