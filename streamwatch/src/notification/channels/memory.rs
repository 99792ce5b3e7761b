//! In-memory delivery channel.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{DeliveryChannel, DeliveryError, DeliveryResult, MessageHandle};
use crate::notification::message::MessageContent;

/// A call made on a [`MemoryChannel`], successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOp {
    Send,
    Edit(MessageHandle),
    Delete(MessageHandle),
    Fetch(MessageHandle),
}

impl ChannelOp {
    fn same_kind(&self, other: &ChannelOp) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    messages: BTreeMap<u64, MessageContent>,
    ops: Vec<ChannelOp>,
    /// Errors to return from upcoming calls, matched by op kind.
    injected: VecDeque<(ChannelOp, DeliveryError)>,
}

impl Inner {
    fn take_injected(&mut self, op: &ChannelOp) -> Option<DeliveryError> {
        let pos = self.injected.iter().position(|(kind, _)| kind.same_kind(op))?;
        self.injected.remove(pos).map(|(_, err)| err)
    }
}

/// Delivery channel that keeps messages in memory.
///
/// Records every call, and can be told to fail upcoming calls or to lose
/// messages as if someone deleted them by hand.
#[derive(Default)]
pub struct MemoryChannel {
    inner: Mutex<Inner>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages currently in the channel, oldest first.
    pub fn messages(&self) -> Vec<(MessageHandle, MessageContent)> {
        self.inner
            .lock()
            .messages
            .iter()
            .map(|(id, content)| (MessageHandle::new(id.to_string()), content.clone()))
            .collect()
    }

    pub fn message(&self, handle: &MessageHandle) -> Option<MessageContent> {
        let id = parse_id(handle)?;
        self.inner.lock().messages.get(&id).cloned()
    }

    /// Delete a message behind the watcher's back.
    pub fn remove_externally(&self, handle: &MessageHandle) -> bool {
        parse_id(handle).is_some_and(|id| self.inner.lock().messages.remove(&id).is_some())
    }

    /// Every call made so far, in order.
    pub fn ops(&self) -> Vec<ChannelOp> {
        self.inner.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.inner.lock().ops.clear();
    }

    /// Make the next call of the same kind as `op` fail with `error`.
    ///
    /// The handle inside `op` is ignored; only the kind is matched.
    pub fn fail_next(&self, op: ChannelOp, error: DeliveryError) {
        self.inner.lock().injected.push_back((op, error));
    }

    /// Record `op` and return an injected failure, if one is queued for it.
    fn begin(&self, op: ChannelOp) -> DeliveryResult<()> {
        let mut inner = self.inner.lock();
        let injected = inner.take_injected(&op);
        inner.ops.push(op);
        match injected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn parse_id(handle: &MessageHandle) -> Option<u64> {
    handle.as_str().parse().ok()
}

#[async_trait]
impl DeliveryChannel for MemoryChannel {
    fn channel_type(&self) -> &'static str {
        "memory"
    }

    async fn send(&self, content: &MessageContent) -> DeliveryResult<MessageHandle> {
        self.begin(ChannelOp::Send)?;
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.messages.insert(id, content.clone());
        Ok(MessageHandle::new(id.to_string()))
    }

    async fn edit(&self, handle: &MessageHandle, content: &MessageContent) -> DeliveryResult<()> {
        self.begin(ChannelOp::Edit(handle.clone()))?;
        let id = parse_id(handle).ok_or(DeliveryError::NotFound)?;
        match self.inner.lock().messages.get_mut(&id) {
            Some(existing) => {
                *existing = content.clone();
                Ok(())
            }
            None => Err(DeliveryError::NotFound),
        }
    }

    async fn delete(&self, handle: &MessageHandle) -> DeliveryResult<()> {
        self.begin(ChannelOp::Delete(handle.clone()))?;
        let id = parse_id(handle).ok_or(DeliveryError::NotFound)?;
        match self.inner.lock().messages.remove(&id) {
            Some(_) => Ok(()),
            None => Err(DeliveryError::NotFound),
        }
    }

    async fn fetch(&self, handle: &MessageHandle) -> DeliveryResult<MessageContent> {
        self.begin(ChannelOp::Fetch(handle.clone()))?;
        let id = parse_id(handle).ok_or(DeliveryError::NotFound)?;
        self.inner
            .lock()
            .messages
            .get(&id)
            .cloned()
            .ok_or(DeliveryError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_message_lifecycle() {
        let channel = MemoryChannel::new();
        let handle = channel.send(&MessageContent::text("a")).await.unwrap();
        channel
            .edit(&handle, &MessageContent::text("b"))
            .await
            .unwrap();
        assert_eq!(
            channel.fetch(&handle).await.unwrap(),
            MessageContent::text("b")
        );

        channel.delete(&handle).await.unwrap();
        assert!(channel.delete(&handle).await.unwrap_err().is_not_found());
        assert!(channel.messages().is_empty());
        assert_eq!(channel.ops().len(), 5);
    }

    #[tokio::test]
    async fn test_injected_failure_matches_kind() {
        let channel = MemoryChannel::new();
        channel.fail_next(
            ChannelOp::Delete(MessageHandle::new("")),
            DeliveryError::Request("boom".into()),
        );

        let handle = channel.send(&MessageContent::text("a")).await.unwrap();
        assert!(matches!(
            channel.delete(&handle).await,
            Err(DeliveryError::Request(_))
        ));
        assert!(channel.message(&handle).is_some());
        channel.delete(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_externally() {
        let channel = MemoryChannel::new();
        let handle = channel.send(&MessageContent::text("a")).await.unwrap();
        assert!(channel.remove_externally(&handle));
        assert!(channel.fetch(&handle).await.unwrap_err().is_not_found());
    }
}
