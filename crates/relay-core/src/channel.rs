//! A named routing domain.
//!
//! A channel holds a broadcast set, at most one primary listener, and the
//! requesters awaiting that listener's replies. Channels are plain data:
//! all mutation happens on the registry worker, one operation at a time,
//! so there is no interior locking here.

use crate::endpoint::{Endpoint, RoutedMessage};
use crate::error::RoutingError;
use relay_types::EndpointId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Channel {
    name: String,
    subscribers: HashMap<EndpointId, Arc<dyn Endpoint>>,
    /// Endpoints that routed a request through here, keyed by the identity
    /// a reply will name as its destination.
    requesters: HashMap<EndpointId, Arc<dyn Endpoint>>,
    primary_listener: Option<Arc<dyn Endpoint>>,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: HashMap::new(),
            requesters: HashMap::new(),
            primary_listener: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn has_primary_listener(&self) -> bool {
        self.primary_listener.is_some()
    }

    fn require_source<'a>(
        &self,
        message: &'a RoutedMessage,
    ) -> Result<&'a Arc<dyn Endpoint>, RoutingError> {
        message.source.as_ref().ok_or_else(|| RoutingError::InvalidSource {
            channel: self.name.clone(),
        })
    }

    /// Add the sender to the broadcast set. Re-subscribing is a no-op.
    pub fn add_subscriber(&mut self, message: &RoutedMessage) -> Result<(), RoutingError> {
        let source = self.require_source(message)?;
        self.subscribers.insert(source.id(), Arc::clone(source));
        debug!(
            channel = %self.name,
            endpoint = %source.id(),
            subscribers = self.subscribers.len(),
            "Subscriber added"
        );
        Ok(())
    }

    /// Remove the sender from the broadcast set. Removing a non-member is
    /// a no-op; the rest of the channel is untouched.
    pub fn remove_subscriber(&mut self, message: &RoutedMessage) -> Result<(), RoutingError> {
        let source = self.require_source(message)?;
        if self.subscribers.remove(&source.id()).is_some() {
            debug!(
                channel = %self.name,
                endpoint = %source.id(),
                subscribers = self.subscribers.len(),
                "Subscriber removed"
            );
        }
        Ok(())
    }

    /// Install the sender as the primary listener, unconditionally
    /// displacing any previous holder. The displaced party is not told.
    pub fn set_primary_listener(&mut self, message: &RoutedMessage) -> Result<(), RoutingError> {
        let source = self.require_source(message)?;
        if let Some(previous) = &self.primary_listener {
            if previous.id() != source.id() {
                debug!(
                    channel = %self.name,
                    previous = %previous.id(),
                    listener = %source.id(),
                    "Primary listener displaced"
                );
            }
        }
        self.primary_listener = Some(Arc::clone(source));
        Ok(())
    }

    /// Deliver the envelope to the one endpoint it names, resolved among
    /// subscribers and known requesters.
    pub async fn send_message(&self, message: &RoutedMessage) -> Result<(), RoutingError> {
        let invalid_destination = |destination: String| RoutingError::InvalidDestination {
            channel: self.name.clone(),
            destination,
        };

        let destination = message
            .envelope
            .destination_id
            .ok_or_else(|| invalid_destination("none".to_string()))?;
        let target = self
            .subscribers
            .get(&destination)
            .or_else(|| self.requesters.get(&destination))
            .ok_or_else(|| invalid_destination(destination.to_string()))?;

        target.deliver(message.envelope.clone()).await?;
        Ok(())
    }

    /// Route a request to the primary listener, remembering the sender so
    /// the listener's reply can find its way back.
    pub async fn send_request(&mut self, message: &RoutedMessage) -> Result<(), RoutingError> {
        let listener = self
            .primary_listener
            .clone()
            .ok_or_else(|| RoutingError::MissingListener {
                channel: self.name.clone(),
            })?;
        let source = self.require_source(message)?;

        // Replies address the identity stamped on the request, so the
        // requester is keyed by it.
        let reply_key = message.envelope.source_id.unwrap_or_else(|| source.id());
        self.requesters.insert(reply_key, Arc::clone(source));

        let mut envelope = message.envelope.clone();
        envelope.destination_id = Some(listener.id());
        listener.deliver(envelope).await?;
        Ok(())
    }

    /// Broadcast the envelope to every subscriber. Deliveries are
    /// isolated: one unreachable subscriber never costs the others their
    /// copy.
    pub async fn publish(&self, message: &RoutedMessage) -> Result<(), RoutingError> {
        let mut delivered = 0usize;
        let mut failed = 0usize;

        for subscriber in self.subscribers.values() {
            match subscriber.deliver(message.envelope.clone()).await {
                Ok(()) => delivered += 1,
                Err(error) => {
                    failed += 1;
                    warn!(
                        channel = %self.name,
                        subscriber = %subscriber.id(),
                        error = %error,
                        "Dropping broadcast copy for unreachable subscriber"
                    );
                }
            }
        }

        debug!(channel = %self.name, delivered, failed, "Broadcast complete");
        Ok(())
    }

    /// Forget an endpoint entirely: broadcast set, requester table, and
    /// the listener seat if it holds it.
    pub fn remove_endpoint(&mut self, id: EndpointId) {
        self.subscribers.remove(&id);
        self.requesters.remove(&id);
        if self.primary_listener.as_ref().is_some_and(|listener| listener.id() == id) {
            self.primary_listener = None;
            debug!(channel = %self.name, endpoint = %id, "Primary listener removed");
        }
    }

    /// Whether the channel still references the endpoint anywhere.
    pub fn knows_endpoint(&self, id: EndpointId) -> bool {
        self.subscribers.contains_key(&id)
            || self.requesters.contains_key(&id)
            || self
                .primary_listener
                .as_ref()
                .is_some_and(|listener| listener.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{ChannelEndpoint, EndpointEvent};
    use relay_types::{commands, Envelope};

    fn request_from(endpoint: &Arc<ChannelEndpoint>, command: &str) -> RoutedMessage {
        let endpoint: Arc<dyn Endpoint> = Arc::clone(endpoint) as Arc<dyn Endpoint>;
        RoutedMessage::new(
            Envelope::request(command).with_source(endpoint.id()),
            endpoint,
        )
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let mut channel = Channel::new("orders");
        let (endpoint, _events) = ChannelEndpoint::new();

        let message = request_from(&endpoint, commands::SUBSCRIBE_TO_CHANNEL);
        channel.add_subscriber(&message).unwrap();
        channel.add_subscriber(&message).unwrap();
        assert_eq!(channel.subscriber_count(), 1);

        channel.remove_subscriber(&message).unwrap();
        channel.remove_subscriber(&message).unwrap();
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_without_source_is_rejected() {
        let mut channel = Channel::new("orders");
        let message = RoutedMessage::internal(Envelope::request(commands::SUBSCRIBE_TO_CHANNEL));

        let error = channel.add_subscriber(&message).unwrap_err();
        assert!(matches!(error, RoutingError::InvalidSource { .. }));
    }

    #[tokio::test]
    async fn test_request_without_listener_is_rejected() {
        let mut channel = Channel::new("orders");
        let (requester, _events) = ChannelEndpoint::new();

        let message = request_from(&requester, commands::SEND_REQUEST);
        let error = channel.send_request(&message).await.unwrap_err();
        assert!(matches!(error, RoutingError::MissingListener { .. }));
    }

    #[tokio::test]
    async fn test_request_is_stamped_with_listener_destination() {
        let mut channel = Channel::new("orders");
        let (listener, mut listener_events) = ChannelEndpoint::new();
        let (requester, _events) = ChannelEndpoint::new();

        channel
            .set_primary_listener(&request_from(&listener, commands::ADD_LISTENER))
            .unwrap();
        channel
            .send_request(&request_from(&requester, commands::SEND_REQUEST))
            .await
            .unwrap();

        let EndpointEvent::Delivered(delivered) = listener_events.recv().await.unwrap() else {
            panic!("expected a delivery");
        };
        assert_eq!(delivered.destination_id, Some(listener.id()));
        assert_eq!(delivered.source_id, Some(requester.id()));
    }

    #[tokio::test]
    async fn test_reply_reaches_requester_without_subscription() {
        let mut channel = Channel::new("orders");
        let (listener, _listener_events) = ChannelEndpoint::new();
        let (requester, mut requester_events) = ChannelEndpoint::new();

        channel
            .set_primary_listener(&request_from(&listener, commands::ADD_LISTENER))
            .unwrap();
        channel
            .send_request(&request_from(&requester, commands::SEND_REQUEST))
            .await
            .unwrap();

        // The listener answers with a directed send to the request's source.
        let reply = RoutedMessage::new(
            Envelope::update(commands::SEND_MESSAGE)
                .with_source(listener.id())
                .with_destination(requester.id())
                .with_payload("done"),
            Arc::clone(&listener) as Arc<dyn Endpoint>,
        );
        channel.send_message(&reply).await.unwrap();

        let EndpointEvent::Delivered(delivered) = requester_events.recv().await.unwrap() else {
            panic!("expected a delivery");
        };
        assert_eq!(delivered.payload.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_send_to_unknown_destination_is_rejected() {
        let channel = Channel::new("orders");
        let (sender, _events) = ChannelEndpoint::new();

        let message = RoutedMessage::new(
            Envelope::update(commands::SEND_MESSAGE).with_destination(EndpointId::new()),
            Arc::clone(&sender) as Arc<dyn Endpoint>,
        );
        let error = channel.send_message(&message).await.unwrap_err();
        assert!(matches!(error, RoutingError::InvalidDestination { .. }));

        let missing = RoutedMessage::new(
            Envelope::update(commands::SEND_MESSAGE),
            Arc::clone(&sender) as Arc<dyn Endpoint>,
        );
        let error = channel.send_message(&missing).await.unwrap_err();
        assert!(matches!(error, RoutingError::InvalidDestination { .. }));
    }

    #[tokio::test]
    async fn test_new_listener_displaces_previous_silently() {
        let mut channel = Channel::new("orders");
        let (first, mut first_events) = ChannelEndpoint::new();
        let (second, mut second_events) = ChannelEndpoint::new();
        let (requester, _events) = ChannelEndpoint::new();

        channel
            .set_primary_listener(&request_from(&first, commands::ADD_LISTENER))
            .unwrap();
        channel
            .set_primary_listener(&request_from(&second, commands::ADD_LISTENER))
            .unwrap();

        channel
            .send_request(&request_from(&requester, commands::SEND_REQUEST))
            .await
            .unwrap();

        assert!(second_events.recv().await.is_some());
        assert!(first_events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_survives_one_dead_subscriber() {
        let mut channel = Channel::new("orders");
        let (alive, mut alive_events) = ChannelEndpoint::new();
        let (dead, _dead_events) = ChannelEndpoint::new();

        channel
            .add_subscriber(&request_from(&alive, commands::SUBSCRIBE_TO_CHANNEL))
            .unwrap();
        channel
            .add_subscriber(&request_from(&dead, commands::SUBSCRIBE_TO_CHANNEL))
            .unwrap();
        dead.refuse_deliveries();

        let broadcast = RoutedMessage::internal(
            Envelope::update(commands::PUBLISH_MESSAGE).with_payload("tick"),
        );
        channel.publish(&broadcast).await.unwrap();

        let EndpointEvent::Delivered(delivered) = alive_events.recv().await.unwrap() else {
            panic!("expected a delivery");
        };
        assert_eq!(delivered.payload.as_deref(), Some("tick"));
    }

    #[tokio::test]
    async fn test_remove_endpoint_clears_every_role() {
        let mut channel = Channel::new("orders");
        let (endpoint, _events) = ChannelEndpoint::new();

        channel
            .add_subscriber(&request_from(&endpoint, commands::SUBSCRIBE_TO_CHANNEL))
            .unwrap();
        channel
            .set_primary_listener(&request_from(&endpoint, commands::ADD_LISTENER))
            .unwrap();
        assert!(channel.knows_endpoint(endpoint.id()));

        channel.remove_endpoint(endpoint.id());
        assert!(!channel.knows_endpoint(endpoint.id()));
        assert!(!channel.has_primary_listener());
    }
}
