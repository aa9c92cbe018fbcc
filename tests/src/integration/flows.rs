//! # Multi-Endpoint Routing Flows
//!
//! Frame-level tests wiring several connection gates to one channel
//! registry, exactly the way the WebSocket listener does, minus the
//! sockets: JSON frames go into each gate, and whatever the broker says
//! back comes out of that connection's frame queue.

#[cfg(test)]
mod tests {
    use relay_core::{
        channel_command_chain, AuthChain, ChannelConnection, ChannelRegistry, Dispatcher,
        EndpointGate, NullStats, StaticCredentialAuthenticator,
    };
    use relay_types::{codec, commands, EndpointId, Envelope, LoginPayload, MessageKind};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    /// One broker core shared by every gate a test creates.
    struct Broker {
        dispatcher: Arc<Dispatcher>,
        auth: Arc<AuthChain>,
    }

    impl Broker {
        fn new() -> Self {
            let registry = ChannelRegistry::start(Arc::new(NullStats));
            Self {
                dispatcher: channel_command_chain(registry),
                auth: Arc::new(AuthChain::new(vec![Arc::new(
                    StaticCredentialAuthenticator::default(),
                )])),
            }
        }

        /// A fresh, already logged-in connection.
        async fn endpoint(&self) -> (Arc<EndpointGate>, UnboundedReceiver<String>) {
            let (connection, mut frames) = ChannelConnection::pair();
            let gate = Arc::new(EndpointGate::new(
                connection,
                Arc::clone(&self.dispatcher),
                Arc::clone(&self.auth),
            ));

            let payload = codec::encode_login(&LoginPayload::new("admin", "password")).unwrap();
            let frame =
                codec::encode_envelope(&Envelope::request(commands::LOGIN).with_payload(payload))
                    .unwrap();
            gate.authenticate(&frame).await;
            let ack = next_frame(&mut frames).await;
            assert_eq!(ack.kind, MessageKind::ResponseSuccess);

            (gate, frames)
        }
    }

    async fn send(gate: &Arc<EndpointGate>, envelope: &Envelope) {
        Arc::clone(gate)
            .data_received(&codec::encode_envelope(envelope).unwrap())
            .await
            .unwrap();
    }

    async fn next_frame(frames: &mut UnboundedReceiver<String>) -> Envelope {
        let frame = timeout(Duration::from_secs(1), frames.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed");
        codec::decode_envelope(&frame).unwrap()
    }

    async fn assert_silent(frames: &mut UnboundedReceiver<String>) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(frames.try_recv().is_err(), "expected no frame");
    }

    async fn subscribe(
        gate: &Arc<EndpointGate>,
        frames: &mut UnboundedReceiver<String>,
        channel: &str,
    ) {
        send(
            gate,
            &Envelope::request(commands::SUBSCRIBE_TO_CHANNEL).with_channel(channel),
        )
        .await;
        assert_eq!(next_frame(frames).await.kind, MessageKind::ResponseSuccess);
    }

    // =========================================================================
    // BROADCAST FAN-OUT
    // =========================================================================

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber_with_identical_payload() {
        let broker = Broker::new();
        let (first, mut first_frames) = broker.endpoint().await;
        let (second, mut second_frames) = broker.endpoint().await;
        let (third, mut third_frames) = broker.endpoint().await;
        let (publisher, mut publisher_frames) = broker.endpoint().await;

        subscribe(&first, &mut first_frames, "ticks").await;
        subscribe(&second, &mut second_frames, "ticks").await;
        subscribe(&third, &mut third_frames, "ticks").await;

        send(
            &publisher,
            &Envelope::update(commands::PUBLISH_MESSAGE)
                .with_channel("ticks")
                .with_payload("tick 42"),
        )
        .await;

        for frames in [&mut first_frames, &mut second_frames, &mut third_frames] {
            let delivered = next_frame(frames).await;
            assert_eq!(delivered.kind, MessageKind::Update);
            assert_eq!(delivered.payload.as_deref(), Some("tick 42"));
            assert_eq!(delivered.source_id, Some(publisher.id()));
        }

        // The publisher is not subscribed, and updates are never acked.
        assert_silent(&mut publisher_frames).await;
        drop((first, second, third));
    }

    // =========================================================================
    // DIRECTED SENDS
    // =========================================================================

    #[tokio::test]
    async fn test_directed_send_reaches_only_its_destination() {
        let broker = Broker::new();
        let (target, mut target_frames) = broker.endpoint().await;
        let (bystander, mut bystander_frames) = broker.endpoint().await;
        let (sender, mut sender_frames) = broker.endpoint().await;

        subscribe(&target, &mut target_frames, "mail").await;
        subscribe(&bystander, &mut bystander_frames, "mail").await;

        send(
            &sender,
            &Envelope::update(commands::SEND_MESSAGE)
                .with_channel("mail")
                .with_destination(target.id())
                .with_payload("for your eyes only"),
        )
        .await;

        let delivered = next_frame(&mut target_frames).await;
        assert_eq!(delivered.payload.as_deref(), Some("for your eyes only"));
        assert_eq!(delivered.destination_id, Some(target.id()));

        assert_silent(&mut bystander_frames).await;
        assert_silent(&mut sender_frames).await;
    }

    #[tokio::test]
    async fn test_send_to_unknown_destination_is_error_acked_for_requests() {
        let broker = Broker::new();
        let (sender, mut sender_frames) = broker.endpoint().await;

        send(
            &sender,
            &Envelope::request(commands::SEND_MESSAGE)
                .with_channel("mail")
                .with_destination(EndpointId::new())
                .with_payload("dead letter"),
        )
        .await;

        let ack = next_frame(&mut sender_frames).await;
        assert_eq!(ack.kind, MessageKind::ResponseError);
        assert!(
            ack.payload.as_deref().unwrap_or("").contains("invalid destination endpoint"),
            "got: {:?}",
            ack.payload
        );
    }

    // =========================================================================
    // REQUEST / RESPONSE THROUGH THE PRIMARY LISTENER
    // =========================================================================

    #[tokio::test]
    async fn test_request_round_trip_between_endpoints() {
        let broker = Broker::new();
        let (listener, mut listener_frames) = broker.endpoint().await;
        let (requester, mut requester_frames) = broker.endpoint().await;

        send(
            &listener,
            &Envelope::request(commands::ADD_LISTENER).with_channel("orders"),
        )
        .await;
        assert_eq!(
            next_frame(&mut listener_frames).await.kind,
            MessageKind::ResponseSuccess
        );

        send(
            &requester,
            &Envelope::request(commands::SEND_REQUEST)
                .with_channel("orders")
                .with_payload("buy 1 lot"),
        )
        .await;

        // The broker stamps the route on the forwarded request.
        let forwarded = next_frame(&mut listener_frames).await;
        assert_eq!(forwarded.kind, MessageKind::Request);
        assert_eq!(forwarded.command.as_deref(), Some(commands::SEND_REQUEST));
        assert_eq!(forwarded.payload.as_deref(), Some("buy 1 lot"));
        assert_eq!(forwarded.source_id, Some(requester.id()));
        assert_eq!(forwarded.destination_id, Some(listener.id()));

        // Routing succeeded, so the requester gets its terminal response.
        let ack = next_frame(&mut requester_frames).await;
        assert_eq!(ack.kind, MessageKind::ResponseSuccess);
        assert_eq!(ack.request_id, forwarded.request_id);

        // The listener answers with a directed send to the request's
        // source, which works without the requester ever subscribing.
        send(
            &listener,
            &Envelope::update(commands::SEND_MESSAGE)
                .with_channel("orders")
                .with_destination(forwarded.source_id.unwrap())
                .with_payload("filled"),
        )
        .await;

        let reply = next_frame(&mut requester_frames).await;
        assert_eq!(reply.payload.as_deref(), Some("filled"));
        assert_eq!(reply.source_id, Some(listener.id()));
    }

    #[tokio::test]
    async fn test_request_without_listener_is_refused() {
        let broker = Broker::new();
        let (requester, mut requester_frames) = broker.endpoint().await;

        send(
            &requester,
            &Envelope::request(commands::SEND_REQUEST)
                .with_channel("void")
                .with_payload("anyone there?"),
        )
        .await;

        let ack = next_frame(&mut requester_frames).await;
        assert_eq!(ack.kind, MessageKind::ResponseError);
        assert_eq!(
            ack.payload.as_deref(),
            Some("no listener specified for channel void")
        );
    }

    // =========================================================================
    // DISCONNECT CLEANUP
    // =========================================================================

    #[tokio::test]
    async fn test_closed_endpoints_are_forgotten_everywhere() {
        let broker = Broker::new();
        let (subscriber, mut subscriber_frames) = broker.endpoint().await;
        let (listener, mut listener_frames) = broker.endpoint().await;
        let (prober, mut prober_frames) = broker.endpoint().await;

        subscribe(&subscriber, &mut subscriber_frames, "ticks").await;
        send(
            &listener,
            &Envelope::request(commands::ADD_LISTENER).with_channel("orders"),
        )
        .await;
        assert_eq!(
            next_frame(&mut listener_frames).await.kind,
            MessageKind::ResponseSuccess
        );

        subscriber.endpoint_closed().await;
        listener.endpoint_closed().await;

        // The broadcast set no longer contains the departed subscriber.
        send(
            &prober,
            &Envelope::update(commands::PUBLISH_MESSAGE)
                .with_channel("ticks")
                .with_payload("tick"),
        )
        .await;
        assert_silent(&mut subscriber_frames).await;

        // The listener seat is vacant again.
        send(
            &prober,
            &Envelope::request(commands::SEND_REQUEST).with_channel("orders"),
        )
        .await;
        let ack = next_frame(&mut prober_frames).await;
        assert_eq!(ack.kind, MessageKind::ResponseError);
        assert_eq!(
            ack.payload.as_deref(),
            Some("no listener specified for channel orders")
        );
    }
}
