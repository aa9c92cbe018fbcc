//! # End-to-End Broker Tests
//!
//! A real broker bound on loopback sockets, exercised through the
//! connector crate. The external-authentication tests drive the auth
//! listener with a raw WebSocket so the authority side of the protocol
//! is spelled out frame by frame.

#[cfg(test)]
mod tests {
    use futures_util::stream::{SplitSink, SplitStream};
    use futures_util::{SinkExt, StreamExt};
    use relay_client::{connect, BrokerClient, ClientSession, ResponseHandlers};
    use relay_server::{BrokerConfig, BrokerService};
    use relay_types::{codec, commands, AuthResult, Envelope, LoginPayload, MessageKind};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

    const RESPONSE_TTL: Duration = Duration::from_secs(5);
    const WAIT: Duration = Duration::from_secs(5);

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    /// A running broker on loopback. Ports are per-test so the suites can
    /// run in parallel.
    async fn start_broker(endpoint_port: u16, auth_port: u16) -> BrokerService {
        let mut config = BrokerConfig::default();
        config.endpoint.host = "127.0.0.1".parse().unwrap();
        config.endpoint.port = endpoint_port;
        config.auth.port = auth_port;
        config.timeouts.auth = Duration::from_secs(5);
        config.timeouts.shutdown_drain = Duration::from_millis(10);

        let mut service = BrokerService::new(config).expect("broker assembly failed");
        service.start().await.expect("broker failed to start");
        service
    }

    type Verdict = Result<Option<String>, Option<String>>;

    /// Response handlers that forward the terminal verdict to a channel.
    fn ack_handlers() -> (ResponseHandlers, mpsc::UnboundedReceiver<Verdict>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let on_success = {
            let tx = tx.clone();
            move |payload| {
                let _ = tx.send(Ok(payload));
            }
        };
        let on_fail = move |payload| {
            let _ = tx.send(Err(payload));
        };
        (ResponseHandlers::new(on_success, on_fail), rx)
    }

    async fn expect_verdict(verdicts: &mut mpsc::UnboundedReceiver<Verdict>) -> Verdict {
        timeout(WAIT, verdicts.recv())
            .await
            .expect("timed out waiting for a terminal response")
            .expect("handler channel closed")
    }

    /// Connect to the endpoint listener and complete a login.
    async fn logged_in_client(
        endpoint_port: u16,
        user: &str,
        password: &str,
    ) -> (Arc<BrokerClient>, ClientSession) {
        let url = format!("ws://127.0.0.1:{endpoint_port}");
        let (client, session) = connect(&url, RESPONSE_TTL).await.expect("connect failed");

        let (handlers, mut verdicts) = ack_handlers();
        client
            .login(user, password, "relay-tests", handlers)
            .await
            .expect("login send failed");
        assert!(
            expect_verdict(&mut verdicts).await.is_ok(),
            "login was refused for {user}"
        );
        (client, session)
    }

    /// Collect inbound request/update envelopes from a client's data
    /// callback.
    fn collect_data(client: &BrokerClient) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        client.set_data_callback(move |envelope| {
            let _ = tx.send(envelope);
        });
        rx
    }

    async fn next_data(data: &mut mpsc::UnboundedReceiver<Envelope>) -> Envelope {
        timeout(WAIT, data.recv())
            .await
            .expect("timed out waiting for a data envelope")
            .expect("data channel closed")
    }

    // =========================================================================
    // PUBLISH / SUBSCRIBE OVER REAL SOCKETS
    // =========================================================================

    #[tokio::test]
    async fn test_login_subscribe_publish_over_sockets() {
        let _broker = start_broker(28101, 28102).await;

        let (subscriber, subscriber_session) =
            logged_in_client(28101, "admin", "password").await;
        let mut inbound = collect_data(&subscriber);

        let (handlers, mut verdicts) = ack_handlers();
        subscriber
            .subscribe_to_channel("prices", handlers)
            .await
            .unwrap();
        assert!(expect_verdict(&mut verdicts).await.is_ok());

        let (publisher, publisher_session) = logged_in_client(28101, "admin", "password").await;
        publisher.publish_message("prices", "tick 99").await.unwrap();

        let delivered = next_data(&mut inbound).await;
        assert_eq!(delivered.kind, MessageKind::Update);
        assert_eq!(delivered.channel.as_deref(), Some("prices"));
        assert_eq!(delivered.payload.as_deref(), Some("tick 99"));

        publisher_session.close().await;
        subscriber_session.close().await;
    }

    #[tokio::test]
    async fn test_bad_credentials_are_refused() {
        let _broker = start_broker(28111, 28112).await;

        let (client, _session) = connect("ws://127.0.0.1:28111", RESPONSE_TTL)
            .await
            .unwrap();

        let (handlers, mut verdicts) = ack_handlers();
        client
            .login("admin", "wrong", "relay-tests", handlers)
            .await
            .unwrap();

        let verdict = expect_verdict(&mut verdicts).await;
        assert_eq!(verdict, Err(Some("authentication failed".to_string())));

        // The session is still open; correct credentials now succeed.
        let (handlers, mut verdicts) = ack_handlers();
        client
            .login("admin", "password", "relay-tests", handlers)
            .await
            .unwrap();
        assert!(expect_verdict(&mut verdicts).await.is_ok());
    }

    // =========================================================================
    // REQUEST / RESPONSE THROUGH A PRIMARY LISTENER
    // =========================================================================

    #[tokio::test]
    async fn test_request_round_trip_over_sockets() {
        let _broker = start_broker(28121, 28122).await;

        let (listener, listener_session) = logged_in_client(28121, "admin", "password").await;
        let mut listener_inbound = collect_data(&listener);

        let (handlers, mut verdicts) = ack_handlers();
        listener.add_channel_listener("orders", handlers).await.unwrap();
        assert!(expect_verdict(&mut verdicts).await.is_ok());

        let (requester, requester_session) = logged_in_client(28121, "admin", "password").await;
        let mut requester_inbound = collect_data(&requester);

        let (handlers, mut verdicts) = ack_handlers();
        requester
            .send_request("orders", "buy 1 lot", handlers)
            .await
            .unwrap();

        // The broker stamped the requester's identity onto the forwarded
        // request, and acknowledged the routing to the requester.
        let forwarded = next_data(&mut listener_inbound).await;
        assert_eq!(forwarded.kind, MessageKind::Request);
        assert_eq!(forwarded.payload.as_deref(), Some("buy 1 lot"));
        let reply_to = forwarded.source_id.expect("forwarded request has a source");
        assert!(expect_verdict(&mut verdicts).await.is_ok());

        // The listener answers with a directed send to that identity.
        listener
            .send_message("orders", &reply_to.to_string(), "filled")
            .await
            .unwrap();

        let reply = next_data(&mut requester_inbound).await;
        assert_eq!(reply.payload.as_deref(), Some("filled"));

        requester_session.close().await;
        listener_session.close().await;
    }

    // =========================================================================
    // EXTERNAL AUTHENTICATION ROUND TRIP
    // =========================================================================

    type AuthoritySink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
    type AuthorityStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

    async fn authority_send(sink: &mut AuthoritySink, envelope: &Envelope) {
        let frame = codec::encode_envelope(envelope).unwrap();
        sink.send(Message::Text(frame)).await.expect("authority send failed");
    }

    async fn authority_next(stream: &mut AuthorityStream) -> Envelope {
        loop {
            let message = timeout(WAIT, stream.next())
                .await
                .expect("timed out waiting for an authority frame")
                .expect("authority socket closed")
                .expect("authority socket failed");
            match message {
                Message::Text(text) => return codec::decode_envelope(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected authority frame: {other:?}"),
            }
        }
    }

    /// Log in on the auth listener and register as the upstream
    /// authenticator, then answer delegated logins: `bob/piddy` passes,
    /// everything else fails. Close notices are forwarded to the returned
    /// channel.
    async fn run_authority(auth_port: u16) -> mpsc::UnboundedReceiver<Envelope> {
        let url = format!("ws://127.0.0.1:{auth_port}");
        let (stream, _) = connect_async(&url).await.expect("authority connect failed");
        let (mut sink, mut stream) = stream.split();

        // The auth listener runs the same gate; the authority logs in
        // through the static link first.
        let payload = codec::encode_login(&LoginPayload::new("admin", "password")).unwrap();
        authority_send(
            &mut sink,
            &Envelope::request(commands::LOGIN).with_payload(payload),
        )
        .await;
        let ack = authority_next(&mut stream).await;
        assert_eq!(ack.kind, MessageKind::ResponseSuccess);

        authority_send(&mut sink, &Envelope::request(commands::REGISTER_AUTH)).await;
        let ack = authority_next(&mut stream).await;
        assert_eq!(ack.kind, MessageKind::ResponseSuccess);

        let (notices, notices_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let request = authority_next(&mut stream).await;
                match request.command.as_deref() {
                    Some(commands::LOGIN) => {
                        let login =
                            codec::decode_login(request.payload.as_deref().unwrap()).unwrap();
                        let result = if login.user_name == "bob" && login.password == "piddy" {
                            AuthResult::passed("Authentication Passed")
                        } else {
                            AuthResult::failed("Authentication Failed")
                        };
                        let verdict = Envelope::request(commands::LOGIN)
                            .with_request_id(request.request_id.unwrap())
                            .with_payload(codec::encode_auth_result(&result).unwrap());
                        authority_send(&mut sink, &verdict).await;
                    }
                    _ => {
                        if notices.send(request).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        notices_rx
    }

    #[tokio::test]
    async fn test_external_auth_round_trip() {
        let _broker = start_broker(28131, 28132).await;
        let mut notices = run_authority(28132).await;

        // The static link rejects bob, so the chain delegates upstream and
        // the authority's verdict decides.
        let (_bob, bob_session) = logged_in_client(28131, "bob", "piddy").await;

        // An unknown user fails both links.
        let (eve, _eve_session) = connect("ws://127.0.0.1:28131", RESPONSE_TTL)
            .await
            .unwrap();
        let (handlers, mut verdicts) = ack_handlers();
        eve.login("eve", "letmein", "relay-tests", handlers)
            .await
            .unwrap();
        assert_eq!(
            expect_verdict(&mut verdicts).await,
            Err(Some("authentication failed".to_string()))
        );

        // A departed session is reported upstream, best-effort.
        bob_session.close().await;
        let notice = timeout(WAIT, notices.recv())
            .await
            .expect("timed out waiting for a close notice")
            .expect("authority responder stopped");
        assert_eq!(notice.command.as_deref(), Some(commands::NOTIFY_CLOSE));
        assert!(notice.payload.is_some());
    }
}
