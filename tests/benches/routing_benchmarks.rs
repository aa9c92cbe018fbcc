//! # Routing Benchmarks
//!
//! Microbenchmarks for the hot paths of the broker core: the wire codec,
//! dispatcher matching, broadcast fan-out, and response correlation.
//!
//! ## Usage
//!
//! ```bash
//! cargo bench --package relay-tests --bench routing_benchmarks
//! cargo bench --package relay-tests --bench routing_benchmarks -- publish
//! ```

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use relay_core::{
    Channel, ChannelEndpoint, CommandAction, Dispatcher, Endpoint, EndpointEvent,
    PendingResponses, ResponseCallbacks, ResponseHandlers, RoutedMessage,
};
use relay_types::{codec, commands, CorrelationId, EndpointId, Envelope};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;

fn wire_envelope() -> Envelope {
    Envelope::request(commands::SEND_REQUEST)
        .with_channel("orders")
        .with_source(EndpointId::new())
        .with_payload(r#"{"sku":"widget","qty":12}"#)
}

fn bench_envelope_codec(c: &mut Criterion) {
    let envelope = wire_envelope();
    let frame = codec::encode_envelope(&envelope).unwrap();

    c.bench_function("codec/encode_envelope", |b| {
        b.iter(|| codec::encode_envelope(black_box(&envelope)).unwrap())
    });
    c.bench_function("codec/decode_envelope", |b| {
        b.iter(|| codec::decode_envelope(black_box(&frame)).unwrap())
    });
}

struct NoopAction;

#[async_trait]
impl CommandAction for NoopAction {
    async fn execute(&self, _message: RoutedMessage) {}
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    // The stock chain is six links; matching cost depends on where the
    // command sits, so measure the head and the tail.
    let dispatcher = Dispatcher::new();
    for command in [
        commands::PUBLISH_MESSAGE,
        commands::SEND_MESSAGE,
        commands::SEND_REQUEST,
        commands::ADD_LISTENER,
        commands::SUBSCRIBE_TO_CHANNEL,
        commands::REMOVE_SUBSCRIPTION,
    ] {
        dispatcher.add_handler(command, Arc::new(NoopAction));
    }

    for (label, command) in [
        ("first_link", commands::PUBLISH_MESSAGE),
        ("last_link", commands::REMOVE_SUBSCRIPTION),
    ] {
        c.bench_function(&format!("dispatch/{label}"), |b| {
            b.iter(|| {
                let message = RoutedMessage::internal(Envelope::update(command));
                rt.block_on(dispatcher.process_message(black_box(message)))
            })
        });
    }
}

fn drain(events: &mut UnboundedReceiver<EndpointEvent>) {
    while events.try_recv().is_ok() {}
}

fn bench_publish_fanout(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("publish");

    for subscribers in [1usize, 8, 64] {
        let mut channel = Channel::new("ticks");
        let mut receivers = Vec::with_capacity(subscribers);
        for _ in 0..subscribers {
            let (endpoint, events) = ChannelEndpoint::new();
            let subscribe = RoutedMessage::new(
                Envelope::request(commands::SUBSCRIBE_TO_CHANNEL)
                    .with_channel("ticks")
                    .with_source(endpoint.id()),
                Arc::clone(&endpoint) as Arc<dyn Endpoint>,
            );
            channel.add_subscriber(&subscribe).unwrap();
            receivers.push(events);
        }

        let broadcast = RoutedMessage::internal(
            Envelope::update(commands::PUBLISH_MESSAGE)
                .with_channel("ticks")
                .with_payload("tick 42"),
        );

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| {
                    rt.block_on(channel.publish(black_box(&broadcast))).unwrap();
                    for events in &mut receivers {
                        drain(events);
                    }
                })
            },
        );
    }
    group.finish();
}

fn bench_correlation(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let pending: PendingResponses<u32> = PendingResponses::new(Duration::from_secs(30));
    c.bench_function("correlation/blocking_round_trip", |b| {
        b.iter(|| {
            let id = CorrelationId::new();
            pending.register(id);
            pending.complete(id, 7);
            rt.block_on(pending.wait_for(id)).unwrap()
        })
    });

    let callbacks = ResponseCallbacks::new(Duration::from_secs(30));
    c.bench_function("correlation/callback_round_trip", |b| {
        b.iter(|| {
            let id = CorrelationId::new();
            callbacks.register(id, ResponseHandlers::ignored());
            callbacks.resolve(id, true, None)
        })
    });
}

criterion_group!(
    name = routing_benches;
    config = Criterion::default()
        .sample_size(100)
        .measurement_time(std::time::Duration::from_secs(5));
    targets =
        bench_envelope_codec,
        bench_dispatch,
        bench_publish_fanout,
        bench_correlation,
);

criterion_main!(routing_benches);
