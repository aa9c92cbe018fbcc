//! The channel registry and its single-writer worker.
//!
//! Every channel mutation funnels through one task. Submission never
//! blocks the caller; execution is strictly one operation at a time in
//! submission order, which keeps the channel maps free of locks and keeps
//! operations from one connection in order.

use crate::channel::Channel;
use crate::endpoint::RoutedMessage;
use crate::error::RoutingError;
use crate::stats::StatsSink;
use relay_types::EndpointId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A channel operation the worker knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOp {
    Subscribe,
    Unsubscribe,
    SendMessage,
    AddListener,
    SendRequest,
    Publish,
}

impl ChannelOp {
    pub const fn name(self) -> &'static str {
        match self {
            ChannelOp::Subscribe => "subscribe",
            ChannelOp::Unsubscribe => "unsubscribe",
            ChannelOp::SendMessage => "send_message",
            ChannelOp::AddListener => "add_listener",
            ChannelOp::SendRequest => "send_request",
            ChannelOp::Publish => "publish",
        }
    }
}

enum RegistryCommand {
    Execute { op: ChannelOp, message: RoutedMessage },
    RemoveEndpoint { id: EndpointId },
}

/// Cloneable handle to the registry worker.
///
/// Dropping every handle shuts the worker down once its queue drains.
#[derive(Clone)]
pub struct ChannelRegistry {
    commands: mpsc::UnboundedSender<RegistryCommand>,
}

impl ChannelRegistry {
    /// Spawn the worker and hand back its handle.
    pub fn start(stats: Arc<dyn StatsSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(rx, stats));
        Self { commands: tx }
    }

    /// Queue a channel operation. The outcome reaches the message's source
    /// endpoint as an acknowledgement, not the caller.
    pub fn submit(&self, op: ChannelOp, message: RoutedMessage) -> bool {
        self.commands
            .send(RegistryCommand::Execute { op, message })
            .is_ok()
    }

    /// Queue removal of a departed endpoint from every channel.
    pub fn remove_endpoint(&self, id: EndpointId) -> bool {
        self.commands
            .send(RegistryCommand::RemoveEndpoint { id })
            .is_ok()
    }
}

async fn run_worker(
    mut commands: mpsc::UnboundedReceiver<RegistryCommand>,
    stats: Arc<dyn StatsSink>,
) {
    let mut channels: HashMap<String, Channel> = HashMap::new();
    info!("Channel registry worker started");

    while let Some(command) = commands.recv().await {
        match command {
            RegistryCommand::Execute { op, message } => {
                execute(&mut channels, op, message, stats.as_ref()).await;
            }
            RegistryCommand::RemoveEndpoint { id } => {
                for channel in channels.values_mut() {
                    channel.remove_endpoint(id);
                }
                debug!(endpoint = %id, "Endpoint removed from all channels");
            }
        }
    }

    info!("Channel registry worker stopped");
}

async fn execute(
    channels: &mut HashMap<String, Channel>,
    op: ChannelOp,
    message: RoutedMessage,
    stats: &dyn StatsSink,
) {
    match run_op(channels, op, &message).await {
        Ok(()) => {
            stats.update_channel_stats(&message.envelope);
            if let Some(source) = &message.source {
                source.notify_success(&message.envelope).await;
            }
        }
        Err(error) => {
            warn!(
                op = op.name(),
                channel = message.envelope.channel.as_deref().unwrap_or(""),
                error = %error,
                "Channel operation failed"
            );
            if let Some(source) = &message.source {
                source.notify_error(&message.envelope, &error.to_string()).await;
            }
        }
    }
}

async fn run_op(
    channels: &mut HashMap<String, Channel>,
    op: ChannelOp,
    message: &RoutedMessage,
) -> Result<(), RoutingError> {
    let name = message.envelope.channel.as_deref().unwrap_or("");
    if name.is_empty() {
        return Err(RoutingError::EmptyChannelName);
    }

    let channel = channels.entry(name.to_string()).or_insert_with(|| {
        debug!(channel = name, "Creating channel");
        Channel::new(name)
    });

    match op {
        ChannelOp::Subscribe => channel.add_subscriber(message),
        ChannelOp::Unsubscribe => channel.remove_subscriber(message),
        ChannelOp::SendMessage => channel.send_message(message).await,
        ChannelOp::AddListener => channel.set_primary_listener(message),
        ChannelOp::SendRequest => channel.send_request(message).await,
        ChannelOp::Publish => channel.publish(message).await,
    }
}
