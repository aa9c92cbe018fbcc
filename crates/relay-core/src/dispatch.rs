//! Ordered command dispatch.
//!
//! Commands match by exact, case-sensitive name in registration order. A
//! miss is reported to the caller instead of being answered here, so the
//! endpoint gate can phrase the rejection.

use crate::endpoint::RoutedMessage;
use crate::registry::{ChannelOp, ChannelRegistry};
use async_trait::async_trait;
use parking_lot::RwLock;
use relay_types::{commands, EndpointId};
use std::sync::Arc;
use tracing::{debug, trace};

/// One executable command behind a dispatcher match.
#[async_trait]
pub trait CommandAction: Send + Sync {
    /// Run the command for a matched message.
    async fn execute(&self, message: RoutedMessage);

    /// Observe an endpoint leaving. Most commands have nothing to clean up.
    async fn endpoint_closed(&self, _id: EndpointId) {}
}

/// Ordered command table.
pub struct Dispatcher {
    links: RwLock<Vec<(String, Arc<dyn CommandAction>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            links: RwLock::new(Vec::new()),
        }
    }

    /// Append a command at the end of the match order.
    pub fn add_handler(&self, command: impl Into<String>, action: Arc<dyn CommandAction>) {
        self.links.write().push((command.into(), action));
    }

    /// Route a message to the first matching command.
    ///
    /// Returns false when the message names no command, or one that no
    /// link matches.
    pub async fn process_message(&self, message: RoutedMessage) -> bool {
        let Some(command) = message
            .envelope
            .command
            .clone()
            .filter(|command| !command.is_empty())
        else {
            debug!("Message without a command");
            return false;
        };

        let action = {
            let links = self.links.read();
            links
                .iter()
                .find(|(name, _)| *name == command)
                .map(|(_, action)| Arc::clone(action))
        };

        match action {
            Some(action) => {
                trace!(command = %command, "Dispatching command");
                action.execute(message).await;
                true
            }
            None => {
                debug!(command = %command, "No handler for command");
                false
            }
        }
    }

    /// Tell every link that an endpoint went away, regardless of matching.
    pub async fn endpoint_closed(&self, id: EndpointId) {
        let actions: Vec<Arc<dyn CommandAction>> = self
            .links
            .read()
            .iter()
            .map(|(_, action)| Arc::clone(action))
            .collect();
        for action in actions {
            action.endpoint_closed(id).await;
        }
    }

    pub fn handler_count(&self) -> usize {
        self.links.read().len()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridges one wire command to a queued channel operation.
struct ChannelAction {
    op: ChannelOp,
    registry: ChannelRegistry,
}

#[async_trait]
impl CommandAction for ChannelAction {
    async fn execute(&self, message: RoutedMessage) {
        self.registry.submit(self.op, message);
    }

    async fn endpoint_closed(&self, id: EndpointId) {
        self.registry.remove_endpoint(id);
    }
}

/// The endpoint listener's stock command chain, in match order.
pub fn channel_command_chain(registry: ChannelRegistry) -> Arc<Dispatcher> {
    let dispatcher = Dispatcher::new();
    let pairs = [
        (commands::PUBLISH_MESSAGE, ChannelOp::Publish),
        (commands::SEND_MESSAGE, ChannelOp::SendMessage),
        (commands::SEND_REQUEST, ChannelOp::SendRequest),
        (commands::ADD_LISTENER, ChannelOp::AddListener),
        (commands::SUBSCRIBE_TO_CHANNEL, ChannelOp::Subscribe),
        (commands::REMOVE_SUBSCRIPTION, ChannelOp::Unsubscribe),
    ];
    for (command, op) in pairs {
        dispatcher.add_handler(
            command,
            Arc::new(ChannelAction {
                op,
                registry: registry.clone(),
            }),
        );
    }
    Arc::new(dispatcher)
}
