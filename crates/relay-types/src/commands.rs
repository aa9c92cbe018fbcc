//! The frozen command vocabulary.
//!
//! Command names are case-sensitive wire constants. Renaming one is a
//! protocol break, so every crate refers to these constants instead of
//! spelling the strings out.

use crate::envelope::MessageKind;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Subscribe the sender to a channel's broadcasts.
pub const SUBSCRIBE_TO_CHANNEL: &str = "SUBSCRIBETOCHANNEL";
/// Remove the sender's subscription from a channel.
pub const REMOVE_SUBSCRIPTION: &str = "REMOVESUBSCRIPTION";
/// Deliver a payload to one named endpoint on a channel.
pub const SEND_MESSAGE: &str = "SENDMESSAGE";
/// Install the sender as a channel's primary listener.
pub const ADD_LISTENER: &str = "ADDLISTENER";
/// Route a request to a channel's primary listener.
pub const SEND_REQUEST: &str = "SENDREQUEST";
/// Broadcast a payload to every subscriber of a channel.
pub const PUBLISH_MESSAGE: &str = "PUBLISHMESSAGE";
/// Authenticate the sending connection.
pub const LOGIN: &str = "DOLOGIN";
/// Register the sending connection as the upstream authenticator.
pub const REGISTER_AUTH: &str = "REGISTER_AUTH";
/// Tell the upstream authenticator that an endpoint went away.
pub const NOTIFY_CLOSE: &str = "NOTIFY_CLOSE";

/// Which side of the broker handles a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandDomain {
    /// Routed through the channel registry.
    Channel,
    /// Handled by the authentication machinery.
    Auth,
}

/// Metadata for one wire command.
#[derive(Debug, Clone)]
pub struct CommandInfo {
    /// Exact case-sensitive wire name.
    pub name: &'static str,
    /// Which side of the broker handles it.
    pub domain: CommandDomain,
    /// The envelope kind a caller issues it with. Requests receive exactly
    /// one terminal response; updates are never acknowledged.
    pub kind: MessageKind,
    pub description: &'static str,
}

impl CommandInfo {
    const fn new(
        name: &'static str,
        domain: CommandDomain,
        kind: MessageKind,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            domain,
            kind,
            description,
        }
    }
}

/// Registry of every command the broker understands.
pub static COMMAND_REGISTRY: LazyLock<HashMap<&'static str, CommandInfo>> = LazyLock::new(|| {
    let commands = [
        CommandInfo::new(
            SUBSCRIBE_TO_CHANNEL,
            CommandDomain::Channel,
            MessageKind::Request,
            "subscribe the sender to channel broadcasts",
        ),
        CommandInfo::new(
            REMOVE_SUBSCRIPTION,
            CommandDomain::Channel,
            MessageKind::Request,
            "remove the sender's channel subscription",
        ),
        CommandInfo::new(
            SEND_MESSAGE,
            CommandDomain::Channel,
            MessageKind::Update,
            "deliver a payload to one endpoint on the channel",
        ),
        CommandInfo::new(
            ADD_LISTENER,
            CommandDomain::Channel,
            MessageKind::Request,
            "install the sender as the channel's primary listener",
        ),
        CommandInfo::new(
            SEND_REQUEST,
            CommandDomain::Channel,
            MessageKind::Request,
            "route a request to the channel's primary listener",
        ),
        CommandInfo::new(
            PUBLISH_MESSAGE,
            CommandDomain::Channel,
            MessageKind::Update,
            "broadcast a payload to every channel subscriber",
        ),
        CommandInfo::new(
            LOGIN,
            CommandDomain::Auth,
            MessageKind::Request,
            "authenticate the sending connection",
        ),
        CommandInfo::new(
            REGISTER_AUTH,
            CommandDomain::Auth,
            MessageKind::Request,
            "register the sender as the upstream authenticator",
        ),
        CommandInfo::new(
            NOTIFY_CLOSE,
            CommandDomain::Auth,
            MessageKind::Request,
            "notify the upstream authenticator of a closed endpoint",
        ),
    ];

    let mut registry = HashMap::with_capacity(commands.len());
    for command in commands {
        registry.insert(command.name, command);
    }
    registry
});

/// Look up the metadata for a command name. Case-sensitive.
pub fn command_info(name: &str) -> Option<&'static CommandInfo> {
    COMMAND_REGISTRY.get(name)
}

/// Whether the broker understands a command name. Case-sensitive.
pub fn is_known_command(name: &str) -> bool {
    COMMAND_REGISTRY.contains_key(name)
}
