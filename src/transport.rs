pub mod telegram;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::TransportError;
use crate::model::UserId;

/// An inbound chat message, as delivered by the transport's update loop.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub user_id: UserId,
    pub text: String,
}

/// Outbound side of the chat transport.
///
/// `options` carries one-tap reply choices: `Some` renders them as a
/// selectable keyboard, `None` removes any keyboard shown earlier.
pub trait ChatTransport: Send + Sync {
    fn send(
        &self,
        user_id: UserId,
        text: &str,
        options: Option<&[String]>,
    ) -> BoxFuture<'_, Result<(), Report<TransportError>>>;
}
