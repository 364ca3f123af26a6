use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::model::UserId;
use crate::transport::{ChatTransport, InboundMessage};

const TELEGRAM_BASE_URL: &str = "https://api.telegram.org";
/// Server-side long-poll window for getUpdates.
const LONG_POLL_SECS: u64 = 30;
const MAX_BACKOFF_SECS: u64 = 60;

/// Thin Telegram Bot API adapter: `sendMessage` for the outbound side and a
/// `getUpdates` long-poll loop for the inbound side.
pub struct TelegramTransport {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramTransport {
    pub fn new(token: &str) -> Result<Self, Report<TransportError>> {
        Self::with_base_url(TELEGRAM_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self, Report<TransportError>> {
        // The client timeout must outlast the long-poll window
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .build()
            .change_context(TransportError::Request)?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", base_url.trim_end_matches('/'), token),
        })
    }

    /// Long-poll `getUpdates` and forward every text message into `tx`
    /// until `cancel` is triggered or the receiver is dropped.
    pub async fn poll_updates(
        &self,
        tx: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> Result<(), Report<TransportError>> {
        let mut offset: i64 = 0;
        let mut backoff = Duration::from_secs(1);

        info!("telegram update loop started");

        loop {
            let updates = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("telegram update loop cancelled");
                    break;
                }
                result = self.get_updates(offset) => result,
            };

            let updates = match updates {
                Ok(updates) => {
                    backoff = Duration::from_secs(1);
                    updates
                }
                Err(e) => {
                    warn!(error = ?e, "getUpdates failed, retrying...");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(MAX_BACKOFF_SECS));
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);

                let Some(message) = update.message else {
                    continue;
                };
                let Some(text) = message.text else {
                    continue;
                };

                let inbound = InboundMessage {
                    user_id: message.chat.id,
                    text,
                };
                if tx.send(inbound).await.is_err() {
                    debug!("inbound receiver dropped, stopping update loop");
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, Report<TransportError>> {
        let url = format!("{}/getUpdates", self.base_url);
        let request = GetUpdatesRequest {
            offset,
            timeout: LONG_POLL_SECS,
            allowed_updates: &["message"],
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .change_context(TransportError::Request)?;

        let envelope: ApiResponse<Vec<Update>> = response
            .json()
            .await
            .change_context(TransportError::ResponseParse)?;

        envelope.into_result()
    }
}

impl ChatTransport for TelegramTransport {
    fn send(
        &self,
        user_id: UserId,
        text: &str,
        options: Option<&[String]>,
    ) -> BoxFuture<'_, Result<(), Report<TransportError>>> {
        let request = SendMessageRequest {
            chat_id: user_id,
            text: text.to_owned(),
            reply_markup: match options {
                Some(options) => ReplyMarkup::keyboard(options),
                None => ReplyMarkup::remove(),
            },
        };

        Box::pin(async move {
            let url = format!("{}/sendMessage", self.base_url);
            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .change_context(TransportError::Request)?;

            let envelope: ApiResponse<serde_json::Value> = response
                .json()
                .await
                .change_context(TransportError::ResponseParse)?;

            envelope.into_result()?;
            Ok(())
        })
    }
}

#[derive(Serialize)]
struct GetUpdatesRequest<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Serialize)]
struct SendMessageRequest {
    chat_id: UserId,
    text: String,
    reply_markup: ReplyMarkup,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ReplyMarkup {
    Keyboard {
        keyboard: Vec<Vec<KeyboardButton>>,
        resize_keyboard: bool,
        one_time_keyboard: bool,
    },
    Remove {
        remove_keyboard: bool,
    },
}

impl ReplyMarkup {
    fn keyboard(options: &[String]) -> Self {
        Self::Keyboard {
            keyboard: options
                .iter()
                .map(|text| vec![KeyboardButton { text: text.clone() }])
                .collect(),
            resize_keyboard: true,
            one_time_keyboard: true,
        }
    }

    fn remove() -> Self {
        Self::Remove {
            remove_keyboard: true,
        }
    }
}

#[derive(Serialize)]
struct KeyboardButton {
    text: String,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, Report<TransportError>> {
        if !self.ok {
            return Err(Report::new(TransportError::Api {
                description: self
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }));
        }
        self.result.ok_or_else(|| {
            Report::new(TransportError::ResponseParse).attach("ok response without result field")
        })
    }
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}
