use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::{Direction, NewAlert, UserAlert, UserId};
use crate::prices::PriceSource;
use crate::storage::AlertStore;
use crate::transport::{ChatTransport, InboundMessage};

const WELCOME_TEXT: &str = "Welcome! Use /coin_limits to set up a new price alert.";
const SELECT_COIN_PROMPT: &str = "Please select a coin:";
const COIN_LIST_UNAVAILABLE: &str =
    "The coin list is unavailable right now. Please try again later.";
const TARGET_PROMPT: &str = "Please enter the target price:";
const INVALID_NUMBER: &str = "Please enter a valid number for the target price.";
const NON_POSITIVE_NUMBER: &str = "Please enter a positive number for the target price.";
const DIRECTION_PROMPT: &str =
    "When should I notify you? When the price is higher or lower than the target?";
const INVALID_DIRECTION: &str = "Please choose either 'Higher' or 'Lower'.";
const COMMIT_FAILED: &str = "Could not save your alert right now. Please try again.";
const STORAGE_UNAVAILABLE: &str = "Something went wrong. Please try again.";
const NO_ALERTS: &str = "You don't have any active alerts.";
const SETUP_CANCELLED: &str = "Alert setup cancelled.";
const CANCEL_USAGE: &str = "Nothing to cancel. Use /cancel <coin> to remove alerts for a coin.";

/// Per-user progress through the alert-creation dialogue. Absence from the
/// session map is the idle state. Held in memory only; a restart simply
/// restarts the dialogue.
#[derive(Debug, Clone, PartialEq)]
enum Session {
    SelectingCoin,
    SettingTarget { coin: String },
    ChoosingDirection { coin: String, target_price: f64 },
}

/// The conversational state machine.
///
/// One engine instance serves all users; messages are processed one at a
/// time (the inbound channel serializes them), so sessions need no locking.
pub struct Engine {
    store: Arc<dyn AlertStore>,
    prices: Arc<dyn PriceSource>,
    transport: Arc<dyn ChatTransport>,
    top_coins: usize,
    sessions: HashMap<UserId, Session>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn AlertStore>,
        prices: Arc<dyn PriceSource>,
        transport: Arc<dyn ChatTransport>,
        top_coins: usize,
    ) -> Self {
        Self {
            store,
            prices,
            transport,
            top_coins,
            sessions: HashMap::new(),
        }
    }

    /// Consume inbound messages until the channel closes or `cancel` fires.
    pub async fn run(mut self, mut rx: mpsc::Receiver<InboundMessage>, cancel: CancellationToken) {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("conversation engine cancelled");
                    break;
                }
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.handle_message(message.user_id, &message.text).await;
        }
        info!("conversation engine stopped");
    }

    /// Advance one user's dialogue with one inbound message.
    pub async fn handle_message(&mut self, user_id: UserId, text: &str) {
        let text = text.trim();

        // Commands take priority over any in-progress dialogue
        if let Some((command, arg)) = parse_command(text) {
            match command.as_str() {
                "/start" | "/help" => self.reply(user_id, WELCOME_TEXT, None).await,
                "/coin_limits" => self.start_dialogue(user_id).await,
                "/my_alerts" => self.show_my_alerts(user_id).await,
                "/cancel" => self.cancel(user_id, arg).await,
                other => debug!(user_id, command = other, "unknown command ignored"),
            }
            return;
        }

        match self.sessions.get(&user_id).cloned() {
            Some(Session::SelectingCoin) => self.process_coin(user_id, text).await,
            Some(Session::SettingTarget { coin }) => {
                self.process_target(user_id, &coin, text).await;
            }
            Some(Session::ChoosingDirection { coin, target_price }) => {
                self.process_direction(user_id, &coin, target_price, text)
                    .await;
            }
            // Free text outside a dialogue is ignored
            None => debug!(user_id, "message outside dialogue ignored"),
        }
    }

    async fn start_dialogue(&mut self, user_id: UserId) {
        let coins = self.prices.top_coins(self.top_coins).await;
        if coins.is_empty() {
            self.reply(user_id, COIN_LIST_UNAVAILABLE, None).await;
            return;
        }

        let options: Vec<String> = coins.into_iter().map(|c| c.id).collect();
        self.sessions.insert(user_id, Session::SelectingCoin);
        self.reply(user_id, SELECT_COIN_PROMPT, Some(&options)).await;
    }

    async fn process_coin(&mut self, user_id: UserId, text: &str) {
        let coin = text.to_lowercase();
        self.sessions
            .insert(user_id, Session::SettingTarget { coin });
        self.reply(user_id, TARGET_PROMPT, None).await;
    }

    async fn process_target(&mut self, user_id: UserId, coin: &str, text: &str) {
        let Ok(target_price) = text.parse::<f64>() else {
            self.reply(user_id, INVALID_NUMBER, None).await;
            return;
        };
        if !target_price.is_finite() || target_price <= 0.0 {
            self.reply(user_id, NON_POSITIVE_NUMBER, None).await;
            return;
        }

        self.sessions.insert(
            user_id,
            Session::ChoosingDirection {
                coin: coin.to_string(),
                target_price,
            },
        );
        let options = vec!["Higher".to_string(), "Lower".to_string()];
        self.reply(user_id, DIRECTION_PROMPT, Some(&options)).await;
    }

    async fn process_direction(
        &mut self,
        user_id: UserId,
        coin: &str,
        target_price: f64,
        text: &str,
    ) {
        let Some(direction) = Direction::from_input(text) else {
            self.reply(user_id, INVALID_DIRECTION, None).await;
            return;
        };

        let new_alert = NewAlert {
            user_id,
            coin: coin.to_string(),
            target_price,
            direction,
        };

        // The session is kept on failure so the user can retry by resending
        // the direction.
        if let Err(e) = self.store.insert(&new_alert).await {
            warn!(error = ?e, user_id, "alert commit failed");
            self.reply(user_id, COMMIT_FAILED, None).await;
            return;
        }

        self.sessions.remove(&user_id);
        let confirmation = format!(
            "Alert set successfully!\nCoin: {}\nTarget Price: ${}\nAlert Type: {}",
            coin, target_price, direction
        );
        self.reply(user_id, &confirmation, None).await;
        info!(user_id, coin, target_price, direction = %direction, "alert created");
    }

    async fn show_my_alerts(&mut self, user_id: UserId) {
        let alerts = match self.store.list_for_user(user_id).await {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!(error = ?e, user_id, "failed to list alerts");
                self.reply(user_id, STORAGE_UNAVAILABLE, None).await;
                return;
            }
        };

        if alerts.is_empty() {
            self.reply(user_id, NO_ALERTS, None).await;
            return;
        }

        let mut response = String::from("Your active alerts:\n\n");
        for alert in &alerts {
            let price = self.prices.current_price(&alert.coin).await;
            response.push_str(&render_alert(alert, price));
        }
        self.reply(user_id, &response, None).await;
    }

    async fn cancel(&mut self, user_id: UserId, arg: Option<String>) {
        if let Some(coin) = arg {
            let coin = coin.to_lowercase();
            match self.store.remove(user_id, &coin).await {
                Ok(0) => {
                    let text = format!("You have no alerts for {}.", coin);
                    self.reply(user_id, &text, None).await;
                }
                Ok(removed) => {
                    let text = format!("Removed {} alert(s) for {}.", removed, coin);
                    self.reply(user_id, &text, None).await;
                }
                Err(e) => {
                    warn!(error = ?e, user_id, coin, "alert removal failed");
                    self.reply(user_id, STORAGE_UNAVAILABLE, None).await;
                }
            }
            return;
        }

        if self.sessions.remove(&user_id).is_some() {
            self.reply(user_id, SETUP_CANCELLED, None).await;
        } else {
            self.reply(user_id, CANCEL_USAGE, None).await;
        }
    }

    async fn reply(&self, user_id: UserId, text: &str, options: Option<&[String]>) {
        if let Err(e) = self.transport.send(user_id, text, options).await {
            warn!(error = ?e, user_id, "failed to send reply");
        }
    }
}

/// Split a leading bot command from its argument, stripping the optional
/// `@botname` mention suffix Telegram appends in group chats.
fn parse_command(text: &str) -> Option<(String, Option<String>)> {
    if !text.starts_with('/') {
        return None;
    }
    let mut parts = text.splitn(2, char::is_whitespace);
    let command = parts.next()?;
    let command = command.split('@').next().unwrap_or(command).to_string();
    let arg = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Some((command, arg))
}

fn render_alert(alert: &UserAlert, price: Option<f64>) -> String {
    match price {
        Some(price) => {
            let diff = (price - alert.target_price).abs();
            let pct = diff / alert.target_price * 100.0;
            format!(
                "🪙 Coin: {}\n🎯 Target: ${:.2}\n📊 Current: ${:.2}\n📈 Alert type: {}\n📉 Difference: ${:.2} ({:.2}%)\n\n",
                alert.coin.to_uppercase(),
                alert.target_price,
                price,
                alert.direction,
                diff,
                pct,
            )
        }
        None => format!(
            "🪙 Coin: {}\n🎯 Target: ${:.2}\n📈 Alert type: {}\n❗ Current price unavailable\n\n",
            alert.coin.to_uppercase(),
            alert.target_price,
            alert.direction,
        ),
    }
}
