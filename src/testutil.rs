//! In-memory test doubles for the store, price source, and chat transport.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use chrono::Utc;
use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::{StorageError, TransportError};
use crate::model::{Alert, CoinMarket, NewAlert, UserAlert, UserId};
use crate::prices::PriceSource;
use crate::storage::AlertStore;
use crate::transport::ChatTransport;

#[derive(Default)]
pub struct MemoryStore {
    alerts: Mutex<Vec<Alert>>,
    next_id: AtomicI64,
    pub fail_inserts: AtomicBool,
    pub fail_removes: AtomicBool,
    pub fail_lists: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertStore for MemoryStore {
    fn insert(&self, alert: &NewAlert) -> BoxFuture<'_, Result<Alert, Report<StorageError>>> {
        let alert = alert.clone();
        Box::pin(async move {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(Report::new(StorageError::Insert));
            }
            let stored = Alert {
                id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                user_id: alert.user_id,
                coin: alert.coin,
                target_price: alert.target_price,
                direction: alert.direction,
                created_at: Utc::now(),
            };
            self.alerts.lock().unwrap().push(stored.clone());
            Ok(stored)
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Alert>, Report<StorageError>>> {
        Box::pin(async move {
            if self.fail_lists.load(Ordering::SeqCst) {
                return Err(Report::new(StorageError::Query));
            }
            Ok(self.alerts())
        })
    }

    fn list_for_user(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'_, Result<Vec<UserAlert>, Report<StorageError>>> {
        Box::pin(async move {
            if self.fail_lists.load(Ordering::SeqCst) {
                return Err(Report::new(StorageError::Query));
            }
            Ok(self
                .alerts()
                .into_iter()
                .filter(|a| a.user_id == user_id)
                .map(|a| UserAlert {
                    coin: a.coin,
                    target_price: a.target_price,
                    direction: a.direction,
                })
                .collect())
        })
    }

    fn remove_by_id(&self, id: i64) -> BoxFuture<'_, Result<bool, Report<StorageError>>> {
        Box::pin(async move {
            if self.fail_removes.load(Ordering::SeqCst) {
                return Err(Report::new(StorageError::Delete));
            }
            let mut alerts = self.alerts.lock().unwrap();
            let before = alerts.len();
            alerts.retain(|a| a.id != id);
            Ok(alerts.len() < before)
        })
    }

    fn remove(
        &self,
        user_id: UserId,
        coin: &str,
    ) -> BoxFuture<'_, Result<u64, Report<StorageError>>> {
        let coin = coin.to_string();
        Box::pin(async move {
            if self.fail_removes.load(Ordering::SeqCst) {
                return Err(Report::new(StorageError::Delete));
            }
            let mut alerts = self.alerts.lock().unwrap();
            let before = alerts.len();
            alerts.retain(|a| !(a.user_id == user_id && a.coin == coin));
            Ok((before - alerts.len()) as u64)
        })
    }
}

#[derive(Default)]
pub struct StaticPrices {
    prices: Mutex<HashMap<String, f64>>,
    top: Mutex<Vec<CoinMarket>>,
}

impl StaticPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, coin: &str, price: f64) {
        self.prices.lock().unwrap().insert(coin.to_string(), price);
    }

    pub fn set_top(&self, ids: &[&str]) {
        let coins = ids
            .iter()
            .map(|id| CoinMarket {
                id: id.to_string(),
                symbol: id.chars().take(3).collect(),
                name: id.to_string(),
                current_price: Some(1.0),
                market_cap: None,
                market_cap_rank: None,
                price_change_percentage_24h: None,
            })
            .collect();
        *self.top.lock().unwrap() = coins;
    }
}

impl PriceSource for StaticPrices {
    fn current_price(&self, coin_id: &str) -> BoxFuture<'_, Option<f64>> {
        let price = self.prices.lock().unwrap().get(coin_id).copied();
        Box::pin(async move { price })
    }

    fn top_coins(&self, limit: usize) -> BoxFuture<'_, Vec<CoinMarket>> {
        let coins: Vec<CoinMarket> = self
            .top
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .cloned()
            .collect();
        Box::pin(async move { coins })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub user_id: UserId,
    pub text: String,
    pub options: Option<Vec<String>>,
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    pub fail_sends: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> SentMessage {
        self.sent.lock().unwrap().last().cloned().expect("no messages sent")
    }
}

impl ChatTransport for RecordingTransport {
    fn send(
        &self,
        user_id: UserId,
        text: &str,
        options: Option<&[String]>,
    ) -> BoxFuture<'_, Result<(), Report<TransportError>>> {
        let message = SentMessage {
            user_id,
            text: text.to_string(),
            options: options.map(|o| o.to_vec()),
        };
        Box::pin(async move {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(Report::new(TransportError::Request));
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        })
    }
}
