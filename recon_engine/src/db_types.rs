use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use recon_common::Amount;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

//--------------------------------------        EntryId        ---------------------------------------------------------
/// The exchange-assigned identifier of a ledger entry (the exchange calls it a bill id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl EntryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        OrderId        ---------------------------------------------------------
/// The caller-assigned identifier of a payment order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            Err(ConversionError("An order id cannot be empty".into()))
        } else {
            Ok(Self(s.to_string()))
        }
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       EntryKind       ---------------------------------------------------------
/// The kind of balance change a ledger entry records.
///
/// Only [`EntryKind::Transfer`] can pay for an order. Every other kind is listed explicitly so that adding a new kind
/// forces a decision about whether it is payable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Funds moved into or out of the account.
    Transfer,
    /// Spot or derivatives trade settlement.
    Trade,
    /// Futures delivery or exercise.
    Delivery,
    /// Forced liquidation or auto-deleveraging.
    Liquidation,
    /// Borrowing interest, charged or received.
    Interest,
    /// Perpetual swap funding.
    FundingFee,
    /// Any other fee.
    Fee,
    /// A balance change the engine does not model individually.
    Other,
}

impl EntryKind {
    /// Whether an entry of this kind can settle a payment order.
    pub fn is_payment_kind(&self) -> bool {
        match self {
            EntryKind::Transfer => true,
            EntryKind::Trade |
            EntryKind::Delivery |
            EntryKind::Liquidation |
            EntryKind::Interest |
            EntryKind::FundingFee |
            EntryKind::Fee |
            EntryKind::Other => false,
        }
    }
}

impl Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryKind::Transfer => "transfer",
            EntryKind::Trade => "trade",
            EntryKind::Delivery => "delivery",
            EntryKind::Liquidation => "liquidation",
            EntryKind::Interest => "interest",
            EntryKind::FundingFee => "funding_fee",
            EntryKind::Fee => "fee",
            EntryKind::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for EntryKind {
    type Err = ConversionError;

    /// Accepts the kind names used by this crate as well as the exchange's numeric bill type codes. Numeric codes
    /// without a dedicated kind map to [`EntryKind::Other`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "transfer" | "1" => Ok(Self::Transfer),
            "trade" | "2" => Ok(Self::Trade),
            "delivery" | "3" => Ok(Self::Delivery),
            "liquidation" | "5" | "9" => Ok(Self::Liquidation),
            "interest" | "7" | "20" | "21" => Ok(Self::Interest),
            "funding_fee" | "8" => Ok(Self::FundingFee),
            "fee" => Ok(Self::Fee),
            "other" => Ok(Self::Other),
            code if !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()) => Ok(Self::Other),
            _ => Err(ConversionError(format!("Invalid ledger entry kind: {s}"))),
        }
    }
}

//--------------------------------------      MatchState       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    Unmatched,
    /// Terminal. A matched entry never reverts.
    Matched,
}

impl Display for MatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchState::Unmatched => write!(f, "unmatched"),
            MatchState::Matched => write!(f, "matched"),
        }
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// The order is open and waiting for a matching transfer.
    Pending,
    /// A ledger entry has been matched to the order.
    Matched,
    /// The order deadline passed without a match.
    Expired,
    /// The order was cancelled by the business system or an operator.
    Cancelled,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatusType::Pending)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "pending"),
            OrderStatusType::Matched => write!(f, "matched"),
            OrderStatusType::Expired => write!(f, "expired"),
            OrderStatusType::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "matched" => Ok(Self::Matched),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------    CallbackStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    NotAttempted,
    Delivered,
    /// Every delivery attempt failed. Requires manual follow-up.
    Failed,
}

impl Display for CallbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackStatus::NotAttempted => write!(f, "not_attempted"),
            CallbackStatus::Delivered => write!(f, "delivered"),
            CallbackStatus::Failed => write!(f, "failed"),
        }
    }
}

//--------------------------------------      LedgerEntry      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub entry_id: EntryId,
    /// The signed balance change
    pub amount: Amount,
    pub currency: String,
    /// The account balance after this entry was applied
    pub balance: Amount,
    pub kind: EntryKind,
    /// When the exchange says the entry happened
    pub occurred_at: DateTime<Utc>,
    /// When the poller first saw the entry
    pub observed_at: DateTime<Utc>,
    pub match_state: MatchState,
    pub matched_order_id: Option<OrderId>,
    pub matched_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// An entry can pay for an order if it is an incoming transfer that has not been matched yet.
    pub fn is_payment_candidate(&self) -> bool {
        self.match_state == MatchState::Unmatched && self.kind.is_payment_kind() && self.amount.is_positive()
    }
}

//--------------------------------------    NewLedgerEntry     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub entry_id: EntryId,
    pub amount: Amount,
    pub currency: String,
    pub balance: Amount,
    pub kind: EntryKind,
    pub occurred_at: DateTime<Utc>,
    pub observed_at: DateTime<Utc>,
}

impl NewLedgerEntry {
    pub fn new(entry_id: EntryId, amount: Amount, currency: &str, occurred_at: DateTime<Utc>) -> Self {
        Self {
            entry_id,
            amount,
            currency: currency.to_ascii_uppercase(),
            balance: Amount::default(),
            kind: EntryKind::Transfer,
            occurred_at,
            observed_at: Utc::now(),
        }
    }

    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_balance(mut self, balance: Amount) -> Self {
        self.balance = balance;
        self
    }

    pub fn observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }
}

//--------------------------------------     PaymentOrder      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct PaymentOrder {
    pub id: i64,
    pub order_id: OrderId,
    pub amount: Amount,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
    pub status: OrderStatusType,
    pub matched_entry_id: Option<EntryId>,
    /// What the matched entry actually paid. Differs from `amount` when the match used a tolerance.
    pub matched_amount: Option<Amount>,
    pub matched_at: Option<DateTime<Utc>>,
    pub callback_url: String,
    pub callback_status: CallbackStatus,
    /// Snapshot of the last callback response body, or the last delivery error
    pub callback_response: Option<String>,
    pub callback_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    NewPaymentOrder    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentOrder {
    pub order_id: OrderId,
    pub amount: Amount,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
    pub callback_url: String,
}

//--------------------------------------    CallbackRecord     ---------------------------------------------------------
/// The delivery bookkeeping written to an order after the notifier has finished with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRecord {
    pub status: CallbackStatus,
    pub response: String,
    pub recorded_at: DateTime<Utc>,
}
