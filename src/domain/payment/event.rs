//! Inbound payment events and their parsed form.
//!
//! A [`PaymentEvent`] is what arrived on the wire. It is never stored as is;
//! the reconciler authenticates it, then parses it into a
//! [`PaymentNotification`].

use serde_json::{Map, Value};

use super::reference::MerchantReference;
use crate::domain::foundation::{Timestamp, ValidationError};

/// Entry point an event arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    /// Asynchronous server-to-server notification, HMAC signed.
    Webhook,

    /// Browser redirect back from the hosted payment page. Unsigned.
    RedirectCallback,
}

impl EventSource {
    /// Scope used in rate-limit keys.
    pub fn scope(&self) -> &'static str {
        match self {
            EventSource::Webhook => "payment:webhook",
            EventSource::RedirectCallback => "payment:callback",
        }
    }
}

/// An inbound notification exactly as received.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub source: EventSource,

    /// Webhook body, or the raw query string of a redirect callback.
    pub raw_body: Vec<u8>,

    pub signature_header: Option<String>,
    pub received_at: Timestamp,
    pub client_ip: Option<String>,
}

impl PaymentEvent {
    pub fn webhook(raw_body: impl Into<Vec<u8>>, signature_header: Option<String>) -> Self {
        Self {
            source: EventSource::Webhook,
            raw_body: raw_body.into(),
            signature_header,
            received_at: Timestamp::now(),
            client_ip: None,
        }
    }

    pub fn redirect_callback(raw_query: impl Into<Vec<u8>>) -> Self {
        Self {
            source: EventSource::RedirectCallback,
            raw_body: raw_query.into(),
            signature_header: None,
            received_at: Timestamp::now(),
            client_ip: None,
        }
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// Parses the raw bytes according to the event source.
    pub fn parse(&self) -> Result<PaymentNotification, ValidationError> {
        match self.source {
            EventSource::Webhook => PaymentNotification::from_json(&self.raw_body),
            EventSource::RedirectCallback => PaymentNotification::from_query(&self.raw_body),
        }
    }
}

/// A provider notification after parsing.
///
/// Values are kept verbatim. `amount` in particular is a decimal string and
/// is never converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotification {
    pub merchant_reference_id: MerchantReference,
    pub external_id: String,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub provider_response_code: String,
    pub provider_status: String,
    pub message: Option<String>,
}

const REFERENCE_KEYS: &[&str] = &["merchantReferenceId", "merchantReference"];
const EXTERNAL_ID_KEYS: &[&str] = &["orderId", "sessionId", "externalId"];
const AMOUNT_KEYS: &[&str] = &["totalAmount", "amount"];
const CURRENCY_KEYS: &[&str] = &["currency"];
const RESPONSE_CODE_KEYS: &[&str] = &["responseCode"];
const STATUS_KEYS: &[&str] = &["detailedStatus", "status"];
const MESSAGE_KEYS: &[&str] = &["responseMessage", "detailedResponseMessage"];

impl PaymentNotification {
    /// Parses a webhook body, either flat or wrapped in an `order` envelope.
    pub fn from_json(raw_body: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(raw_body)
            .map_err(|e| ValidationError::invalid_format("body", e.to_string()))?;

        let Value::Object(mut root) = value else {
            return Err(ValidationError::invalid_format(
                "body",
                "expected a JSON object",
            ));
        };

        let fields = match root.remove("order") {
            Some(Value::Object(order)) => order,
            Some(_) => {
                return Err(ValidationError::invalid_format(
                    "order",
                    "expected a JSON object",
                ))
            }
            None => root,
        };

        Self::from_fields(&fields)
    }

    /// Parses a redirect callback query string.
    pub fn from_query(raw_query: &[u8]) -> Result<Self, ValidationError> {
        let fields: Map<String, Value> = url::form_urlencoded::parse(raw_query)
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect();

        Self::from_fields(&fields)
    }

    fn from_fields(fields: &Map<String, Value>) -> Result<Self, ValidationError> {
        let reference = pick(fields, REFERENCE_KEYS)
            .ok_or_else(|| ValidationError::empty_field("merchantReferenceId"))?;
        let merchant_reference_id = MerchantReference::new(reference)?;

        let external_id =
            pick(fields, EXTERNAL_ID_KEYS).ok_or_else(|| ValidationError::empty_field("orderId"))?;

        let provider_response_code = pick(fields, RESPONSE_CODE_KEYS)
            .or_else(|| last_transaction_code(fields))
            .unwrap_or_default();

        Ok(Self {
            merchant_reference_id,
            external_id,
            amount: pick(fields, AMOUNT_KEYS),
            currency: pick(fields, CURRENCY_KEYS),
            provider_response_code,
            provider_status: pick(fields, STATUS_KEYS).unwrap_or_default(),
            message: pick(fields, MESSAGE_KEYS),
        })
    }
}

/// Returns the first non-empty string or number stored under one of `keys`.
fn pick(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match fields.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Webhook envelopes carry the response code on the transactions instead of
/// the order.
fn last_transaction_code(fields: &Map<String, Value>) -> Option<String> {
    let transactions = fields.get("transactions")?.as_array()?;
    transactions.iter().rev().find_map(|tx| {
        let codes = tx.get("codes")?.as_object()?;
        pick(codes, RESPONSE_CODE_KEYS)
    })
}
