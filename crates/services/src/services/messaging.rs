//! Outbound email and WhatsApp messages to leads, with a per-lead history.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use db::models::{
    lead::Lead,
    message_log::{MessageChannel, MessageLog, MessageStatus, NewMessageLog},
};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::config::{EmailConfig, WhatsAppConfig};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("provider rejected the message (http {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("lead not found")]
    LeadNotFound,
    #[error("{0} channel is not configured")]
    ChannelNotConfigured(MessageChannel),
    #[error("lead has no usable {0} address")]
    NoRecipient(MessageChannel),
    #[error("{0}")]
    Validation(String),
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub recipient: String,
    pub recipient_name: String,
    pub subject: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SendMessage {
    pub channel: MessageChannel,
    pub subject: Option<String>,
    pub body: String,
}

/// A delivery provider for one channel
#[async_trait]
pub trait MessageSender: Send + Sync {
    fn channel(&self) -> MessageChannel;

    /// Returns the provider's message id when it reports one
    async fn send(&self, message: &OutboundMessage) -> Result<Option<String>, DeliveryError>;
}

/// Reduces a phone number to E.164 digits without the leading `+`.
/// French national numbers (`06 12 34 56 78`) get the 33 country code.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let international = trimmed.starts_with('+');
    let mut digits = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        match c {
            '0'..='9' => digits.push(c),
            '+' | ' ' | '.' | '-' | '(' | ')' => {}
            _ => return None,
        }
    }

    let digits = if international {
        digits
    } else if let Some(rest) = digits.strip_prefix("00") {
        rest.to_string()
    } else if digits.len() == 10 && digits.starts_with('0') {
        format!("33{}", &digits[1..])
    } else {
        digits
    };

    (8..=15).contains(&digits.len()).then_some(digits)
}

fn http_client() -> Result<Client, DeliveryError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("backoffice/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| DeliveryError::Transport(e.to_string()))
}

async fn read_response(res: reqwest::Response) -> Result<Value, DeliveryError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    res.json::<Value>()
        .await
        .map_err(|e| DeliveryError::InvalidResponse(e.to_string()))
}

/// Transactional email over an HTTP API authenticated with an `api-key` header
pub struct EmailSender {
    http: Client,
    config: EmailConfig,
}

impl EmailSender {
    pub fn new(config: EmailConfig) -> Result<Self, DeliveryError> {
        Ok(Self {
            http: http_client()?,
            config,
        })
    }

    pub fn payload(&self, message: &OutboundMessage) -> Value {
        json!({
            "sender": {
                "name": self.config.sender_name,
                "email": self.config.sender_email,
            },
            "to": [{
                "email": message.recipient,
                "name": message.recipient_name,
            }],
            "subject": message.subject.as_deref().unwrap_or_default(),
            "textContent": message.body,
        })
    }
}

#[async_trait]
impl MessageSender for EmailSender {
    fn channel(&self) -> MessageChannel {
        MessageChannel::Email
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Option<String>, DeliveryError> {
        let res = self
            .http
            .post(&self.config.api_url)
            .header("api-key", self.config.api_key.expose_secret())
            .json(&self.payload(message))
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let body = read_response(res).await?;
        Ok(body
            .get("messageId")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

/// WhatsApp Cloud API text messages
pub struct WhatsAppSender {
    http: Client,
    config: WhatsAppConfig,
}

impl WhatsAppSender {
    pub fn new(config: WhatsAppConfig) -> Result<Self, DeliveryError> {
        Ok(Self {
            http: http_client()?,
            config,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_url.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }

    pub fn payload(message: &OutboundMessage) -> Value {
        json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": message.recipient,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": message.body,
            },
        })
    }
}

#[async_trait]
impl MessageSender for WhatsAppSender {
    fn channel(&self) -> MessageChannel {
        MessageChannel::Whatsapp
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Option<String>, DeliveryError> {
        let res = self
            .http
            .post(self.messages_url())
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&Self::payload(message))
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let body = read_response(res).await?;
        Ok(body
            .pointer("/messages/0/id")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

#[derive(Clone)]
pub struct MessagingService {
    pool: SqlitePool,
    senders: Vec<Arc<dyn MessageSender>>,
}

impl MessagingService {
    pub fn new(pool: SqlitePool, senders: Vec<Arc<dyn MessageSender>>) -> Self {
        Self { pool, senders }
    }

    pub fn is_enabled(&self, channel: MessageChannel) -> bool {
        self.sender(channel).is_some()
    }

    fn sender(&self, channel: MessageChannel) -> Option<&Arc<dyn MessageSender>> {
        self.senders.iter().find(|s| s.channel() == channel)
    }

    /// Sends the message and records the attempt. A failed delivery is
    /// stored as `failed` before the error is returned.
    pub async fn send(&self, lead_id: Uuid, request: &SendMessage) -> Result<MessageLog, MessagingError> {
        let lead = Lead::find_by_id(&self.pool, lead_id)
            .await?
            .ok_or(MessagingError::LeadNotFound)?;

        let body = request.body.trim();
        if body.is_empty() {
            return Err(MessagingError::Validation(
                "message body must not be empty".to_string(),
            ));
        }
        let subject = request
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if request.channel == MessageChannel::Email && subject.is_none() {
            return Err(MessagingError::Validation(
                "email messages need a subject".to_string(),
            ));
        }

        let sender = self
            .sender(request.channel)
            .ok_or(MessagingError::ChannelNotConfigured(request.channel))?;
        let recipient = recipient_for(&lead, request.channel)
            .ok_or(MessagingError::NoRecipient(request.channel))?;

        let message = OutboundMessage {
            recipient,
            recipient_name: lead.full_name(),
            subject: subject.map(str::to_string),
            body: body.to_string(),
        };

        let outcome = sender.send(&message).await;
        let (status, provider_message_id, error_message) = match &outcome {
            Ok(id) => (MessageStatus::Sent, id.clone(), None),
            Err(e) => (MessageStatus::Failed, None, Some(e.to_string())),
        };

        let log = MessageLog::create(
            &self.pool,
            &NewMessageLog {
                lead_id,
                channel: request.channel,
                recipient: &message.recipient,
                subject: message.subject.as_deref(),
                body: &message.body,
                status,
                provider_message_id: provider_message_id.as_deref(),
                error_message: error_message.as_deref(),
            },
        )
        .await?;

        match outcome {
            Ok(_) => {
                info!(
                    lead_id = %lead_id,
                    channel = %request.channel,
                    message_log_id = %log.id,
                    "Message sent"
                );
                Ok(log)
            }
            Err(e) => {
                warn!(
                    lead_id = %lead_id,
                    channel = %request.channel,
                    message_log_id = %log.id,
                    error = %e,
                    "Message delivery failed"
                );
                Err(MessagingError::Delivery(e))
            }
        }
    }

    pub async fn history(&self, lead_id: Uuid) -> Result<Vec<MessageLog>, MessagingError> {
        Lead::find_by_id(&self.pool, lead_id)
            .await?
            .ok_or(MessagingError::LeadNotFound)?;
        Ok(MessageLog::find_by_lead_id(&self.pool, lead_id).await?)
    }
}

fn recipient_for(lead: &Lead, channel: MessageChannel) -> Option<String> {
    match channel {
        MessageChannel::Email => lead
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| e.contains('@'))
            .map(str::to_string),
        MessageChannel::Whatsapp => lead.phone.as_deref().and_then(normalize_phone),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use db::{DBService, models::lead::CreateLead};
    use secrecy::SecretString;

    use super::*;

    struct FakeSender {
        channel: MessageChannel,
        fail: bool,
        sent: Mutex<Vec<OutboundMessage>>,
    }

    impl FakeSender {
        fn new(channel: MessageChannel, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                channel,
                fail,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MessageSender for FakeSender {
        fn channel(&self) -> MessageChannel {
            self.channel
        }

        async fn send(&self, message: &OutboundMessage) -> Result<Option<String>, DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Rejected {
                    status: 400,
                    body: "invalid recipient".to_string(),
                });
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(Some("provider-1".to_string()))
        }
    }

    async fn lead(db: &DBService, email: Option<&str>, phone: Option<&str>) -> Lead {
        Lead::create(
            &db.pool,
            &CreateLead {
                first_name: "Maëlle".to_string(),
                last_name: "Petit".to_string(),
                email: email.map(str::to_string),
                phone: phone.map(str::to_string),
                formation: "Rehaussement de cils".to_string(),
                source: None,
                status: None,
                closer_id: None,
                fixed_price_cents: None,
                notes: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap()
    }

    fn whatsapp(body: &str) -> SendMessage {
        SendMessage {
            channel: MessageChannel::Whatsapp,
            subject: None,
            body: body.to_string(),
        }
    }

    #[test]
    fn normalizes_french_and_international_numbers() {
        assert_eq!(normalize_phone("06 12 34 56 78").as_deref(), Some("33612345678"));
        assert_eq!(normalize_phone("+33 6.12.34.56.78").as_deref(), Some("33612345678"));
        assert_eq!(normalize_phone("0032 470 12 34 56").as_deref(), Some("32470123456"));
        assert_eq!(normalize_phone("+1 (415) 555-0100").as_deref(), Some("14155550100"));
        assert_eq!(normalize_phone("12"), None);
        assert_eq!(normalize_phone("06 12 AB 56 78"), None);
    }

    #[test]
    fn email_payload_carries_sender_and_subject() {
        let sender = EmailSender::new(EmailConfig {
            api_url: "http://localhost/email".to_string(),
            api_key: SecretString::from("key"),
            sender_email: "contact@school.fr".to_string(),
            sender_name: "École".to_string(),
        })
        .unwrap();
        let payload = sender.payload(&OutboundMessage {
            recipient: "lead@mail.fr".to_string(),
            recipient_name: "Lead".to_string(),
            subject: Some("Votre inscription".to_string()),
            body: "Bonjour".to_string(),
        });
        assert_eq!(payload["sender"]["email"], "contact@school.fr");
        assert_eq!(payload["to"][0]["email"], "lead@mail.fr");
        assert_eq!(payload["subject"], "Votre inscription");
        assert_eq!(payload["textContent"], "Bonjour");
    }

    #[test]
    fn whatsapp_payload_is_a_text_message() {
        let payload = WhatsAppSender::payload(&OutboundMessage {
            recipient: "33612345678".to_string(),
            recipient_name: "Lead".to_string(),
            subject: None,
            body: "Rendez-vous lundi".to_string(),
        });
        assert_eq!(payload["messaging_product"], "whatsapp");
        assert_eq!(payload["to"], "33612345678");
        assert_eq!(payload["text"]["body"], "Rendez-vous lundi");
    }

    #[tokio::test]
    async fn successful_send_is_logged() {
        let db = DBService::new_in_memory().await.unwrap();
        let fake = FakeSender::new(MessageChannel::Whatsapp, false);
        let sender: Arc<dyn MessageSender> = fake.clone();
        let service = MessagingService::new(db.pool.clone(), vec![sender]);
        let lead = lead(&db, None, Some("07 00 11 22 33")).await;

        let log = service.send(lead.id, &whatsapp(" Bienvenue ")).await.unwrap();
        assert_eq!(log.status, MessageStatus::Sent);
        assert_eq!(log.recipient, "33700112233");
        assert_eq!(log.provider_message_id.as_deref(), Some("provider-1"));
        assert_eq!(fake.sent.lock().unwrap()[0].body, "Bienvenue");
        assert_eq!(service.history(lead.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_send_is_logged_and_reported() {
        let db = DBService::new_in_memory().await.unwrap();
        let sender: Arc<dyn MessageSender> = FakeSender::new(MessageChannel::Whatsapp, true);
        let service = MessagingService::new(db.pool.clone(), vec![sender]);
        let lead = lead(&db, None, Some("0612345678")).await;

        let err = service.send(lead.id, &whatsapp("Bonjour")).await.unwrap_err();
        assert!(matches!(err, MessagingError::Delivery(_)));

        let history = service.history(lead.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, MessageStatus::Failed);
        assert!(history[0].error_message.is_some());
    }

    #[tokio::test]
    async fn missing_channel_or_recipient_is_rejected() {
        let db = DBService::new_in_memory().await.unwrap();
        let sender: Arc<dyn MessageSender> = FakeSender::new(MessageChannel::Whatsapp, false);
        let service = MessagingService::new(db.pool.clone(), vec![sender]);
        let lead = lead(&db, Some("maelle@mail.fr"), None).await;

        let err = service.send(lead.id, &whatsapp("Bonjour")).await.unwrap_err();
        assert!(matches!(err, MessagingError::NoRecipient(MessageChannel::Whatsapp)));

        let email = SendMessage {
            channel: MessageChannel::Email,
            subject: Some("Infos".to_string()),
            body: "Bonjour".to_string(),
        };
        let err = service.send(lead.id, &email).await.unwrap_err();
        assert!(matches!(err, MessagingError::ChannelNotConfigured(MessageChannel::Email)));
        assert!(service.history(lead.id).await.unwrap().is_empty());
    }
}
