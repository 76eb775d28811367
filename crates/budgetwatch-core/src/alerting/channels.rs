//! Notification channel implementations
//!
//! Channels are the dispatcher's external collaborators: a channel gets a
//! user id, a title, and a body, and reports success or failure. The real
//! email and push transports live behind HTTP gateways; the in-app channel
//! records locally.

use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::config::ChannelsConfig;

/// Channel-level errors. These never escape the dispatcher; they are
/// recorded per channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A single notification channel
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Stable channel name used in results and logs
    fn name(&self) -> &str;

    /// Deliver one notification to one user
    async fn send(&self, user_id: &str, title: &str, body: &str) -> Result<(), ChannelError>;
}

/// Build the configured channel set. In-app is always present; email and
/// push join only when their gateway is configured.
pub fn channels_from_config(config: &ChannelsConfig) -> Vec<Box<dyn NotificationChannel>> {
    let client = Client::builder()
        .timeout(config.http_timeout)
        .build()
        .expect("Failed to create HTTP client");

    let mut channels: Vec<Box<dyn NotificationChannel>> = vec![Box::new(InAppChannel)];

    if let Some(url) = &config.email_gateway_url {
        channels.push(Box::new(EmailChannel::new(
            client.clone(),
            url.clone(),
            config.email_domain.clone(),
        )));
    }

    if let Some(url) = &config.push_gateway_url {
        channels.push(Box::new(PushChannel::new(client, url.clone())));
    }

    channels
}

/// In-app notification channel: a synchronous record in the application log
pub struct InAppChannel;

#[async_trait::async_trait]
impl NotificationChannel for InAppChannel {
    fn name(&self) -> &str {
        "in_app"
    }

    async fn send(&self, user_id: &str, title: &str, body: &str) -> Result<(), ChannelError> {
        info!(user_id, title, body, "In-app notification sent");
        Ok(())
    }
}

/// Email channel backed by an HTTP mail gateway
pub struct EmailChannel {
    client: Client,
    gateway_url: String,
    domain: String,
}

impl EmailChannel {
    /// Create an email channel posting to `gateway_url`
    pub fn new(client: Client, gateway_url: String, domain: String) -> Self {
        Self {
            client,
            gateway_url,
            domain,
        }
    }

    /// Resolve a recipient address for a user. A directory lookup belongs to
    /// the out-of-scope user service; the address is derived from the id.
    fn recipient(&self, user_id: &str) -> String {
        format!("{user_id}@{}", self.domain)
    }
}

#[derive(Debug, Serialize)]
struct EmailPayload<'a> {
    to: String,
    subject: &'a str,
    body: &'a str,
}

#[async_trait::async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, user_id: &str, title: &str, body: &str) -> Result<(), ChannelError> {
        let payload = EmailPayload {
            to: self.recipient(user_id),
            subject: title,
            body,
        };

        let response = self
            .client
            .post(&self.gateway_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Http(format!(
                "Mail gateway returned {status}: {body}"
            )));
        }

        info!(user_id, "Email notification sent");
        Ok(())
    }
}

/// Push channel backed by an HTTP push gateway
pub struct PushChannel {
    client: Client,
    gateway_url: String,
}

impl PushChannel {
    /// Create a push channel posting to `gateway_url`
    pub fn new(client: Client, gateway_url: String) -> Self {
        Self {
            client,
            gateway_url,
        }
    }
}

#[derive(Debug, Serialize)]
struct PushPayload<'a> {
    user_id: &'a str,
    title: &'a str,
    message: &'a str,
}

#[async_trait::async_trait]
impl NotificationChannel for PushChannel {
    fn name(&self) -> &str {
        "push"
    }

    async fn send(&self, user_id: &str, title: &str, body: &str) -> Result<(), ChannelError> {
        let payload = PushPayload {
            user_id,
            title,
            message: body,
        };

        let response = self
            .client
            .post(&self.gateway_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Http(format!(
                "Push gateway returned {status}: {body}"
            )));
        }

        info!(user_id, "Push notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn email_channel_posts_to_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mail"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = EmailChannel::new(
            Client::new(),
            format!("{}/mail", server.uri()),
            "example.com".to_string(),
        );

        channel
            .send("user-1", "Budget Alert", "body")
            .await
            .expect("send should succeed");
    }

    #[tokio::test]
    async fn email_recipient_is_derived_from_user_id() {
        let server = MockServer::start().await;
        let expected = serde_json::json!({
            "to": "user-1@example.com",
            "subject": "Budget Alert",
            "body": "body",
        });
        Mock::given(method("POST"))
            .and(body_json(&expected))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = EmailChannel::new(Client::new(), server.uri(), "example.com".to_string());
        channel
            .send("user-1", "Budget Alert", "body")
            .await
            .expect("send should succeed");
    }

    #[tokio::test]
    async fn gateway_error_status_is_a_channel_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let channel = PushChannel::new(Client::new(), server.uri());
        let err = channel
            .send("user-1", "Budget Alert", "body")
            .await
            .expect_err("503 should fail");
        assert!(matches!(err, ChannelError::Http(_)));
    }

    #[test]
    fn config_without_gateways_yields_in_app_only() {
        let channels = channels_from_config(&ChannelsConfig::default());
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name(), "in_app");
    }

    #[test]
    fn configured_gateways_enable_their_channels() {
        let config = ChannelsConfig {
            email_gateway_url: Some("http://localhost:9999/mail".to_string()),
            push_gateway_url: Some("http://localhost:9999/push".to_string()),
            ..ChannelsConfig::default()
        };
        let channels = channels_from_config(&config);
        let names: Vec<&str> = channels.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["in_app", "email", "push"]);
    }
}
