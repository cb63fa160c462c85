//! Email channel.
//!
//! Delivers over SMTP using lettre: STARTTLS on port 587, implicit TLS on
//! port 465, credentials when configured. Address problems are permanent;
//! connection and server trouble is transient.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{ChannelSender, NotificationPayload, SendError};
use crate::config::SmtpConfig;

/// SMTP-backed sender; one instance serves every email endpoint.
pub struct EmailSender {
    config: SmtpConfig,
}

impl EmailSender {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Plain text body.
    fn format_text(payload: &NotificationPayload) -> String {
        let context = if payload.context.as_object().is_some_and(|m| !m.is_empty()) {
            format!(
                "\nContext:\n{}\n",
                serde_json::to_string_pretty(&payload.context).unwrap_or_default()
            )
        } else {
            String::new()
        };

        format!(
            r#"{headline}

Alert: {alert_id}
Tenant: {tenant_id}
Triggered rules: {rules}
Received: {received}
{context}
--
This notification was sent by Alertpipe."#,
            headline = payload.headline(),
            alert_id = payload.alert_id,
            tenant_id = payload.tenant_id,
            rules = payload.rule_ids.join(", "),
            received = payload.created_at.format("%Y-%m-%d %H:%M UTC"),
            context = context,
        )
    }

    /// HTML body with a severity-colored banner.
    fn format_html(payload: &NotificationPayload) -> String {
        let severity_color = match payload.severity.to_ascii_lowercase().as_str() {
            "critical" | "fatal" => "#dc2626",
            "high" | "error" => "#ef4444",
            "medium" | "warning" => "#f59e0b",
            "low" | "info" => "#3b82f6",
            _ => "#6b7280",
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 0; padding: 20px; background-color: #f3f4f6;">
    <div style="max-width: 600px; margin: 0 auto; background-color: #ffffff; border-radius: 8px; overflow: hidden;">
        <div style="background-color: {severity_color}; padding: 16px 24px;">
            <h1 style="color: #ffffff; margin: 0; font-size: 18px; font-weight: 600;">{headline}</h1>
        </div>
        <div style="padding: 24px;">
            <table style="width: 100%; border-collapse: collapse; font-size: 13px;">
                <tr>
                    <td style="padding: 8px 0; color: #6b7280;">Alert</td>
                    <td style="padding: 8px 0; color: #111827; text-align: right;">{alert_id}</td>
                </tr>
                <tr>
                    <td style="padding: 8px 0; color: #6b7280; border-top: 1px solid #e5e7eb;">Tenant</td>
                    <td style="padding: 8px 0; color: #111827; border-top: 1px solid #e5e7eb; text-align: right;">{tenant_id}</td>
                </tr>
                <tr>
                    <td style="padding: 8px 0; color: #6b7280; border-top: 1px solid #e5e7eb;">Rules</td>
                    <td style="padding: 8px 0; color: #111827; border-top: 1px solid #e5e7eb; text-align: right;">{rules}</td>
                </tr>
                <tr>
                    <td style="padding: 8px 0; color: #6b7280; border-top: 1px solid #e5e7eb;">Received</td>
                    <td style="padding: 8px 0; color: #111827; border-top: 1px solid #e5e7eb; text-align: right;">{received}</td>
                </tr>
            </table>
        </div>
        <div style="padding: 16px 24px; background-color: #f9fafb; border-top: 1px solid #e5e7eb;">
            <p style="margin: 0; font-size: 12px; color: #6b7280;">This notification was sent by Alertpipe.</p>
        </div>
    </div>
</body>
</html>"#,
            severity_color = severity_color,
            headline = html_escape(&payload.headline()),
            alert_id = html_escape(&payload.alert_id),
            tenant_id = html_escape(&payload.tenant_id),
            rules = html_escape(&payload.rule_ids.join(", ")),
            received = payload.created_at.format("%Y-%m-%d %H:%M UTC"),
        )
    }

    fn transport(&self, host: &str) -> Result<AsyncSmtpTransport<Tokio1Executor>, SendError> {
        // Port 465 = implicit TLS (SMTPS), anything else = STARTTLS.
        let builder = if self.config.port == 465 {
            let tls_params = TlsParameters::new(host.to_string())
                .map_err(|e| SendError::Permanent(format!("invalid TLS parameters: {}", e)))?;
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map(|b| b.port(self.config.port).tls(Tls::Wrapper(tls_params)))
                .map_err(|e| SendError::Permanent(format!("invalid SMTP host: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map(|b| b.port(self.config.port))
                .map_err(|e| SendError::Permanent(format!("invalid SMTP host: {}", e)))?
        };

        let builder = if let (Some(username), Some(password)) =
            (&self.config.username, &self.config.password)
        {
            builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            builder
        };

        Ok(builder.build())
    }
}

/// Simple HTML escaping for email content
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
impl ChannelSender for EmailSender {
    async fn send(
        &self,
        endpoint_value: &str,
        payload: &NotificationPayload,
    ) -> Result<(), SendError> {
        if endpoint_value.trim().is_empty() {
            return Err(SendError::Permanent("empty recipient".to_string()));
        }

        let host = self
            .config
            .host
            .as_deref()
            .ok_or_else(|| SendError::Permanent("SMTP host not configured".to_string()))?;

        let from: Mailbox = self
            .config
            .from_address
            .parse()
            .map_err(|e| SendError::Permanent(format!("invalid from address: {}", e)))?;
        let to: Mailbox = endpoint_value
            .parse()
            .map_err(|e| SendError::Permanent(format!("invalid recipient '{}': {}", endpoint_value, e)))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(payload.headline())
            .date_now()
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(Self::format_text(payload)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(Self::format_html(payload)),
                    ),
            )
            .map_err(|e| SendError::Permanent(format!("failed to build email: {}", e)))?;

        let mailer = self.transport(host)?;

        match mailer.send(email).await {
            Ok(_) => {
                log::debug!("Email sent to {}", endpoint_value);
                Ok(())
            }
            Err(e) if e.is_permanent() => Err(SendError::Permanent(format!(
                "SMTP rejected mail for {}: {}",
                endpoint_value, e
            ))),
            Err(e) => Err(SendError::Transient(format!(
                "SMTP delivery to {} failed: {}",
                endpoint_value, e
            ))),
        }
    }
}
