//! Email service for password resets and outbox notifications.

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::{path::Path, time::Duration};

use crate::{
    config::{Config, EmailTransportConfig},
    errors::Error,
};

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    reply_to: Option<String>,
    base_url: String,
    reset_token_duration: Duration,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Self {
            transport,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            reply_to: email_config.reply_to.clone(),
            base_url: config.dashboard_url.trim_end_matches('/').to_string(),
            reset_token_duration: config.auth.native.password_reset_token_duration,
        })
    }

    pub async fn send_password_reset_email(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        token_id: &uuid::Uuid,
        token: &str,
    ) -> Result<(), Error> {
        let reset_link = format!("{}/reset-password?id={}&token={}", self.base_url, token_id, token);
        let body = self.create_password_reset_body(to_name, &reset_link);
        self.send_email(to_email, to_name, "Password Reset Request", &body).await
    }

    /// Deliver one outbox entry. `link` is relative to the dashboard URL.
    pub async fn send_notification_email(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        subject: &str,
        message: &str,
        link: Option<&str>,
    ) -> Result<(), Error> {
        let link = link.map(|path| format!("{}/{}", self.base_url, path.trim_start_matches('/')));
        let body = self.create_notification_body(to_name, subject, message, link.as_deref());
        self.send_email(to_email, to_name, subject, &body).await
    }

    async fn send_email(&self, to_email: &str, to_name: Option<&str>, subject: &str, body: &str) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = if let Some(name) = to_name {
            format!("{name} <{to_email}>")
        } else {
            to_email.to_string()
        }
        .parse::<Mailbox>()
        .map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let mut builder = Message::builder().from(from).to(to).subject(subject).header(ContentType::TEXT_HTML);
        if let Some(reply_to) = &self.reply_to {
            let reply_to = reply_to.parse::<Mailbox>().map_err(|e| Error::Internal {
                operation: format!("parse reply-to email: {e}"),
            })?;
            builder = builder.reply_to(reply_to);
        }

        let message = builder.body(body.to_string()).map_err(|e| Error::Internal {
            operation: format!("build email message: {e}"),
        })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        Ok(())
    }

    fn greeting(to_name: Option<&str>) -> String {
        match to_name {
            Some(name) => format!("Hello {},", escape_html(name)),
            None => "Hello,".to_string(),
        }
    }

    fn create_password_reset_body(&self, to_name: Option<&str>, reset_link: &str) -> String {
        let greeting = Self::greeting(to_name);
        let minutes = self.reset_token_duration.as_secs() / 60;

        layout(
            "Password Reset Request",
            &format!(
                r#"<p>{greeting}</p>

        <p>We received a request to reset your password. If you didn't make this request, you can safely ignore this email.</p>

        <p><a href="{reset_link}">Reset your password</a></p>

        <p>Or copy and paste this link into your browser:</p>
        <p>{reset_link}</p>

        <p>This link will expire in {minutes} minutes.</p>"#
            ),
        )
    }

    fn create_notification_body(&self, to_name: Option<&str>, subject: &str, message: &str, link: Option<&str>) -> String {
        let greeting = Self::greeting(to_name);
        let paragraphs: String = message
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .map(|p| format!("<p>{}</p>\n        ", escape_html(p.trim())))
            .collect();
        let action = link
            .map(|href| format!(r#"<p><a href="{href}">Open Volunteer Hub</a></p>"#))
            .unwrap_or_default();

        layout(
            &escape_html(subject),
            &format!("<p>{greeting}</p>\n\n        {paragraphs}{action}"),
        )
    }
}

fn layout(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #666; }}
    </style>
</head>
<body>
    <div class="container">
        <h2>{title}</h2>

        {content}

        <div class="footer">
            <p>This is an automated message, please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>"#
    )
}

/// Message text comes from users (help requests, tickets), so it is escaped before templating.
fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_config;

    #[tokio::test]
    async fn test_email_service_creation() {
        let config = create_test_config();
        assert!(EmailService::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_password_reset_email_body() {
        let config = create_test_config();
        let email_service = EmailService::new(&config).unwrap();

        let body = email_service.create_password_reset_body(Some("Ada Lovelace"), "https://example.org/reset?token=abc123");

        assert!(body.contains("Hello Ada Lovelace,"));
        assert!(body.contains("https://example.org/reset?token=abc123"));
        assert!(body.contains("expire in 30 minutes"));
    }

    #[tokio::test]
    async fn test_notification_body_escapes_user_text() {
        let config = create_test_config();
        let email_service = EmailService::new(&config).unwrap();

        let body = email_service.create_notification_body(
            None,
            "Shift confirmed",
            "You're booked.\n\n<script>alert(1)</script>",
            Some("https://example.org/volunteer"),
        );

        assert!(body.contains("Hello,"));
        assert!(body.contains("<h2>Shift confirmed</h2>"));
        assert!(body.contains("You&#39;re booked."));
        assert!(body.contains("&lt;script&gt;"));
        assert!(!body.contains("<script>"));
        assert!(body.contains(r#"href="https://example.org/volunteer""#));
    }

    #[tokio::test]
    async fn test_send_notification_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.email.transport = EmailTransportConfig::File {
            path: dir.path().to_string_lossy().to_string(),
        };

        let email_service = EmailService::new(&config).unwrap();
        email_service
            .send_notification_email("grace@example.org", Some("Grace"), "Welcome", "Your application was approved.", None)
            .await
            .unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
