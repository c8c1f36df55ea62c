// src/notify/email.rs
use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message, MultiPart, SinglePart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::digest::{render, Digest};
use crate::store::EventStore;

use super::digest_subject;

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailSender {
    pub fn new(cfg: &SmtpConfig) -> Result<Self> {
        let creds = Credentials::new(cfg.user.clone(), cfg.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .context("invalid SMTP host")?
            .port(cfg.port)
            .credentials(creds)
            .build();
        let from = cfg.from.parse().context("invalid SMTP from address")?;
        Ok(Self { mailer, from })
    }

    /// One message per recipient — the list is never disclosed. Unsubscribed
    /// addresses are skipped; a failed send is logged and does not stop the
    /// rest of the fan-out.
    pub async fn send_digest(
        &self,
        db: &EventStore,
        digest: &Digest,
        recipients: &[String],
    ) -> usize {
        let subject = digest_subject(digest);
        let html = render::render_html(digest);
        let text = render::render_text(digest);

        let mut sent = 0usize;
        for recipient in recipients {
            match db.is_unsubscribed(recipient) {
                Ok(true) => {
                    tracing::debug!(recipient = %recipient, "skipping unsubscribed address");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(error = ?e, "unsubscribe lookup failed, sending anyway");
                }
            }
            match self.send_one(recipient, &subject, &text, &html).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(recipient = %recipient, error = ?e, "digest send failed");
                }
            }
        }
        tracing::info!(sent, total = recipients.len(), "weekly digest dispatched");
        sent
    }

    async fn send_one(&self, to: &str, subject: &str, text: &str, html: &str) -> Result<()> {
        let to: Mailbox = to.parse().context("invalid recipient address")?;
        let msg = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .context("build digest email")?;
        self.mailer.send(msg).await.context("send digest email")?;
        Ok(())
    }
}
