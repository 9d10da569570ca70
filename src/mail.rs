use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Mutex;
use tracing::{error, info};

use crate::config::split_list;
use crate::types::{Attachment, MailConfig, Report};

/// A fully addressed alert email.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<Attachment>,
}

/// Anything that can deliver an [`OutgoingMail`].
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// What happened when a report was handed to the mailer.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Sent { recipients: usize },
    NoRecipients,
    Failed(String),
}

/// Address `report` from the configured sender to every configured
/// recipient and send it. Failures are logged and returned, never raised.
pub async fn dispatch_report<M: Mailer + ?Sized>(mailer: &M, cfg: &MailConfig, report: Report) -> DispatchOutcome {
    let recipients = split_list(&cfg.recipients);
    if recipients.is_empty() {
        error!("No recipients specified; email not sent.");
        return DispatchOutcome::NoRecipients;
    }

    info!("Preparing to send email report to {}...", recipients.join(", "));
    let mail = OutgoingMail {
        from: cfg.sender.clone(),
        to: recipients,
        subject: report.subject,
        html_body: report.html_body,
        attachments: report.attachments,
    };

    match mailer.send(&mail).await {
        Ok(()) => {
            info!("Email sent successfully to {}.", mail.to.join(", "));
            DispatchOutcome::Sent { recipients: mail.to.len() }
        }
        Err(e) => {
            error!("Failed to send email: {:#}", e);
            DispatchOutcome::Failed(format!("{:#}", e))
        }
    }
}

/// Build the MIME message: an HTML part followed by one `application/csv`
/// part per attachment.
pub fn build_message(mail: &OutgoingMail) -> Result<Message> {
    let from: Mailbox = mail.from.parse().with_context(|| format!("invalid sender address '{}'", mail.from))?;
    let mut builder = Message::builder().from(from).subject(mail.subject.clone());
    for recipient in &mail.to {
        let to: Mailbox = recipient.parse().with_context(|| format!("invalid recipient address '{}'", recipient))?;
        builder = builder.to(to);
    }

    let csv_type = ContentType::parse("application/csv").context("parsing attachment content type")?;
    let mut body = MultiPart::mixed().singlepart(SinglePart::html(mail.html_body.clone()));
    for attachment in &mail.attachments {
        body = body.singlepart(
            MimeAttachment::new(attachment.filename.clone()).body(attachment.bytes.clone(), csv_type.clone()),
        );
    }

    builder.multipart(body).context("building email message")
}

/// Plain SMTP submission without authentication or TLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(cfg: &MailConfig) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(cfg.smtp_host.as_str())
            .port(cfg.smtp_port)
            .timeout(Some(cfg.smtp_timeout))
            .build();
        Self { transport }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let message = build_message(mail)?;
        self.transport
            .send(message)
            .await
            .context("SMTP submission failed")?;
        Ok(())
    }
}

/// Mailer that keeps every message in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails, like an unreachable relay.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        if self.fail {
            anyhow::bail!("connection refused by relay");
        }
        // Messages that can't be built would be rejected by the real mailer too.
        build_message(mail)?;
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(mail.clone());
        Ok(())
    }
}
