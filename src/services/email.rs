//! Overdue notification: the notifier contract and its SMTP implementation

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
    models::{Book, Checkout},
    repository::{BookRepository, PatronDirectory},
};

/// External notification contract consumed by the sweeper. The
/// `overdue_email_sent` flag on the checkout is the idempotency guard; the
/// notifier itself only reports whether dispatch was confirmed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OverdueNotifier: Send + Sync {
    async fn send_overdue_notice(&self, checkout: &Checkout) -> AppResult<()>;
}

#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send an overdue reminder for the given checkout
    pub async fn send_overdue_notice(
        &self,
        to: &str,
        book: &Book,
        checkout: &Checkout,
    ) -> AppResult<()> {
        let subject = format!("Overdue book: {}", book.title);
        let body = format!(
            r#"
You have an overdue book:

  Title:    {title}
  Author:   {author}
  Due date: {due}

Please return it as soon as possible.
"#,
            title = book.title,
            author = book.author,
            due = checkout.due_date.format("%Y-%m-%d"),
        );

        self.send_email(to, &subject, &body).await
    }

    /// Generic email sending function
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let from_name = self
            .config
            .smtp_from_name
            .as_deref()
            .unwrap_or("Libris");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Internal(format!("Invalid to address: {}", e)))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><pre>{}</pre></body></html>"#,
                                body.replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        let mailer_builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer_builder = if let (Some(username), Some(password)) = (
            &self.config.smtp_username,
            &self.config.smtp_password,
        ) {
            mailer_builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer_builder
        };

        let mailer = mailer_builder.build();

        mailer
            .send(&email)
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

/// SMTP-backed notifier: resolves the patron's address and the book's
/// details, then delivers through [`EmailService`].
pub struct SmtpOverdueNotifier {
    email: EmailService,
    patrons: Arc<dyn PatronDirectory>,
    books: Arc<dyn BookRepository>,
}

impl SmtpOverdueNotifier {
    pub fn new(
        email: EmailService,
        patrons: Arc<dyn PatronDirectory>,
        books: Arc<dyn BookRepository>,
    ) -> Self {
        Self {
            email,
            patrons,
            books,
        }
    }
}

#[async_trait]
impl OverdueNotifier for SmtpOverdueNotifier {
    async fn send_overdue_notice(&self, checkout: &Checkout) -> AppResult<()> {
        let to = self
            .patrons
            .patron_email(checkout.user_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "no email address on file for user {}",
                    checkout.user_id
                ))
            })?;
        let book = self.books.fetch(checkout.book_id).await?;

        self.email.send_overdue_notice(&to, &book, checkout).await
    }
}
