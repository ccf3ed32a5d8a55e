//! # JobClaw Mailer
//! SMTP sending (lettre), IMAP thread reading (async-imap), and the
//! retry/backoff wrapper around transport calls.

pub mod retry;
pub mod smtp;
mod threads;

pub use smtp::SmtpMailer;
