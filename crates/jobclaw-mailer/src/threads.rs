//! IMAP thread reader — fetches the messages of exactly one conversation.
//!
//! The search is scoped to the thread's Message-ID/References headers, so
//! unrelated inbox traffic can never surface here.

use chrono::{DateTime, Utc};
use futures::StreamExt;

use jobclaw_core::error::{JobClawError, Result};
use jobclaw_core::types::{MailAccount, ThreadMessage};

/// Type alias for the TLS IMAP client used throughout this module.
type ImapTlsClient = async_imap::Client<tokio_native_tls::TlsStream<tokio::net::TcpStream>>;

/// Create TLS-wrapped IMAP connection (async, tokio-native).
async fn connect_imap_tls(host: &str, port: u16) -> Result<ImapTlsClient> {
    let tcp = tokio::net::TcpStream::connect((host, port))
        .await
        .map_err(|e| JobClawError::transport_transient(format!("TCP connect: {e}")))?;

    let connector = native_tls::TlsConnector::new()
        .map_err(|e| JobClawError::transport_permanent(format!("TLS connector: {e}")))?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    let tls_stream = connector
        .connect(host, tcp)
        .await
        .map_err(|e| JobClawError::transport_transient(format!("TLS handshake: {e}")))?;

    Ok(async_imap::Client::new(tls_stream))
}

/// Fetch one thread's messages, oldest first.
pub(crate) async fn fetch_thread(
    account: &MailAccount,
    thread_id: &str,
) -> Result<Vec<ThreadMessage>> {
    let client = connect_imap_tls(&account.imap_host, account.imap_port).await?;
    let mut session = client
        .login(&account.email, &account.password)
        .await
        .map_err(|e| JobClawError::transport_permanent(format!("IMAP login: {}", e.0)))?;

    session
        .select(&account.mailbox)
        .await
        .map_err(|e| JobClawError::transport_transient(format!("Select: {e}")))?;

    // Match both the thread root itself and anything referencing it.
    let query = format!(
        "OR HEADER Message-ID \"{thread_id}\" HEADER References \"{thread_id}\""
    );
    let uids = session
        .uid_search(&query)
        .await
        .map_err(|e| JobClawError::transport_transient(format!("Search: {e}")))?;

    if uids.is_empty() {
        session.logout().await.ok();
        return Ok(vec![]);
    }

    let uid_set = uids
        .iter()
        .map(|u| u.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let mut fetches = session
        .uid_fetch(&uid_set, "(UID RFC822)")
        .await
        .map_err(|e| JobClawError::transport_transient(format!("Fetch: {e}")))?;

    let mut messages = Vec::new();
    while let Some(fetch_result) = fetches.next().await {
        let fetch = fetch_result
            .map_err(|e| JobClawError::transport_transient(format!("Fetch msg: {e}")))?;
        if let Some(body) = fetch.body()
            && let Some(msg) = parse_thread_message(body, &account.email)
        {
            messages.push(msg);
        }
    }
    drop(fetches);

    session.logout().await.ok();

    messages.sort_by_key(|m| m.timestamp);
    tracing::debug!(
        "📧 Thread {} resolved to {} message(s)",
        thread_id,
        messages.len()
    );
    Ok(messages)
}

/// Parse raw email bytes into a thread message.
fn parse_thread_message(raw: &[u8], owner_email: &str) -> Option<ThreadMessage> {
    use mail_parser::MessageParser;
    let parsed = MessageParser::default().parse(raw)?;

    let sender_email = parsed
        .from()
        .and_then(|a| a.first())
        .and_then(|a| a.address())
        .map(|a| a.to_string())?;

    let timestamp = parsed
        .date()
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0))?;

    let outbound = sender_email.eq_ignore_ascii_case(owner_email);

    Some(ThreadMessage {
        sender_email,
        timestamp,
        outbound,
    })
}
