use std::sync::Arc;

use email_address::EmailAddress;
use line::{read_line, Connection, ReadLineError};
use mailbox::{EmailRecord, Mailbox};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, instrument, warn};

use crate::{
    command::{self, Command, Kind},
    ehlo, headers,
    io::bye,
    LINE_LIMIT,
};

/// The sender and recipients named by MAIL and RCPT, in arrival order.
#[derive(Debug)]
pub struct Envelope {
    pub from: EmailAddress,
    pub recipients: Vec<EmailAddress>,
}

impl Envelope {
    #[must_use]
    pub fn new(from: EmailAddress) -> Self {
        Self {
            from,
            recipients: Vec::new(),
        }
    }
}

/// SMTP session with a client: one connection, one transaction.
///
/// The command sequence is enforced by control flow — greeting, hello,
/// envelope, data, quit run in that order and never back up. A closed
/// stream aborts the session at any point without a reply; nothing is
/// stored unless the message survives header parsing.
pub struct Session<IO: AsyncRead + AsyncWrite + Unpin> {
    connection: Connection<IO>,
    domain: Arc<str>,
    mailbox: Arc<Mailbox>,
}

impl<IO: AsyncRead + AsyncWrite + Unpin> Session<IO> {
    pub fn new(stream: IO, domain: Arc<str>, mailbox: Arc<Mailbox>) -> Self {
        Self {
            connection: Connection::new(stream),
            domain,
            mailbox,
        }
    }

    /// Drive the session to completion.
    #[instrument(skip_all)]
    pub async fn run(mut self) -> std::io::Result<()> {
        self.connection
            .write_flush(format!(
                "220 {} Simple Mail Transfer Service Ready\r\n",
                self.domain
            ))
            .await?;

        let Some(client_domain) = self.hello().await? else {
            return Ok(());
        };
        debug!(?client_domain, "hello accepted");

        let Some(envelope) = self.envelope().await? else {
            return Ok(());
        };

        let Some(body) = self.collect_data().await? else {
            return Ok(());
        };
        self.finalize(&body).await?;

        self.quit().await
    }

    /// Read one line, capped at [`LINE_LIMIT`]. `None` means the peer went
    /// away.
    async fn next_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        match read_line(
            &mut self.connection.stream_mut().take(LINE_LIMIT as _),
            &mut buf,
        )
        .await
        {
            Ok(()) => Ok(Some(buf)),
            Err(ReadLineError::Eof) => Ok(None),
            Err(ReadLineError::Io(e)) => Err(e),
        }
    }

    async fn reply(&mut self, code: u16, text: &str) -> std::io::Result<()> {
        self.connection
            .write_flush(format!("{code} {} {text}\r\n", self.domain))
            .await
    }

    /// Wait for a HELO or EHLO and answer with the capability block.
    ///
    /// The verb of each attempt goes through the command table: supported
    /// hellos proceed, recognized-but-unsupported commands get a 502, and
    /// everything else a 500. The loop runs until a hello lands or the
    /// client gives up.
    async fn hello(&mut self) -> std::io::Result<Option<String>> {
        loop {
            let Some(buf) = self.next_line().await? else {
                return Ok(None);
            };

            let s = String::from_utf8_lossy(&buf);
            let s = s.trim();
            if s.is_empty() {
                self.reply(503, "Bad sequence of commands").await?;
                continue;
            }

            let (verb, args) = s.split_once(' ').unwrap_or((s, ""));

            match command::classify(verb) {
                Kind::Supported => {
                    let client_domain = args.trim();
                    if client_domain.is_empty() {
                        self.reply(501, "Syntax error in parameters or arguments")
                            .await?;
                        continue;
                    }

                    let response = ehlo::Response::new(&self.domain, client_domain).to_string();
                    self.connection.write_flush(response).await?;
                    return Ok(Some(client_domain.to_owned()));
                }
                Kind::Unsupported => self.reply(502, "Command not implemented").await?,
                Kind::Unknown => {
                    self.reply(500, "Syntax error, command unrecognized").await?;
                }
            }
        }
    }

    /// Collect MAIL and the RCPTs that follow it, up to the DATA command.
    async fn envelope(&mut self) -> std::io::Result<Option<Envelope>> {
        let mut envelope = loop {
            match self.next_command().await? {
                None => return Ok(None),
                Some(Ok(Command::Mail { from })) => {
                    self.ok().await?;
                    break Envelope::new(from);
                }
                Some(Ok(Command::Quit)) => {
                    bye(self.connection.stream_mut(), &self.domain).await?;
                    return Ok(None);
                }
                Some(other) => self.out_of_sequence(other).await?,
            }
        };

        loop {
            match self.next_command().await? {
                None => return Ok(None),
                Some(Ok(Command::Rcpt { to })) => {
                    self.ok().await?;
                    envelope.recipients.push(to);
                }
                Some(Ok(Command::Data)) => {
                    self.connection
                        .write_flush("354 Start mail input; end with <CRLF>.<CRLF>\r\n")
                        .await?;
                    debug!(?envelope, "envelope ready");
                    return Ok(Some(envelope));
                }
                Some(Ok(Command::Quit)) => {
                    bye(self.connection.stream_mut(), &self.domain).await?;
                    return Ok(None);
                }
                Some(other) => self.out_of_sequence(other).await?,
            }
        }
    }

    async fn next_command(&mut self) -> std::io::Result<Option<Result<Command, command::Error>>> {
        let Some(buf) = self.next_line().await? else {
            return Ok(None);
        };
        Ok(Some(Command::try_from(buf.as_slice())))
    }

    async fn ok(&mut self) -> std::io::Result<()> {
        self.connection.write_flush("250 OK\r\n").await
    }

    /// Reply to a command that is legal SMTP but not what the transaction
    /// expects here: syntax problems get a 501 so the client can retry the
    /// same step, everything else a 503.
    async fn out_of_sequence(
        &mut self,
        parsed: Result<Command, command::Error>,
    ) -> std::io::Result<()> {
        match parsed {
            Err(command::Error::Syntax(_)) => {
                self.reply(501, "Syntax error in parameters or arguments")
                    .await
            }
            _ => self.reply(503, "Bad sequence of commands").await,
        }
    }

    /// Accumulate body lines until the lone-dot terminator. Body lines get
    /// no per-line replies.
    async fn collect_data(&mut self) -> std::io::Result<Option<String>> {
        let mut body_lines = Vec::new();

        loop {
            let Some(buf) = self.next_line().await? else {
                return Ok(None);
            };

            if buf == b"." {
                return Ok(Some(body_lines.join("\r\n")));
            }

            body_lines.push(String::from_utf8_lossy(&buf).into_owned());
        }
    }

    /// Parse the finished message and store it, or fail the transaction.
    async fn finalize(&mut self, body: &str) -> std::io::Result<()> {
        match headers::parse_header_section(body) {
            Ok(section) => {
                let record = EmailRecord {
                    message_id: section.message_id,
                    sender_email: section.from,
                    recipient_emails: section.to,
                    raw_body: body.to_owned(),
                };
                debug!(message_id = %record.message_id, "storing message");
                self.mailbox.set(record);
                self.ok().await
            }
            Err(e) => {
                warn!(%e, "rejecting message with unparseable headers");
                self.reply(554, "Transaction failed").await
            }
        }
    }

    /// Wait for QUIT, then close the transmission channel.
    async fn quit(&mut self) -> std::io::Result<()> {
        loop {
            match self.next_command().await? {
                None => return Ok(()),
                Some(Ok(Command::Quit)) => {
                    return bye(self.connection.stream_mut(), &self.domain).await;
                }
                Some(_) => self.reply(503, "Bad sequence of commands").await?,
            }
        }
    }
}
