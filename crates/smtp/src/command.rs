use std::str::{FromStr, Utf8Error};

use email_address::EmailAddress;
use nom::{
    bytes::complete::{tag, take_until},
    combinator::map_res,
    sequence::delimited,
    IResult,
};
use tracing::debug;

/// Hello commands the server answers.
const SUPPORTED: &[&str] = &["HELO", "EHLO"];

/// Commands the server recognizes but deliberately does not implement.
const UNSUPPORTED: &[&str] = &["VRFY"];

/// Classification of the verb opening a session.
///
/// Only the first command of a session goes through this table; once the
/// client has said hello, lines are parsed as [`Command`]s instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Supported,
    Unsupported,
    Unknown,
}

#[must_use]
pub fn classify(verb: &str) -> Kind {
    let verb = verb.to_ascii_uppercase();

    if SUPPORTED.contains(&verb.as_str()) {
        Kind::Supported
    } else if UNSUPPORTED.contains(&verb.as_str()) {
        Kind::Unsupported
    } else {
        Kind::Unknown
    }
}

/// A transaction command, i.e. anything legal after the hello.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Mail { from: EmailAddress },
    Rcpt { to: EmailAddress },
    Data,
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Unrecognized,
    Syntax(&'static str),
    InvalidUtf8,
}

impl From<Utf8Error> for Error {
    fn from(_e: Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl TryFrom<&[u8]> for Command {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let s = std::str::from_utf8(bytes)?;
        debug!(?s, "parsing command");
        let (verb, args) = s.split_once(' ').unwrap_or((s, ""));

        let cmd = match verb.to_ascii_uppercase().as_str() {
            "MAIL" => Command::Mail {
                from: prefixed_mailbox(args, "FROM:")
                    .ok_or(Error::Syntax("MAIL FROM:<address>"))?,
            },
            "RCPT" => Command::Rcpt {
                to: prefixed_mailbox(args, "TO:").ok_or(Error::Syntax("RCPT TO:<address>"))?,
            },
            "DATA" => Command::Data,
            "QUIT" => Command::Quit,
            _ => return Err(Error::Unrecognized),
        };

        Ok(cmd)
    }
}

fn prefixed_mailbox(args: &str, prefix: &str) -> Option<EmailAddress> {
    let args = args.trim_start();
    let head = args.get(..prefix.len())?;

    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }

    mailbox(&args[prefix.len()..])
}

fn parse_mailbox(i: &str) -> IResult<&str, EmailAddress> {
    let (i, _) = take_until("<")(i)?;
    map_res(
        delimited(tag("<"), take_until(">"), tag(">")),
        EmailAddress::from_str,
    )(i)
}

/// Extract the `<...>`-wrapped address from `i`.
///
/// On top of plain address validity, the domain part must contain at least
/// one dot, so `<alice@localhost>` is rejected.
pub(crate) fn mailbox(i: &str) -> Option<EmailAddress> {
    match parse_mailbox(i) {
        Ok((_, addr)) => {
            if addr.domain().contains('.') {
                Some(addr)
            } else {
                debug!("rejecting dotless mailbox domain in {i:?}");
                None
            }
        }
        Err(e) => {
            debug!(%e, "failed to parse mailbox string {i:?}");
            None
        }
    }
}
