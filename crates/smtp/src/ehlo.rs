//! Formatting of the multiline `250` reply sent after a successful hello.
//!
//! Example exchange:
//!
//! ```txt
//! S: 220 mail.example.com Simple Mail Transfer Service Ready
//! C: EHLO client.example
//! S: 250-mail.example.com greets client.example
//! 250-SIZE 26214400
//! 250-8BITMIME
//! 250 HELP
//! ```

use std::{borrow::Cow, fmt, iter};

/// Largest message size advertised in the capability block. Advertised only;
/// the server does not enforce it.
pub const MAX_MESSAGE_SIZE: u64 = 26_214_400;

/// The hello response: a greeting line followed by the capability keywords,
/// every line but the last carrying the `250-` continuation marker.
///
/// ```
/// # use smtp::ehlo::Response;
/// let response = Response::new("mail.example.com", "client.example");
///
/// assert_eq!(
///     response.to_string(),
///     "250-mail.example.com greets client.example\r\n\
///     250-SIZE 26214400\r\n\
///     250-8BITMIME\r\n\
///     250 HELP\r\n"
/// );
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct Response<'a> {
    /// Domain name of the server.
    pub domain: &'a str,
    /// Domain the client introduced itself with.
    pub client_domain: &'a str,
    /// Maximum message size in bytes
    /// ([RFC 1870](https://datatracker.ietf.org/doc/html/rfc1870)).
    pub size: u64,
}

impl<'a> Response<'a> {
    #[must_use]
    pub fn new(domain: &'a str, client_domain: &'a str) -> Self {
        Self {
            domain,
            client_domain,
            size: MAX_MESSAGE_SIZE,
        }
    }
}

impl fmt::Display for Response<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "250-{} greets {}\r\n", self.domain, self.client_domain)?;

        let mut lines = iter::once(Cow::Owned(format!("SIZE {}", self.size)))
            .chain(["8BITMIME", "HELP"].into_iter().map(Cow::Borrowed))
            .peekable();

        while let Some(line) = lines.next() {
            if lines.peek().is_some() {
                write!(f, "250-{line}\r\n")?;
            } else {
                write!(f, "250 {line}\r\n")?;
            }
        }

        Ok(())
    }
}
