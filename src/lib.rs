//! kuvert is an embedded SMTP server for tests and development.
//!
//! It speaks just enough of the protocol for one mail-submission
//! transaction per connection, and keeps every accepted message in an
//! in-memory mailbox indexed by message id, sender, and recipient.
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> std::io::Result<()> {
//! use kuvert::{Config, Server};
//!
//! let server = Server::start(Config::default()).await?;
//!
//! // point the code under test at server.local_addr(), then:
//! let sent = server.mailbox().get_by_recipient("alice@example.com");
//!
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

pub use mailbox::{EmailRecord, Mailbox};
pub use smtp::server::{Config, Server};
