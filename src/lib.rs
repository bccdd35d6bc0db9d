//! # Peekmail
//!
//! Peekmail is a local SMTP server that previews mail instead of delivering
//! it.
//!
//! Every accepted message is parsed, its attachments are written to a
//! preview directory, and each text body is rendered through a template and
//! opened in the default viewer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peekmail::{NoopLauncher, Previewer, SmtpServer};
//! use std::sync::mpsc;
//! use std::thread;
//! use std::time::Duration;
//!
//! // Create and start server
//! let (tx, rx) = mpsc::channel();
//! let previewer = Previewer::new(std::env::temp_dir(), NoopLauncher);
//! let server = SmtpServer::new("test.local", previewer);
//!
//! thread::spawn(move || {
//!     server.start("127.0.0.1:2525", tx).unwrap();
//! });
//!
//! // Application sends email to localhost:2525
//! // ...
//!
//! // Check the parsed email
//! if let Ok(email) = rx.recv_timeout(Duration::from_secs(1)) {
//!   println!("Received {:?} from: {}", email.subject, email.envelope.sender);
//! }
//! ```
//!
//! ## Supported SMTP commands
//!
//! - `HELO` / `EHLO` - Identify the sender
//! - `AUTH PLAIN` - Authenticate with the configured credentials
//! - `MAIL FROM` - Specify the sender's address
//! - `RCPT TO` - Specify the destination (multiple destinations are supported)
//! - `DATA` - Send the email body
//! - `RSET` - Reset the current transaction
//! - `NOOP` - Do nothing
//! - `QUIT` - Close connection
//!
//! ## Message Handling
//!
//! The message is processed when the DATA terminator arrives:
//!
//! - Headers are decoded, including RFC 2047 `B` encoded-words.
//! - `text/plain` and `text/html` parts become bodies, other parts become
//!   attachments. Nested multiparts are walked.
//! - Attachments are saved to the preview directory, then every body is
//!   rendered to its own file.
//!
//! A message that fails any of these steps is answered with `554` and
//! dropped. Accepted messages are also sent to the channel given when the
//! server starts.
//!
//! ## Notes
//!
//! - SSL/TLS connection is not supported.
//! - Mail relay is not supported.
//! - Previews are never cleaned up.
//!
//! ## Size Limits
//!
//! The server enforces RFC 821 size limits:
//! - User names: 64 characters max
//! - Domain names: 64 characters max
//! - Paths: 256 characters max
//! - Command lines: 512 characters max
//! - Text lines: 1000 characters max
//! - Recipients: 100 max per message

pub mod config;
pub mod mime;
pub mod preview;
mod smtp;

pub use config::{Config, ConfigError};
pub use mime::{Attachment, Body, Email, Envelope, MimeError};
pub use preview::{Launcher, NoopLauncher, PreviewError, Previewer, Renderer, SystemLauncher};
pub use smtp::{
    Credentials, DEFAULT_TIMEOUT, SmtpError, SmtpLimits, SmtpResponse, SmtpServer, SmtpSession,
    SmtpState,
};
