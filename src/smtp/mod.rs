//! SMTP server implementation

pub mod auth;
pub mod commands;
pub mod error;
pub mod response;
pub mod server;
pub mod session;

pub use auth::Credentials;
pub use error::{SmtpError, SmtpLimits};
pub use response::SmtpResponse;
pub use server::{DEFAULT_TIMEOUT, SmtpServer};
pub use session::{SmtpSession, SmtpState};
