//! SMTP session state management

use crate::mime::Email;
use crate::smtp::error::{SmtpError, SmtpLimits};

/// Represents the current state of an SMTP session
#[derive(Debug, Clone, PartialEq)]
pub enum SmtpState {
    /// Initial state - waiting for HELO
    Initial,
    /// HELO received - ready for MAIL command
    GreetingReceived,
    /// MAIL FROM received - ready for RCPT commands
    MailReceived,
    /// At least one RCPT TO received - ready for DATA or more RCPT commands
    RecipientsReceived,
    /// DATA command received - collecting email data
    DataMode,
}

/// Manages the state and data for a single SMTP session
#[derive(Debug)]
pub struct SmtpSession {
    /// Current state of the session
    pub state: SmtpState,
    /// Message being captured: envelope and raw DATA payload
    pub email: Email,
    /// Whether we're currently in data collection mode
    pub in_data_mode: bool,
    /// Total size of data collected so far
    pub data_size: usize,
    /// First error hit while collecting data, reported at the terminator
    pub data_error: Option<SmtpError>,
    /// Client domain from HELO command
    pub client_domain: Option<String>,
    /// Whether AUTH succeeded on this connection
    pub authenticated: bool,
    /// Whether the next line is an AUTH PLAIN response
    pub awaiting_auth: bool,
}

impl SmtpSession {
    /// Create a new SMTP session
    pub fn new() -> Self {
        Self {
            state: SmtpState::Initial,
            email: Email::new(),
            in_data_mode: false,
            data_size: 0,
            data_error: None,
            client_domain: None,
            authenticated: false,
            awaiting_auth: false,
        }
    }

    /// Reset the session to post-HELO state (clears transaction data)
    pub fn reset(&mut self) {
        self.state = SmtpState::GreetingReceived;
        self.email.reset();
        self.in_data_mode = false;
        self.data_size = 0;
        self.data_error = None;
        // Keep client_domain and authentication, both outlive a transaction
    }

    /// Sender address from MAIL FROM, if a transaction is open
    pub fn sender(&self) -> Option<&str> {
        let sender = self.email.envelope.sender.as_str();
        (!sender.is_empty()).then_some(sender)
    }

    /// Recipients from RCPT TO
    pub fn recipients(&self) -> &[String] {
        &self.email.envelope.recipients
    }

    /// Set the sender address
    pub fn set_sender(&mut self, sender: String) -> Result<(), SmtpError> {
        if sender.len() > SmtpLimits::PATH_MAX_LENGTH {
            return Err(SmtpError::PathTooLong {
                max: SmtpLimits::PATH_MAX_LENGTH,
            });
        }

        self.email.reset();
        self.email.envelope.sender = sender;
        self.data_size = 0;
        self.state = SmtpState::MailReceived;
        Ok(())
    }

    /// Add a recipient address
    pub fn add_recipient(&mut self, recipient: String) -> Result<(), SmtpError> {
        if recipient.len() > SmtpLimits::PATH_MAX_LENGTH {
            return Err(SmtpError::PathTooLong {
                max: SmtpLimits::PATH_MAX_LENGTH,
            });
        }

        if self.email.envelope.recipients.len() >= SmtpLimits::MAX_RECIPIENTS {
            return Err(SmtpError::TooManyRecipients {
                max: SmtpLimits::MAX_RECIPIENTS,
            });
        }

        self.email.envelope.recipients.push(recipient);
        self.state = SmtpState::RecipientsReceived;
        Ok(())
    }

    /// Start data collection mode
    pub fn start_data_mode(&mut self) -> Result<(), SmtpError> {
        if self.state != SmtpState::RecipientsReceived {
            return Err(SmtpError::InvalidState(
                "DATA command requires RCPT first".to_string(),
            ));
        }

        self.in_data_mode = true;
        self.email.raw_body.clear();
        self.data_size = 0;
        self.data_error = None;
        self.state = SmtpState::DataMode;
        Ok(())
    }

    /// Add a line of data, without its line ending, during data collection.
    ///
    /// A leading dot added by the client for transparency is removed and the
    /// line is stored with a CRLF ending.
    pub fn add_data_line(&mut self, line: &[u8]) -> Result<(), SmtpError> {
        let line_size = line.len() + 2; // +2 for CRLF

        if line_size > SmtpLimits::TEXT_LINE_MAX_LENGTH {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::TEXT_LINE_MAX_LENGTH,
            });
        }

        if self.data_size + line_size > SmtpLimits::MAX_DATA_SIZE {
            return Err(SmtpError::TooMuchData {
                max: SmtpLimits::MAX_DATA_SIZE,
            });
        }

        let line = line.strip_prefix(b".").unwrap_or(line);
        self.email.raw_body.extend_from_slice(line);
        self.email.raw_body.extend_from_slice(b"\r\n");
        self.data_size += line_size;
        Ok(())
    }

    /// Finish data collection and hand over the captured email
    pub fn finish_data_collection(&mut self) -> Result<Email, SmtpError> {
        if !self.in_data_mode {
            return Err(SmtpError::InvalidState(
                "Not in data collection mode".to_string(),
            ));
        }

        if let Some(e) = self.data_error.take() {
            return Err(e);
        }

        if self.sender().is_none() {
            return Err(SmtpError::InvalidState("No sender specified".to_string()));
        }

        if self.recipients().is_empty() {
            return Err(SmtpError::InvalidState(
                "No recipients specified".to_string(),
            ));
        }

        let email = std::mem::take(&mut self.email);

        self.in_data_mode = false;
        self.data_size = 0;
        self.state = SmtpState::GreetingReceived;
        Ok(email)
    }

    /// Set the client domain from HELO command
    pub fn set_client_domain(&mut self, domain: String) -> Result<(), SmtpError> {
        if domain.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
            return Err(SmtpError::DomainTooLong {
                max: SmtpLimits::DOMAIN_MAX_LENGTH,
            });
        }

        self.client_domain = Some(domain);
        self.reset(); // Clear any existing transaction
        Ok(())
    }

    /// Check if the session is ready for a specific command
    pub fn can_execute_command(&self, command: &str) -> bool {
        match command.to_uppercase().as_str() {
            "HELO" | "EHLO" => true, // Can be sent at any time
            "AUTH" => self.state == SmtpState::GreetingReceived && !self.authenticated,
            "MAIL" => self.state == SmtpState::GreetingReceived,
            "RCPT" => {
                self.state == SmtpState::MailReceived || self.state == SmtpState::RecipientsReceived
            }
            "DATA" => self.state == SmtpState::RecipientsReceived,
            "RSET" => self.state != SmtpState::Initial,
            "NOOP" => true, // NOOP can be sent at any time
            "QUIT" => true, // QUIT can be sent at any time
            _ => false,
        }
    }
}

impl Default for SmtpSession {
    fn default() -> Self {
        Self::new()
    }
}
