//! Implementation of SMTP commands

use crate::smtp::auth::Credentials;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SmtpSession;

/// Handles SMTP commands and returns appropriate responses
#[derive(Debug)]
pub struct SmtpCommandHandler<'a> {
    hostname: &'a str,
    credentials: Option<&'a Credentials>,
    require_auth: bool,
}

impl<'a> SmtpCommandHandler<'a> {
    /// Create a new command handler
    pub fn new(hostname: &'a str) -> Self {
        Self {
            hostname,
            credentials: None,
            require_auth: false,
        }
    }

    /// Accept AUTH PLAIN with `credentials`, optionally requiring it before MAIL
    pub fn with_auth(mut self, credentials: Option<&'a Credentials>, require_auth: bool) -> Self {
        self.credentials = credentials;
        self.require_auth = require_auth && credentials.is_some();
        self
    }

    /// Process a command line and return a response
    pub fn process_command(
        &self,
        command_line: &str,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        // Check command line length
        if command_line.len() > SmtpLimits::COMMAND_LINE_MAX_LENGTH {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::COMMAND_LINE_MAX_LENGTH,
            });
        }

        let parts: Vec<&str> = command_line.split_whitespace().collect();
        if parts.is_empty() {
            return Err(SmtpError::InvalidCommand);
        }

        let cmd = parts[0].to_uppercase();

        match cmd.as_str() {
            "HELO" => self.handle_helo(parts, session),
            "EHLO" => self.handle_ehlo(parts, session),
            "AUTH" => self.handle_auth(parts, session),
            "MAIL" => self.handle_mail(parts, session),
            "RCPT" => self.handle_rcpt(parts, session),
            "DATA" => self.handle_data(parts, session),
            "RSET" => self.handle_rset(session),
            "NOOP" => self.handle_noop(),
            "QUIT" => self.handle_quit(),
            _ => Err(SmtpError::InvalidCommand),
        }
    }

    /// Process the client's reply to a 334 AUTH PLAIN challenge
    pub fn process_auth_response(
        &self,
        line: &str,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        session.awaiting_auth = false;

        if line.trim() == "*" {
            return Err(SmtpError::InvalidSyntax(
                "authentication cancelled".to_string(),
            ));
        }

        self.authenticate(line, session)
    }

    /// Handle HELO command
    fn handle_helo(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        let client_domain = self.greet(&parts, session)?;
        Ok(SmtpResponse::helo(self.hostname, &client_domain))
    }

    /// Handle EHLO command
    fn handle_ehlo(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        let client_domain = self.greet(&parts, session)?;
        Ok(SmtpResponse::ehlo(
            self.hostname,
            &client_domain,
            self.credentials.is_some(),
        ))
    }

    fn greet(&self, parts: &[&str], session: &mut SmtpSession) -> Result<String, SmtpError> {
        if parts.len() < 2 {
            return Err(SmtpError::InvalidSyntax(format!(
                "{} requires domain argument",
                parts[0].to_uppercase()
            )));
        }

        let client_domain = parts[1].to_string();
        session.set_client_domain(client_domain.clone())?;
        Ok(client_domain)
    }

    /// Handle AUTH command
    fn handle_auth(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        if self.credentials.is_none() {
            return Err(SmtpError::InvalidState(
                "AUTH not available".to_string(),
            ));
        }

        if session.authenticated {
            return Err(SmtpError::InvalidState("Already authenticated".to_string()));
        }

        if !session.can_execute_command("AUTH") {
            return Err(SmtpError::InvalidState(
                "AUTH command requires EHLO first and no open transaction".to_string(),
            ));
        }

        let Some(mechanism) = parts.get(1) else {
            return Err(SmtpError::InvalidSyntax(
                "AUTH requires mechanism argument".to_string(),
            ));
        };

        if !mechanism.eq_ignore_ascii_case("PLAIN") {
            return Err(SmtpError::UnsupportedAuthMechanism(mechanism.to_string()));
        }

        match parts.get(2) {
            // "=" stands for an empty initial response
            Some(&"=") => self.authenticate("", session),
            Some(initial) => self.authenticate(initial, session),
            None => {
                session.awaiting_auth = true;
                Ok(SmtpResponse::auth_challenge())
            }
        }
    }

    fn authenticate(
        &self,
        encoded: &str,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        let credentials = self
            .credentials
            .ok_or_else(|| SmtpError::InvalidState("AUTH not available".to_string()))?;

        credentials.verify_plain(encoded)?;
        session.authenticated = true;
        Ok(SmtpResponse::auth_success())
    }

    /// Handle MAIL command
    fn handle_mail(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        self.check_authenticated(session)?;

        if !session.can_execute_command("MAIL") {
            return Err(SmtpError::InvalidState(
                "MAIL command requires HELO first".to_string(),
            ));
        }

        if parts.len() < 2 {
            return Err(SmtpError::InvalidSyntax(
                "MAIL requires FROM argument".to_string(),
            ));
        }

        let from_part = parts[1..].join(" ");
        if !from_part.to_uppercase().starts_with("FROM:") {
            return Err(SmtpError::InvalidSyntax(
                "MAIL command must be 'MAIL FROM:<address>'".to_string(),
            ));
        }

        let addr = parse_path(&from_part[5..], "FROM")?;

        // Validate email address components
        self.validate_email_address(&addr)?;

        session.set_sender(addr)?;

        Ok(SmtpResponse::ok())
    }

    /// Handle RCPT command
    fn handle_rcpt(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        self.check_authenticated(session)?;

        if !session.can_execute_command("RCPT") {
            return Err(SmtpError::InvalidState(
                "RCPT command requires MAIL first".to_string(),
            ));
        }

        if parts.len() < 2 {
            return Err(SmtpError::InvalidSyntax(
                "RCPT requires TO argument".to_string(),
            ));
        }

        let to_part = parts[1..].join(" ");
        if !to_part.to_uppercase().starts_with("TO:") {
            return Err(SmtpError::InvalidSyntax(
                "RCPT command must be 'RCPT TO:<address>'".to_string(),
            ));
        }

        let addr = parse_path(&to_part[3..], "TO")?;

        // Validate email address components
        self.validate_email_address(&addr)?;

        session.add_recipient(addr)?;

        Ok(SmtpResponse::ok())
    }

    /// Handle DATA command
    fn handle_data(
        &self,
        parts: Vec<&str>,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        self.check_authenticated(session)?;

        if !session.can_execute_command("DATA") {
            return Err(SmtpError::InvalidState(
                "DATA command requires RCPT first".to_string(),
            ));
        }

        if parts.len() > 1 {
            return Err(SmtpError::InvalidSyntax(
                "DATA command takes no arguments".to_string(),
            ));
        }

        session.start_data_mode()?;

        Ok(SmtpResponse::data_start())
    }

    /// Handle RSET command
    fn handle_rset(&self, session: &mut SmtpSession) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("RSET") {
            return Err(SmtpError::InvalidState(
                "RSET command requires HELO first".to_string(),
            ));
        }

        session.reset();
        Ok(SmtpResponse::ok())
    }

    /// Handle NOOP command
    fn handle_noop(&self) -> Result<SmtpResponse, SmtpError> {
        Ok(SmtpResponse::ok())
    }

    /// Handle QUIT command
    fn handle_quit(&self) -> Result<SmtpResponse, SmtpError> {
        Ok(SmtpResponse::quit())
    }

    fn check_authenticated(&self, session: &SmtpSession) -> Result<(), SmtpError> {
        if self.require_auth && !session.authenticated {
            return Err(SmtpError::AuthRequired);
        }
        Ok(())
    }

    /// Validate email address format and size limits
    fn validate_email_address(&self, addr: &str) -> Result<(), SmtpError> {
        // Check for @ symbol
        if let Some(at_pos) = addr.find('@') {
            let user_part = &addr[..at_pos];
            let domain_part = &addr[at_pos + 1..];

            // Check user part length
            if user_part.len() > SmtpLimits::USER_MAX_LENGTH {
                return Err(SmtpError::UserTooLong {
                    max: SmtpLimits::USER_MAX_LENGTH,
                });
            }

            // Check domain part length
            if domain_part.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
                return Err(SmtpError::DomainTooLong {
                    max: SmtpLimits::DOMAIN_MAX_LENGTH,
                });
            }

            // Basic validation - must have user and domain parts
            if user_part.is_empty() || domain_part.is_empty() {
                return Err(SmtpError::InvalidSyntax(
                    "Invalid email address format".to_string(),
                ));
            }
        } else {
            return Err(SmtpError::InvalidSyntax(
                "Email address must contain @ symbol".to_string(),
            ));
        }

        Ok(())
    }
}

/// Address between the angle brackets of a MAIL or RCPT argument.
///
/// ESMTP parameters after the closing bracket are accepted and ignored.
fn parse_path(argument: &str, kind: &str) -> Result<String, SmtpError> {
    let argument = argument.trim();
    let Some(close) = argument.find('>').filter(|_| argument.starts_with('<')) else {
        return Err(SmtpError::InvalidSyntax(format!(
            "{kind} address must be enclosed in angle brackets"
        )));
    };

    let addr = &argument[1..close];
    if addr.is_empty() {
        return Err(SmtpError::InvalidSyntax(format!(
            "{kind} address cannot be empty"
        )));
    }

    Ok(addr.to_string())
}
