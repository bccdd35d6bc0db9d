//! SMTP server implementation

use crate::mime::Email;
use crate::preview::Previewer;
use crate::smtp::auth::Credentials;
use crate::smtp::commands::SmtpCommandHandler;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SmtpSession;

use log::{debug, error, info, warn};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

/// Read and write timeout applied to every connection
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// SMTP server that previews every accepted message and then sends it to a
/// channel
#[derive(Debug, Clone)]
pub struct SmtpServer {
    /// Server hostname
    hostname: String,
    credentials: Option<Credentials>,
    require_auth: bool,
    timeout: Option<Duration>,
    previewer: Arc<Previewer>,
}

impl SmtpServer {
    /// Create a new SMTP server
    pub fn new(hostname: &str, previewer: Previewer) -> Self {
        Self {
            hostname: hostname.to_owned(),
            credentials: None,
            require_auth: false,
            timeout: Some(DEFAULT_TIMEOUT),
            previewer: Arc::new(previewer),
        }
    }

    /// Accept AUTH PLAIN with these credentials
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Refuse MAIL, RCPT and DATA until the client has authenticated
    pub fn with_require_auth(mut self, require_auth: bool) -> Self {
        self.require_auth = require_auth;
        self
    }

    /// Close connections that stay silent, or stop reading, for this long.
    /// `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Start the server on the specified address (blocking)
    /// Emails will be sent to the provided channel as they are received
    pub fn start(&self, addr: &str, email_sender: mpsc::Sender<Email>) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener, email_sender)
    }

    /// Start the server with an existing listener (blocking)
    /// Emails will be sent to the provided channel as they are received
    pub fn start_with_listener(
        &self,
        listener: TcpListener,
        email_sender: mpsc::Sender<Email>,
    ) -> Result<(), SmtpError> {
        info!(
            "SMTP server listening on {}, previews in {}",
            listener.local_addr()?,
            self.previewer.dir().display()
        );

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let server = self.clone();
                    let email_sender = email_sender.clone();
                    thread::spawn(move || {
                        if let Err(e) = server.handle_client(stream, &email_sender) {
                            warn!("Error handling client: {e}");
                        }
                    });
                }
                Err(e) => {
                    warn!("Error accepting connection: {e}");
                }
            }
        }

        Ok(())
    }

    /// Handle a client connection
    fn handle_client(
        &self,
        mut stream: TcpStream,
        email_sender: &mpsc::Sender<Email>,
    ) -> Result<(), SmtpError> {
        if let Ok(peer) = stream.peer_addr() {
            debug!("Connection from {peer}");
        }

        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;

        let command_handler = SmtpCommandHandler::new(&self.hostname)
            .with_auth(self.credentials.as_ref(), self.require_auth);
        let mut session = SmtpSession::new();
        let mut reader = BufReader::new(stream.try_clone()?);

        // Send greeting
        self.send_response(&mut stream, &SmtpResponse::greeting(&self.hostname))?;

        let mut line_buffer = Vec::new();
        loop {
            line_buffer.clear();

            match reader.read_until(b'\n', &mut line_buffer) {
                Ok(0) => break, // Connection closed
                Ok(_) => {
                    // Message data is kept as raw bytes, only the line ending goes
                    if session.in_data_mode {
                        let line = strip_line_ending(&line_buffer);
                        match self.handle_data_line(line, &mut session, email_sender) {
                            Ok(Some(response)) => {
                                self.send_response(&mut stream, &response)?;
                            }
                            Ok(None) => {
                                // Continue collecting data
                            }
                            Err(e) => {
                                let response = SmtpResponse::error(
                                    e.to_response_code(),
                                    &e.to_response_message(),
                                );
                                self.send_response(&mut stream, &response)?;
                                session.reset();
                            }
                        }
                        continue;
                    }

                    let line = String::from_utf8_lossy(&line_buffer);
                    let command = line.trim();
                    if command.is_empty() && !session.awaiting_auth {
                        continue;
                    }

                    let result = if session.awaiting_auth {
                        command_handler.process_auth_response(command, &mut session)
                    } else {
                        command_handler.process_command(command, &mut session)
                    };

                    match result {
                        Ok(response) => {
                            self.send_response(&mut stream, &response)?;
                            if response.code == "221" {
                                break; // QUIT command
                            }
                        }
                        Err(e) => {
                            let response = SmtpResponse::error(
                                e.to_response_code(),
                                &e.to_response_message(),
                            );
                            self.send_response(&mut stream, &response)?;

                            // Don't automatically reset on all 5xx errors
                            // Let the command handler manage session state
                        }
                    }
                }
                Err(e) if is_timeout(&e) => {
                    info!("Closing idle connection");
                    let response = SmtpResponse::error("421", "Timeout, closing connection");
                    let _ = self.send_response(&mut stream, &response);
                    break;
                }
                Err(e) => {
                    warn!("Error reading from client: {e}");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a line of data during DATA mode.
    ///
    /// Errors on individual lines are held until the terminator so the rest
    /// of the message is still consumed.
    fn handle_data_line(
        &self,
        line: &[u8],
        session: &mut SmtpSession,
        email_sender: &mpsc::Sender<Email>,
    ) -> Result<Option<SmtpResponse>, SmtpError> {
        if line != b"." {
            if session.data_error.is_none() {
                if let Err(e) = session.add_data_line(line) {
                    debug!("Rejecting message data: {e}");
                    session.data_error = Some(e);
                }
            }
            return Ok(None);
        }

        let mut email = session.finish_data_collection()?;
        self.process(&mut email)?;

        // Errors when there are no listeners.
        // We ignore these errors for now.
        let _ = email_sender.send(email);
        Ok(Some(SmtpResponse::ok()))
    }

    /// Run a completed message through the preview pipeline
    fn process(&self, email: &mut Email) -> Result<(), SmtpError> {
        match self.previewer.process(email) {
            Ok(previews) => {
                info!(
                    "Captured message from <{}> to {:?}: {} preview(s), {} attachment(s)",
                    email.envelope.sender,
                    email.envelope.recipients,
                    previews.len(),
                    email.attachments.len()
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to process message from <{}>: {e}",
                    email.envelope.sender
                );
                Err(SmtpError::TransactionFailed(e.to_string()))
            }
        }
    }

    /// Send a response to the client
    fn send_response(
        &self,
        stream: &mut TcpStream,
        response: &SmtpResponse,
    ) -> Result<(), SmtpError> {
        // Ensure response doesn't exceed maximum line length
        let formatted = response.format();
        if formatted.len() > SmtpLimits::REPLY_LINE_MAX_LENGTH {
            // Truncate message if too long
            let truncated_response =
                SmtpResponse::new(&response.code, "Response too long (truncated)");
            stream.write_all(truncated_response.format().as_bytes())?;
        } else {
            stream.write_all(formatted.as_bytes())?;
        }
        stream.flush()?;
        Ok(())
    }
}

/// Blocking reads report an expired timeout as either kind, depending on the
/// platform
fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Drop the trailing LF or CRLF of a line
fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
