//! Integration tests driving the server over TCP: limits, authentication,
//! and the preview pipeline end to end

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use peekmail::{Credentials, Email, NoopLauncher, Previewer, Renderer, SmtpLimits, SmtpServer};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const MULTIPART_MESSAGE: &str = "From: Alice <alice@example.com>\r\n\
To: bob@example.com, carol@example.com\r\n\
Subject: =?UTF-8?B?UXVhcnRlcmx5?= =?UTF-8?B?IHJlcG9ydA==?=\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
This is a multi-part message in MIME format.\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Numbers attached.\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
<p style=3D\"color: red\">Numbers attached.</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf; name=\"fallback.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-Disposition: attachment; filename=\"=?ISO-8859-1?B?cmFwcG9ydA==?=\"\r\n\
\r\n\
JVBERi0x\r\n\
LjQ=\r\n\
--outer--\r\n";

fn start_server(server: SmtpServer) -> (String, mpsc::Receiver<Email>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (tx, rx) = mpsc::channel::<Email>();

    // Start server in background thread
    thread::spawn(move || {
        if let Err(e) = server.start_with_listener(listener, tx) {
            eprintln!("Error starting server: {e}");
        }
    });

    (addr, rx)
}

fn start_test_server() -> (String, mpsc::Receiver<Email>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let server = SmtpServer::new("test.local", Previewer::new(dir.path(), NoopLauncher));
    let (addr, rx) = start_server(server);
    (addr, rx, dir)
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        let mut client = Self { stream, reader };

        let greeting = client.read_reply();
        assert!(greeting.starts_with("220"), "greeting: {greeting}");
        client
    }

    /// Read a reply, joining the lines of a multiline reply
    fn read_reply(&mut self) -> String {
        let mut reply = String::new();
        loop {
            let mut line = String::new();
            self.reader.read_line(&mut line).unwrap();
            reply.push_str(&line);
            if line.len() < 4 || line.as_bytes()[3] != b'-' {
                return reply.trim_end().to_string();
            }
        }
    }

    fn command(&mut self, command: &str) -> String {
        write!(self.stream, "{command}\r\n").unwrap();
        self.stream.flush().unwrap();
        self.read_reply()
    }

    /// Send a message payload followed by the terminator
    fn data(&mut self, message: &str) -> String {
        let response = self.command("DATA");
        assert!(response.starts_with("354"), "DATA: {response}");

        self.stream.write_all(message.as_bytes()).unwrap();
        self.stream.write_all(b".\r\n").unwrap();
        self.stream.flush().unwrap();
        self.read_reply()
    }

    fn envelope(&mut self, from: &str, to: &str) {
        let response = self.command(&format!("MAIL FROM:<{from}>"));
        assert!(response.starts_with("250"), "MAIL: {response}");
        let response = self.command(&format!("RCPT TO:<{to}>"));
        assert!(response.starts_with("250"), "RCPT: {response}");
    }
}

#[test]
fn test_command_line_length_limit() {
    let (addr, _rx, _dir) = start_test_server();
    let mut client = Client::connect(&addr);

    let long_command = "HELO ".to_string() + &"a".repeat(SmtpLimits::COMMAND_LINE_MAX_LENGTH);
    let response = client.command(&long_command);
    assert!(response.starts_with("500")); // Line too long

    client.command("QUIT");
}

#[test]
fn test_domain_name_length_limit() {
    let (addr, _rx, _dir) = start_test_server();
    let mut client = Client::connect(&addr);

    let long_domain = "a".repeat(SmtpLimits::DOMAIN_MAX_LENGTH + 1);
    let response = client.command(&format!("HELO {long_domain}"));
    assert!(response.starts_with("501")); // Domain too long

    client.command("QUIT");
}

#[test]
fn test_email_address_component_limits() {
    let (addr, _rx, _dir) = start_test_server();
    let mut client = Client::connect(&addr);
    client.command("HELO client.local");

    let long_user = "a".repeat(SmtpLimits::USER_MAX_LENGTH + 1);
    let response = client.command(&format!("MAIL FROM:<{long_user}@example.com>"));
    assert!(response.starts_with("501"));

    let response = client.command("MAIL FROM:<no-at-sign>");
    assert!(response.starts_with("501"));

    client.command("QUIT");
}

#[test]
fn test_ehlo_capabilities() {
    let (addr, _rx, _dir) = start_test_server();
    let mut client = Client::connect(&addr);

    let response = client.command("EHLO client.local");
    assert!(response.starts_with("250-test.local Hello client.local"));
    assert!(response.contains("250-PIPELINING"));
    assert!(response.ends_with(&format!("250 SIZE {}", SmtpLimits::MAX_DATA_SIZE)));

    client.command("QUIT");
}

#[test]
fn test_multipart_message_is_previewed() {
    let (addr, rx, dir) = start_test_server();
    let mut client = Client::connect(&addr);

    client.command("EHLO client.local");
    client.envelope("alice@example.com", "bob@example.com");
    let response = client.data(MULTIPART_MESSAGE);
    assert!(response.starts_with("250"), "end of data: {response}");
    client.command("QUIT");

    let email = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(email.envelope.sender, "alice@example.com");
    assert_eq!(email.subject, "Quarterly report");
    assert_eq!(email.from, "Alice <alice@example.com>");
    assert_eq!(email.to, vec!["bob@example.com", "carol@example.com"]);

    assert_eq!(email.bodies.len(), 2);
    assert_eq!(email.bodies[0].content_type, "text/plain");
    assert_eq!(email.bodies[0].content, "Numbers attached.");
    assert_eq!(email.bodies[1].content_type, "text/html");
    assert_eq!(
        email.bodies[1].content,
        "<p style=\"color: red\">Numbers attached.</p>"
    );

    assert_eq!(email.attachments.len(), 1);
    let attachment = &email.attachments[0];
    assert_eq!(attachment.name, "rapport");
    assert_eq!(attachment.content_type, "application/pdf");
    assert_eq!(attachment.data, b"%PDF-1.4");

    let saved = attachment.path.clone().unwrap();
    assert_eq!(saved.parent(), Some(dir.path()));
    assert_eq!(fs::read(&saved).unwrap(), b"%PDF-1.4");

    // One attachment and one preview per body
    let files = files_in(dir.path());
    assert_eq!(files.len(), 3);
    let html = files
        .iter()
        .find(|p| p.extension().is_some_and(|e| e == "html"))
        .unwrap();
    let html = fs::read_to_string(html).unwrap();
    assert!(html.contains("<p style=\"color: red\">Numbers attached.</p>"));
    assert!(html.contains("Quarterly report"));
    assert!(html.contains("rapport</a> (application/pdf, 8 bytes)"));
}

#[test]
fn test_content_type_allow_list() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Renderer::new(dir.path()).with_content_types(vec!["text/html".to_string()]);
    let previewer = Previewer::new(dir.path(), NoopLauncher).with_renderer(renderer);
    let (addr, rx) = start_server(SmtpServer::new("test.local", previewer));

    let mut client = Client::connect(&addr);
    client.command("HELO client.local");
    client.envelope("alice@example.com", "bob@example.com");
    assert!(client.data(MULTIPART_MESSAGE).starts_with("250"));

    let email = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    // Both bodies are parsed, only the allowed one is rendered
    assert_eq!(email.bodies.len(), 2);

    let files = files_in(dir.path());
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|p| p.extension().is_some_and(|e| e == "html")));
    assert!(!files.iter().any(|p| p.extension().is_some_and(|e| e == "txt")));
}

#[test]
fn test_previews_are_launched() {
    let dir = tempfile::tempdir().unwrap();
    let opened = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&opened);
    let previewer = Previewer::new(dir.path(), move |path: &Path| -> std::io::Result<()> {
        recorder.lock().unwrap().push(path.to_path_buf());
        Ok(())
    });
    let (addr, rx) = start_server(SmtpServer::new("test.local", previewer));

    let mut client = Client::connect(&addr);
    client.command("HELO client.local");
    client.envelope("alice@example.com", "bob@example.com");
    assert!(client.data(MULTIPART_MESSAGE).starts_with("250"));
    rx.recv_timeout(Duration::from_secs(1)).unwrap();

    let opened = opened.lock().unwrap();
    assert_eq!(opened.len(), 2);
    assert!(opened.iter().all(|p| p.parent() == Some(dir.path())));
}

#[test]
fn test_message_without_bodies_is_rejected() {
    let (addr, rx, dir) = start_test_server();
    let mut client = Client::connect(&addr);
    client.command("HELO client.local");
    client.envelope("alice@example.com", "bob@example.com");

    let response = client.data(
        "Subject: only an attachment\r\n\
Content-Type: multipart/mixed; boundary=B\r\n\
\r\n\
--B\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"a.pdf\"\r\n\
\r\n\
%PDF\r\n\
--B--\r\n",
    );
    assert!(response.starts_with("554"), "end of data: {response}");
    assert!(response.contains("no email bodies found"));

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn test_corrupt_attachment_is_rejected() {
    let (addr, rx, dir) = start_test_server();
    let mut client = Client::connect(&addr);
    client.command("HELO client.local");
    client.envelope("alice@example.com", "bob@example.com");

    let response = client.data(
        "Content-Type: multipart/mixed; boundary=B\r\n\
\r\n\
--B\r\n\
Content-Type: text/plain\r\n\
\r\n\
hello\r\n\
--B\r\n\
Content-Type: application/pdf\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
@@@@\r\n\
--B--\r\n",
    );
    assert!(response.starts_with("554"), "end of data: {response}");

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(files_in(dir.path()).is_empty());

    // The connection stays usable
    client.envelope("alice@example.com", "bob@example.com");
    let response = client.data("Content-Type: text/plain\r\n\r\nsecond try\r\n");
    assert!(response.starts_with("250"));
    let email = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(email.bodies[0].content, "second try\r\n");
}

#[test]
fn test_auth_required() {
    let dir = tempfile::tempdir().unwrap();
    let server = SmtpServer::new("test.local", Previewer::new(dir.path(), NoopLauncher))
        .with_credentials(Credentials::new("username", "password"))
        .with_require_auth(true);
    let (addr, rx) = start_server(server);

    let mut client = Client::connect(&addr);
    let response = client.command("EHLO client.local");
    assert!(response.ends_with("250 AUTH PLAIN"));

    let response = client.command("MAIL FROM:<alice@example.com>");
    assert!(response.starts_with("530"));

    let wrong = STANDARD.encode("\0username\0wrong");
    let response = client.command(&format!("AUTH PLAIN {wrong}"));
    assert!(response.starts_with("535"));

    let response = client.command("AUTH PLAIN");
    assert!(response.starts_with("334"));
    let response = client.command(&STANDARD.encode("\0username\0password"));
    assert!(response.starts_with("235"));

    client.envelope("alice@example.com", "bob@example.com");
    let response = client.data("Content-Type: text/plain\r\n\r\nauthenticated\r\n");
    assert!(response.starts_with("250"));

    let email = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(email.bodies[0].content, "authenticated\r\n");
}

#[test]
fn test_concurrent_connections() {
    let (addr, rx, dir) = start_test_server();

    let clients: Vec<_> = (0..4)
        .map(|i| {
            let addr = addr.clone();
            thread::spawn(move || {
                let mut client = Client::connect(&addr);
                client.command("HELO client.local");
                client.envelope(&format!("sender{i}@example.com"), "bob@example.com");
                let response =
                    client.data(&format!("Subject: message {i}\r\nContent-Type: text/plain\r\n\r\nbody {i}\r\n"));
                assert!(response.starts_with("250"));
                client.command("QUIT");
            })
        })
        .collect();

    for client in clients {
        client.join().unwrap();
    }

    let mut subjects: Vec<String> = (0..4)
        .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap().subject)
        .collect();
    subjects.sort();
    assert_eq!(
        subjects,
        vec!["message 0", "message 1", "message 2", "message 3"]
    );
    assert_eq!(files_in(dir.path()).len(), 4);
}

#[test]
fn test_rset_discards_transaction() {
    let (addr, rx, _dir) = start_test_server();
    let mut client = Client::connect(&addr);
    client.command("HELO client.local");

    client.envelope("first@example.com", "bob@example.com");
    assert!(client.command("RSET").starts_with("250"));

    client.envelope("second@example.com", "carol@example.com");
    assert!(
        client
            .data("Content-Type: text/plain\r\n\r\nafter reset\r\n")
            .starts_with("250")
    );

    let email = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(email.envelope.sender, "second@example.com");
    assert_eq!(email.envelope.recipients, vec!["carol@example.com"]);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_idle_connection_is_closed() {
    let dir = tempfile::tempdir().unwrap();
    let server = SmtpServer::new("test.local", Previewer::new(dir.path(), NoopLauncher))
        .with_timeout(Some(Duration::from_millis(200)));
    let (addr, _rx) = start_server(server);

    let mut client = Client::connect(&addr);
    client.command("HELO client.local");

    thread::sleep(Duration::from_millis(500));
    assert!(client.read_reply().starts_with("421"));

    let mut rest = String::new();
    assert_eq!(client.reader.read_line(&mut rest).unwrap(), 0);
}

#[test]
fn test_active_connection_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let server = SmtpServer::new("test.local", Previewer::new(dir.path(), NoopLauncher))
        .with_timeout(Some(Duration::from_millis(300)));
    let (addr, _rx) = start_server(server);

    let mut client = Client::connect(&addr);
    for _ in 0..4 {
        thread::sleep(Duration::from_millis(100));
        assert!(client.command("NOOP").starts_with("250"));
    }
    assert!(client.command("QUIT").starts_with("221"));
}
