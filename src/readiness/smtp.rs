// src/readiness/smtp.rs
use super::dependency::{CheckError, CheckOutcome, Dependency};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Dependency on a mail relay.
///
/// Connects, waits for the `220` service-ready greeting and says `QUIT`.
/// No message is sent.
#[derive(Debug, Clone)]
pub struct SmtpDependency {
    name: String,
    host: String,
    port: u16,
}

impl SmtpDependency {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl Dependency for SmtpDependency {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<CheckOutcome, CheckError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let mut greeting = String::new();
        reader.read_line(&mut greeting).await?;
        let greeting = greeting.trim_end().to_string();

        if !greeting.starts_with("220") {
            return Err(CheckError::UnexpectedGreeting(greeting));
        }

        // Best effort; the relay already proved it is serving.
        if let Err(e) = writer.write_all(b"QUIT\r\n").await {
            tracing::debug!(dependency = %self.name, error = %e, "SMTP QUIT failed");
        }

        Ok(CheckOutcome::ready(format!(
            "SMTP server {}:{} ready: {}",
            self.host, self.port, greeting
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn fake_relay(greeting: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(greeting.as_bytes()).await.unwrap();
            let mut buf = [0u8; 16];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
        });

        port
    }

    #[tokio::test]
    async fn test_ready_on_220_greeting() {
        let port = fake_relay("220 mail.example.org ESMTP\r\n").await;
        let dep = SmtpDependency::new("smtp", "127.0.0.1", port);

        let outcome = dep.check().await.unwrap();
        assert!(outcome.ready);
        assert_eq!(
            outcome.message,
            format!("SMTP server 127.0.0.1:{} ready: 220 mail.example.org ESMTP", port)
        );
    }

    #[tokio::test]
    async fn test_error_on_other_greeting() {
        let port = fake_relay("554 no service\r\n").await;
        let dep = SmtpDependency::new("smtp", "127.0.0.1", port);

        let err = dep.check().await.unwrap_err();
        assert_eq!(err.kind(), "smtp");
        assert!(err.to_string().contains("554 no service"));
    }

    #[tokio::test]
    async fn test_error_when_nothing_listens() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dep = SmtpDependency::new("smtp", "127.0.0.1", port);
        assert_eq!(dep.check().await.unwrap_err().kind(), "io");
    }
}
