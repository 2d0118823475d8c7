use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

use crate::config::SessionConfig;

use super::body::generate_body;
use super::error::{SessionError, Stage};
use super::reply::Reply;

/// Outcome of a successful transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    /// Connect through QUIT.
    pub latency: Duration,
    /// Generated body bytes written during DATA.
    pub bytes_sent: u64,
}

/// Runs one SMTP transaction per call over a fresh connection.
///
/// Cheap to clone; holds no per-connection state.
#[derive(Debug, Clone)]
pub struct SmtpClient {
    config: Arc<SessionConfig>,
}

impl Default for SmtpClient {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SmtpClient {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connect, greet, send one message of about `body_size` bytes, QUIT, close.
    ///
    /// The first failing step ends the transaction and the connection is closed best-effort.
    /// A failed QUIT does not fail the transaction.
    pub async fn execute(
        &self,
        host: &str,
        port: u16,
        body_size: usize,
    ) -> Result<Transaction, SessionError> {
        let started = Instant::now();
        let cfg = self.config.as_ref();

        let stream = match timeout(cfg.connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(SessionError::Io {
                    stage: Stage::Connect,
                    source,
                });
            }
            Err(_) => {
                return Err(SessionError::Timeout {
                    stage: Stage::Connect,
                    timeout: cfg.connect_timeout,
                });
            }
        };
        let _ = stream.set_nodelay(true);

        let mut session = Session::new(stream, cfg);
        match session.deliver(body_size).await {
            Ok(bytes_sent) => {
                session.quit().await;
                let latency = started.elapsed();
                session.close().await;
                Ok(Transaction {
                    latency,
                    bytes_sent,
                })
            }
            Err(err) => {
                session.close().await;
                Err(err)
            }
        }
    }
}

struct Session<'a> {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    cfg: &'a SessionConfig,
    line: String,
}

impl<'a> Session<'a> {
    fn new(stream: TcpStream, cfg: &'a SessionConfig) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
            cfg,
            line: String::new(),
        }
    }

    /// Greeting through end-of-data acceptance. Returns body bytes written.
    async fn deliver(&mut self, body_size: usize) -> Result<u64, SessionError> {
        let cfg = self.cfg;

        self.expect_reply(Stage::Greeting, 220).await?;

        self.send(Stage::Ehlo, &format!("EHLO {}", cfg.client_name))
            .await?;
        loop {
            let reply = self.read_reply(Stage::Ehlo).await?;
            if !reply.is(250) {
                return Err(SessionError::unexpected(Stage::Ehlo, 250, reply));
            }
            if reply.last {
                break;
            }
        }

        self.command(Stage::MailFrom, &format!("MAIL FROM:<{}>", cfg.mail_from), 250)
            .await?;
        self.command(Stage::RcptTo, &format!("RCPT TO:<{}>", cfg.rcpt_to), 250)
            .await?;
        self.command(Stage::Data, "DATA", 354).await?;

        let body = generate_body(body_size);
        self.write(Stage::Body, body.as_bytes()).await?;
        self.write(Stage::Body, b".\r\n").await?;
        self.expect_reply(Stage::EndOfData, 250).await?;

        Ok(body.len() as u64)
    }

    async fn quit(&mut self) {
        if let Err(err) = self.send(Stage::Quit, "QUIT").await {
            tracing::debug!("QUIT not sent: {err}");
            return;
        }
        if let Err(err) = self.read_reply(Stage::Quit).await {
            tracing::debug!("QUIT reply not received: {err}");
        }
    }

    async fn close(&mut self) {
        let _ = timeout(self.cfg.write_timeout, self.writer.shutdown()).await;
    }

    async fn command(&mut self, stage: Stage, line: &str, code: u16) -> Result<Reply, SessionError> {
        self.send(stage, line).await?;
        self.expect_reply(stage, code).await
    }

    async fn send(&mut self, stage: Stage, line: &str) -> Result<(), SessionError> {
        let mut buf = Vec::with_capacity(line.len() + 2);
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(b"\r\n");
        self.write(stage, &buf).await
    }

    async fn write(&mut self, stage: Stage, bytes: &[u8]) -> Result<(), SessionError> {
        let limit = self.cfg.write_timeout;
        match timeout(limit, self.writer.write_all(bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(SessionError::Io { stage, source }),
            Err(_) => Err(SessionError::Timeout {
                stage,
                timeout: limit,
            }),
        }
    }

    async fn expect_reply(&mut self, stage: Stage, code: u16) -> Result<Reply, SessionError> {
        let reply = self.read_reply(stage).await?;
        if reply.is(code) {
            Ok(reply)
        } else {
            Err(SessionError::unexpected(stage, code, reply))
        }
    }

    async fn read_reply(&mut self, stage: Stage) -> Result<Reply, SessionError> {
        let limit = self.cfg.read_timeout;
        self.line.clear();

        let read = match timeout(limit, self.reader.read_line(&mut self.line)).await {
            Ok(Ok(n)) => n,
            Ok(Err(source)) => return Err(SessionError::Io { stage, source }),
            Err(_) => {
                return Err(SessionError::Timeout {
                    stage,
                    timeout: limit,
                });
            }
        };

        if read == 0 {
            return Err(SessionError::Closed { stage });
        }

        Ok(Reply::parse(&self.line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smtpload_metrics::ErrorCategory;
    use smtpload_testserver::{SmtpBehavior, SmtpCommand, TestSmtpServer};

    fn fast_config() -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_millis(300),
            write_timeout: Duration::from_secs(2),
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn delivers_one_message() -> anyhow::Result<()> {
        let server = TestSmtpServer::start(SmtpBehavior::accept_all()).await?;
        let client = SmtpClient::new(fast_config());

        let tx = client.execute(server.host(), server.port(), 1024).await?;

        assert_eq!(tx.bytes_sent, generate_body(1024).len() as u64);
        assert!(tx.latency > Duration::ZERO);

        let stats = server.stats();
        anyhow::ensure!(stats.messages_accepted() == 1, "accepted={}", stats.messages_accepted());
        anyhow::ensure!(stats.quits() == 1, "quits={}", stats.quits());
        anyhow::ensure!(
            stats.body_bytes() == tx.bytes_sent,
            "server saw {} body bytes, client sent {}",
            stats.body_bytes(),
            tx.bytes_sent
        );

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn rejected_recipient_is_a_protocol_error() -> anyhow::Result<()> {
        let behavior = SmtpBehavior::accept_all().reply(SmtpCommand::RcptTo, "550 rejected");
        let server = TestSmtpServer::start(behavior).await?;
        let client = SmtpClient::new(fast_config());

        let Err(err) = client.execute(server.host(), server.port(), 1024).await else {
            anyhow::bail!("expected RCPT TO to be rejected");
        };

        anyhow::ensure!(err.stage() == Stage::RcptTo, "stage={}", err.stage());
        anyhow::ensure!(err.category() == ErrorCategory::ProtocolError, "err={err}");
        anyhow::ensure!(server.stats().messages_accepted() == 0);

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn rejection_at_each_step_is_tagged_with_its_stage() -> anyhow::Result<()> {
        let cases = [
            (SmtpCommand::Ehlo, "554 no thanks", Stage::Ehlo, ErrorCategory::Other),
            (SmtpCommand::MailFrom, "501 bad sender", Stage::MailFrom, ErrorCategory::ProtocolError),
            (SmtpCommand::Data, "451 try later", Stage::Data, ErrorCategory::Other),
            (SmtpCommand::EndOfData, "550 content rejected", Stage::EndOfData, ErrorCategory::ProtocolError),
        ];

        for (cmd, reply, stage, category) in cases {
            let server = TestSmtpServer::start(SmtpBehavior::accept_all().reply(cmd, reply)).await?;
            let client = SmtpClient::new(fast_config());

            let Err(err) = client.execute(server.host(), server.port(), 512).await else {
                anyhow::bail!("expected {cmd:?} to be rejected");
            };
            anyhow::ensure!(err.stage() == stage, "{cmd:?}: stage={}", err.stage());
            anyhow::ensure!(err.category() == category, "{cmd:?}: err={err}");
            anyhow::ensure!(server.stats().messages_accepted() == 0);

            server.shutdown().await;
        }
        Ok(())
    }

    #[tokio::test]
    async fn ehlo_continuation_must_stay_250() -> anyhow::Result<()> {
        let behavior = SmtpBehavior::accept_all().reply(SmtpCommand::Ehlo, "250-hello\r\n421 shutting down");
        let server = TestSmtpServer::start(behavior).await?;
        let client = SmtpClient::new(fast_config());

        let Err(err) = client.execute(server.host(), server.port(), 512).await else {
            anyhow::bail!("expected EHLO failure");
        };
        anyhow::ensure!(err.stage() == Stage::Ehlo, "stage={}", err.stage());
        anyhow::ensure!(err.category() == ErrorCategory::Other, "err={err}");

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn slow_data_reply_times_out_at_data() -> anyhow::Result<()> {
        let behavior = SmtpBehavior::accept_all().delay(SmtpCommand::Data, Duration::from_secs(2));
        let server = TestSmtpServer::start(behavior).await?;
        let client = SmtpClient::new(fast_config());
        assert_eq!(client.config().read_timeout, Duration::from_millis(300));

        let Err(err) = client.execute(server.host(), server.port(), 512).await else {
            anyhow::bail!("expected a timeout");
        };
        anyhow::ensure!(err.stage() == Stage::Data, "stage={}", err.stage());
        anyhow::ensure!(err.category() == ErrorCategory::Timeout, "err={err}");

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn bad_greeting_fails_before_ehlo() -> anyhow::Result<()> {
        let behavior = SmtpBehavior::accept_all().greeting("554 go away");
        let server = TestSmtpServer::start(behavior).await?;
        let client = SmtpClient::new(fast_config());

        let Err(err) = client.execute(server.host(), server.port(), 512).await else {
            anyhow::bail!("expected greeting failure");
        };

        anyhow::ensure!(err.stage() == Stage::Greeting, "stage={}", err.stage());
        anyhow::ensure!(err.category() == ErrorCategory::Other, "err={err}");
        anyhow::ensure!(server.stats().ehlos() == 0);

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn silent_server_times_out() -> anyhow::Result<()> {
        let behavior = SmtpBehavior::accept_all().greeting_delay(Duration::from_secs(5));
        let server = TestSmtpServer::start(behavior).await?;
        let client = SmtpClient::new(fast_config());

        let started = Instant::now();
        let Err(err) = client.execute(server.host(), server.port(), 512).await else {
            anyhow::bail!("expected a timeout");
        };

        anyhow::ensure!(err.category() == ErrorCategory::Timeout, "err={err}");
        anyhow::ensure!(err.stage() == Stage::Greeting);
        anyhow::ensure!(
            started.elapsed() < Duration::from_secs(3),
            "took {:?}",
            started.elapsed()
        );

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn closed_port_is_connection_refused() -> anyhow::Result<()> {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
            listener.local_addr()?.port()
        };

        let client = SmtpClient::new(fast_config());
        let Err(err) = client.execute("127.0.0.1", port, 512).await else {
            anyhow::bail!("expected connect failure");
        };

        anyhow::ensure!(err.stage() == Stage::Connect);
        anyhow::ensure!(err.category() == ErrorCategory::ConnectionRefused, "err={err}");
        Ok(())
    }

    #[tokio::test]
    async fn failed_quit_still_counts_as_delivered() -> anyhow::Result<()> {
        let behavior = SmtpBehavior::accept_all().drop_on(SmtpCommand::Quit);
        let server = TestSmtpServer::start(behavior).await?;
        let client = SmtpClient::new(fast_config());

        let tx = client.execute(server.host(), server.port(), 2048).await?;
        anyhow::ensure!(tx.bytes_sent > 0);
        anyhow::ensure!(server.stats().messages_accepted() == 1);

        server.shutdown().await;
        Ok(())
    }
}
