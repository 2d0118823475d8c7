use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::{Duration, sleep};

pub const DEFAULT_GREETING: &str = "220 smtpload-testserver ESMTP ready";
pub const DEFAULT_EHLO: &[&str] = &["smtpload-testserver", "PIPELINING", "SIZE 10485760"];

/// Client command (or server reply point) a behavior override applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmtpCommand {
    Ehlo,
    MailFrom,
    RcptTo,
    Data,
    /// The reply after the `.` terminating the message body.
    EndOfData,
    Quit,
}

impl SmtpCommand {
    fn from_line(line: &str) -> Option<Self> {
        let verb = line.split_whitespace().next()?.to_ascii_uppercase();
        let cmd = match verb.as_str() {
            "EHLO" | "HELO" => Self::Ehlo,
            "QUIT" => Self::Quit,
            "DATA" => Self::Data,
            v if v.starts_with("MAIL") => Self::MailFrom,
            v if v.starts_with("RCPT") => Self::RcptTo,
            _ => return None,
        };
        Some(cmd)
    }

    fn default_reply(self) -> &'static str {
        match self {
            Self::Ehlo | Self::MailFrom | Self::RcptTo => "250 OK",
            Self::Data => "354 End data with <CR><LF>.<CR><LF>",
            Self::EndOfData => "250 OK queued",
            Self::Quit => "221 Bye",
        }
    }
}

/// Scripted server behavior. Starts from a well-behaved server and overrides single steps.
#[derive(Debug, Clone, Default)]
pub struct SmtpBehavior {
    greeting: Option<String>,
    greeting_delay: Duration,
    replies: HashMap<SmtpCommand, String>,
    delays: HashMap<SmtpCommand, Duration>,
    drop_on: HashSet<SmtpCommand>,
}

impl SmtpBehavior {
    /// Accept every command with the expected code.
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn greeting(mut self, line: &str) -> Self {
        self.greeting = Some(line.to_string());
        self
    }

    /// Hold the greeting back; long enough delays look like a silent server.
    pub fn greeting_delay(mut self, delay: Duration) -> Self {
        self.greeting_delay = delay;
        self
    }

    /// Replace the reply to `cmd`. For EHLO this replaces the whole multi-line reply.
    pub fn reply(mut self, cmd: SmtpCommand, line: &str) -> Self {
        self.replies.insert(cmd, line.to_string());
        self
    }

    pub fn delay(mut self, cmd: SmtpCommand, delay: Duration) -> Self {
        self.delays.insert(cmd, delay);
        self
    }

    /// Close the connection instead of replying to `cmd`.
    pub fn drop_on(mut self, cmd: SmtpCommand) -> Self {
        self.drop_on.insert(cmd);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SmtpServerStats {
    sessions: Arc<AtomicU64>,
    ehlos: Arc<AtomicU64>,
    messages_accepted: Arc<AtomicU64>,
    body_bytes: Arc<AtomicU64>,
    quits: Arc<AtomicU64>,
}

impl SmtpServerStats {
    fn inc(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    pub fn ehlos(&self) -> u64 {
        self.ehlos.load(Ordering::Relaxed)
    }

    pub fn messages_accepted(&self) -> u64 {
        self.messages_accepted.load(Ordering::Relaxed)
    }

    /// Body bytes of accepted messages, excluding the terminating `.` line.
    pub fn body_bytes(&self) -> u64 {
        self.body_bytes.load(Ordering::Relaxed)
    }

    pub fn quits(&self) -> u64 {
        self.quits.load(Ordering::Relaxed)
    }
}

pub struct TestSmtpServer {
    addr: SocketAddr,
    host: String,
    stats: SmtpServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestSmtpServer {
    pub async fn start(behavior: SmtpBehavior) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Self::from_listener(listener, behavior)
    }

    pub fn from_listener(listener: TcpListener, behavior: SmtpBehavior) -> std::io::Result<Self> {
        let addr = listener.local_addr()?;
        let stats = SmtpServerStats::default();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(serve(
            listener,
            Arc::new(behavior),
            stats.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            addr,
            host: addr.ip().to_string(),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn stats(&self) -> &SmtpServerStats {
        &self.stats
    }

    /// Stop accepting and drop every open session.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestSmtpServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}

/// Accept loop; returns once `shutdown` fires. Open sessions are aborted with the set.
pub async fn serve(
    listener: TcpListener,
    behavior: Arc<SmtpBehavior>,
    stats: SmtpServerStats,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                let Ok((stream, _)) = accepted else {
                    continue;
                };
                SmtpServerStats::inc(&stats.sessions, 1);
                let behavior = behavior.clone();
                let stats = stats.clone();
                sessions.spawn(async move {
                    let _ = handle_session(stream, &behavior, &stats).await;
                });
            }
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    sessions.abort_all();
    while sessions.join_next().await.is_some() {}
}

async fn handle_session(
    stream: TcpStream,
    behavior: &SmtpBehavior,
    stats: &SmtpServerStats,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut line = Vec::new();

    if !behavior.greeting_delay.is_zero() {
        sleep(behavior.greeting_delay).await;
    }
    let greeting = behavior.greeting.as_deref().unwrap_or(DEFAULT_GREETING);
    write_line(&mut write, greeting).await?;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }

        let text = String::from_utf8_lossy(&line);
        let Some(cmd) = SmtpCommand::from_line(&text) else {
            let verb = text.split_whitespace().next().unwrap_or_default().to_ascii_uppercase();
            let reply = match verb.as_str() {
                "RSET" | "NOOP" => "250 OK",
                _ => "500 5.5.2 command not recognized",
            };
            write_line(&mut write, reply).await?;
            continue;
        };

        if let Some(delay) = behavior.delays.get(&cmd) {
            sleep(*delay).await;
        }
        if behavior.drop_on.contains(&cmd) {
            return Ok(());
        }

        match cmd {
            SmtpCommand::Ehlo => {
                SmtpServerStats::inc(&stats.ehlos, 1);
                match behavior.replies.get(&cmd) {
                    Some(reply) => write_line(&mut write, reply).await?,
                    None => {
                        let last = DEFAULT_EHLO.len().saturating_sub(1);
                        for (i, ext) in DEFAULT_EHLO.iter().enumerate() {
                            let sep = if i == last { ' ' } else { '-' };
                            write_line(&mut write, &format!("250{sep}{ext}")).await?;
                        }
                    }
                }
            }
            SmtpCommand::Data => {
                let reply = reply_for(behavior, cmd);
                write_line(&mut write, reply).await?;
                if !reply.starts_with("354") {
                    continue;
                }

                let Some(bytes) = read_body(&mut reader, &mut line).await? else {
                    return Ok(());
                };

                let end = SmtpCommand::EndOfData;
                if let Some(delay) = behavior.delays.get(&end) {
                    sleep(*delay).await;
                }
                if behavior.drop_on.contains(&end) {
                    return Ok(());
                }

                let reply = reply_for(behavior, end);
                if reply.starts_with('2') {
                    SmtpServerStats::inc(&stats.messages_accepted, 1);
                    SmtpServerStats::inc(&stats.body_bytes, bytes);
                }
                write_line(&mut write, reply).await?;
            }
            SmtpCommand::Quit => {
                SmtpServerStats::inc(&stats.quits, 1);
                write_line(&mut write, reply_for(behavior, cmd)).await?;
                let _ = write.shutdown().await;
                return Ok(());
            }
            SmtpCommand::MailFrom | SmtpCommand::RcptTo | SmtpCommand::EndOfData => {
                write_line(&mut write, reply_for(behavior, cmd)).await?;
            }
        }
    }
}

fn reply_for(behavior: &SmtpBehavior, cmd: SmtpCommand) -> &str {
    behavior
        .replies
        .get(&cmd)
        .map(String::as_str)
        .unwrap_or_else(|| cmd.default_reply())
}

/// Read message lines up to the lone `.`; `None` if the client went away first.
async fn read_body(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    line: &mut Vec<u8>,
) -> std::io::Result<Option<u64>> {
    let mut bytes = 0u64;
    loop {
        line.clear();
        if reader.read_until(b'\n', line).await? == 0 {
            return Ok(None);
        }
        if line.as_slice() == b".\r\n" || line.as_slice() == b".\n" {
            return Ok(Some(bytes));
        }
        bytes += line.len() as u64;
    }
}

async fn write_line(write: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(line.len() + 2);
    buf.extend_from_slice(line.as_bytes());
    buf.extend_from_slice(b"\r\n");
    write.write_all(&buf).await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn converse(server: &TestSmtpServer, lines: &[&str]) -> std::io::Result<Vec<String>> {
        let stream = TcpStream::connect(server.addr()).await?;
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        for l in lines {
            write.write_all(l.as_bytes()).await?;
        }
        write.shutdown().await?;

        let mut out = Vec::new();
        let mut line = String::new();
        while reader.read_line(&mut line).await? != 0 {
            out.push(line.trim_end().to_string());
            line.clear();
        }
        Ok(out)
    }

    #[tokio::test]
    async fn scripted_conversation() -> anyhow::Result<()> {
        let server = TestSmtpServer::start(SmtpBehavior::accept_all()).await?;

        let replies = converse(
            &server,
            &[
                "EHLO client\r\n",
                "MAIL FROM:<a@b>\r\n",
                "RCPT TO:<c@d>\r\n",
                "DATA\r\n",
                "hello\r\nworld\r\n.\r\n",
                "QUIT\r\n",
            ],
        )
        .await?;

        let codes: Vec<&str> = replies.iter().map(|l| l.get(..4).unwrap_or_default()).collect();
        anyhow::ensure!(
            codes == ["220 ", "250-", "250-", "250 ", "250 ", "250 ", "354 ", "250 ", "221 "],
            "replies={replies:?}"
        );
        anyhow::ensure!(server.stats().messages_accepted() == 1);
        anyhow::ensure!(server.stats().body_bytes() == 14);
        anyhow::ensure!(server.stats().quits() == 1);

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn overrides_and_unknown_commands() -> anyhow::Result<()> {
        let behavior = SmtpBehavior::accept_all()
            .reply(SmtpCommand::Ehlo, "250 tiny")
            .reply(SmtpCommand::RcptTo, "550 rejected");
        let server = TestSmtpServer::start(behavior).await?;

        let replies = converse(
            &server,
            &["EHLO x\r\n", "VRFY y\r\n", "RCPT TO:<z>\r\n", "QUIT\r\n"],
        )
        .await?;

        let expected = [
            "220 smtpload-testserver ESMTP ready",
            "250 tiny",
            "500 5.5.2 command not recognized",
            "550 rejected",
            "221 Bye",
        ];
        anyhow::ensure!(replies == expected, "replies={replies:?}");

        server.shutdown().await;
        Ok(())
    }
}
