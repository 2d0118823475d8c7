use std::net::SocketAddr;
use std::time::Duration;

use smtpload_testserver::{SmtpBehavior, SmtpCommand, TestSmtpServer};
use tokio::net::TcpListener;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let mut behavior = SmtpBehavior::accept_all();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:2525")
                })?;
                bind_addr = addr.parse()?;
            }
            "--reject-rcpt" => {
                behavior = behavior.reply(SmtpCommand::RcptTo, "550 rejected");
            }
            "--greeting-delay-ms" => {
                let ms = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--greeting-delay-ms requires a value"))?;
                behavior = behavior.greeting_delay(Duration::from_millis(ms.parse()?));
            }
            "-h" | "--help" => {
                eprintln!(
                    "smtpload-testserver\n\nUSAGE:\n  smtpload-testserver [--bind 127.0.0.1:0] [--reject-rcpt] [--greeting-delay-ms N]\n\nOUTPUT:\n  Prints SMTP_ADDR=<host:port> to stdout once ready."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let server = TestSmtpServer::from_listener(listener, behavior)?;

    println!("SMTP_ADDR={}", server.addr());

    let _ = tokio::signal::ctrl_c().await;

    let stats = server.stats().clone();
    server.shutdown().await;
    eprintln!(
        "sessions={} accepted={} body_bytes={}",
        stats.sessions(),
        stats.messages_accepted(),
        stats.body_bytes()
    );
    Ok(())
}
