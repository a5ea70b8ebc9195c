use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

/// One JSON request line plus a slot for the outcome.
pub struct Request {
    pub json: String,
    pub reply: oneshot::Sender<Result<(), String>>,
}

/// Accept newline-delimited JSON request arrays and forward them to the
/// manager task. Each line is answered with `ok` or `err <reason>`.
pub async fn listen(
    addr: String,
    tx: mpsc::Sender<Request>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "request intake listening");
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Err(error) = serve(stream, tx).await {
                        warn!(%peer, %error, "intake connection closed");
                    }
                });
            }
            changed = shutdown.changed() => {
                if changed.is_ok() && *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn serve(stream: TcpStream, tx: mpsc::Sender<Request>) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let json = line.trim().to_string();
        if json.is_empty() {
            continue;
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(Request { json, reply: reply_tx }).await.is_err() {
            break;
        }
        let outcome = match reply_rx.await {
            Ok(Ok(())) => "ok\n".to_string(),
            Ok(Err(reason)) => format!("err {reason}\n"),
            Err(_) => "err manager unavailable\n".to_string(),
        };
        write.write_all(outcome.as_bytes()).await?;
    }
    Ok(())
}
