//! `instance console` terminal passthrough: dials the owning agent's
//! `AttachConsole` RPC directly and pumps bytes between the local terminal
//! and the bidirectional stream, mirroring `hv-agent::console::pump` from
//! the client side (§4.4, §8 scenario 6).

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use hv_proto::v1::agent_service_client::AgentServiceClient;
use hv_proto::v1::console_frame::Frame;
use hv_proto::v1::{ConsoleFrame, ConsoleOpen, ConsoleResize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;

use crate::error::CliError;

/// Attach to `instance_id`'s console over the agent at `agent_addr`,
/// pumping the local terminal until either side closes.
pub async fn attach(agent_addr: &str, instance_id: &str) -> Result<(), CliError> {
    let channel = Channel::from_shared(agent_addr.to_string())
        .map_err(|e| CliError::usage(format!("invalid agent address: {e}")))?
        .connect()
        .await?;
    let mut client = AgentServiceClient::new(channel);

    let (tx, rx) = mpsc::channel::<ConsoleFrame>(32);
    tx.send(ConsoleFrame { frame: Some(Frame::Open(ConsoleOpen { instance_id: instance_id.to_string() })) })
        .await
        .ok();

    let (columns, rows) = crossterm::terminal::size().unwrap_or((80, 24));
    tx.send(ConsoleFrame { frame: Some(Frame::Resize(ConsoleResize { columns: columns.into(), rows: rows.into() })) })
        .await
        .ok();

    let mut inbound = client.attach_console(ReceiverStream::new(rx)).await?.into_inner();

    enable_raw_mode()?;
    let result = pump(&mut inbound, tx).await;
    disable_raw_mode()?;
    result
}

async fn pump(
    inbound: &mut tonic::Streaming<ConsoleFrame>,
    outbound: mpsc::Sender<ConsoleFrame>,
) -> Result<(), CliError> {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut resize_poll = tokio::time::interval(std::time::Duration::from_millis(500));
    let mut last_size = crossterm::terminal::size().unwrap_or((80, 24));
    let mut buf = [0u8; 4096];

    loop {
        tokio::select! {
            read = stdin.read(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let frame = ConsoleFrame { frame: Some(Frame::Input(buf[..n].to_vec())) };
                        if outbound.send(frame).await.is_err() {
                            break;
                        }
                    }
                }
            }
            incoming = inbound.message() => {
                match incoming {
                    Ok(Some(frame)) => {
                        if let Some(Frame::Output(bytes)) = frame.frame {
                            if stdout.write_all(&bytes).await.is_err() || stdout.flush().await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            _ = resize_poll.tick() => {
                if let Ok(size) = crossterm::terminal::size() {
                    if size != last_size {
                        last_size = size;
                        let frame = ConsoleFrame {
                            frame: Some(Frame::Resize(ConsoleResize { columns: size.0.into(), rows: size.1.into() })),
                        };
                        let _ = outbound.send(frame).await;
                    }
                }
            }
        }
    }

    Ok(())
}
