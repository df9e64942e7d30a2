//! `AttachConsole` proxy: pumps bytes between the inbound tonic stream and
//! a driver's [`ConsoleSession`] (§4.4).
//!
//! Adapted from the gateway's WebSocket⇄WebSocket proxy: client and driver
//! directions are raced with `tokio::select!` each iteration, and either
//! side closing ends the attachment rather than leaking the task.

use hv_driver::ConsoleSession;
use hv_proto::v1::console_frame::Frame;
use hv_proto::v1::ConsoleFrame;
use tokio::sync::mpsc;
use tonic::{Status, Streaming};
use tracing::debug;

/// Drive one console attachment until either side closes.
pub async fn pump(
    mut inbound: Streaming<ConsoleFrame>,
    mut session: ConsoleSession,
    outbound: mpsc::Sender<Result<ConsoleFrame, Status>>,
) {
    loop {
        tokio::select! {
            incoming = inbound.message() => {
                match incoming {
                    Ok(Some(frame)) => {
                        if !handle_client_frame(frame, &session).await {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("console client closed the stream");
                        break;
                    }
                    Err(status) => {
                        debug!(%status, "console client stream errored");
                        break;
                    }
                }
            }
            output = session.output.recv() => {
                match output {
                    Some(bytes) => {
                        let frame = ConsoleFrame { frame: Some(Frame::Output(bytes)) };
                        if outbound.send(Ok(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        debug!("driver console attachment closed");
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_client_frame(frame: ConsoleFrame, session: &ConsoleSession) -> bool {
    match frame.frame {
        Some(Frame::Input(bytes)) => session.input.send(bytes).await.is_ok(),
        Some(Frame::Resize(resize)) => {
            let columns = u16::try_from(resize.columns).unwrap_or(u16::MAX);
            let rows = u16::try_from(resize.rows).unwrap_or(u16::MAX);
            session.resize(columns, rows).await
        }
        Some(Frame::Open(_) | Frame::Output(_)) | None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hv_proto::v1::{console_frame::Frame, ConsoleResize};

    fn fake_session() -> (ConsoleSession, mpsc::Receiver<Vec<u8>>, mpsc::Receiver<(u16, u16)>) {
        let (input_tx, input_rx) = mpsc::channel(4);
        let (_output_tx, output_rx) = mpsc::channel(4);
        let (resize_tx, resize_rx) = mpsc::channel(4);
        (ConsoleSession::new(input_tx, output_rx, resize_tx), input_rx, resize_rx)
    }

    #[tokio::test]
    async fn input_frame_forwards_to_driver() {
        let (session, mut input_rx, _resize_rx) = fake_session();
        let frame = ConsoleFrame { frame: Some(Frame::Input(b"ls\n".to_vec())) };
        assert!(handle_client_frame(frame, &session).await);
        assert_eq!(input_rx.recv().await, Some(b"ls\n".to_vec()));
    }

    #[tokio::test]
    async fn resize_frame_notifies_driver() {
        let (session, _input_rx, mut resize_rx) = fake_session();
        let frame = ConsoleFrame {
            frame: Some(Frame::Resize(ConsoleResize { columns: 120, rows: 40 })),
        };
        assert!(handle_client_frame(frame, &session).await);
        assert_eq!(resize_rx.recv().await, Some((120, 40)));
    }

    #[tokio::test]
    async fn open_and_output_frames_from_a_client_are_ignored() {
        let (session, _input_rx, _resize_rx) = fake_session();
        let frame = ConsoleFrame { frame: Some(Frame::Output(b"noise".to_vec())) };
        assert!(handle_client_frame(frame, &session).await);
    }
}
