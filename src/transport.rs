// src/transport.rs - Byte-stream ingestion from a serial port or standard input
use serial2_tokio::SerialPort;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::Sender;

use crate::machine::MachineRequest;

const READ_CHUNK: usize = 256;

/// Forward one chunk to the machine. `false` once the machine has gone away.
async fn forward(machine_tx: &Sender<MachineRequest>, bytes: &[u8]) -> bool {
    tracing::trace!("Serial RX: {:?}", String::from_utf8_lossy(bytes));
    machine_tx
        .send(MachineRequest::Serial(bytes.to_vec()))
        .await
        .is_ok()
}

/// Pump `reader` into the machine until end of input or until the machine stops.
///
/// Input that stops without a line ending is flushed after `idle_flush` of silence, so a
/// trailing command never merges with the next one. End of input flushes as well.
pub async fn pump<R>(
    mut reader: R,
    idle_flush: Duration,
    machine_tx: Sender<MachineRequest>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; READ_CHUNK];
    let mut unterminated = false;
    loop {
        let read = match tokio::time::timeout(idle_flush, reader.read(&mut buffer)).await {
            Ok(result) => result?,
            Err(_) => {
                if unterminated {
                    unterminated = false;
                    tracing::debug!("Input went quiet, flushing pending command");
                    if !forward(&machine_tx, b"\n").await {
                        return Ok(());
                    }
                }
                continue;
            }
        };
        if read == 0 {
            if unterminated {
                forward(&machine_tx, b"\n").await;
            }
            return Ok(());
        }
        let chunk = &buffer[..read];
        unterminated = !matches!(chunk.last(), Some(b'\n' | b'\r'));
        if !forward(&machine_tx, chunk).await {
            return Ok(());
        }
    }
}

/// Read commands from a serial device until the machine stops.
pub async fn run_serial(
    path: &str,
    baud: u32,
    idle_flush: Duration,
    machine_tx: Sender<MachineRequest>,
) -> std::io::Result<()> {
    let port = SerialPort::open(path, baud)?;
    tracing::info!("Listening for commands on {} at {} baud", path, baud);
    pump(port, idle_flush, machine_tx).await?;
    tracing::info!("Serial input on {} closed", path);
    Ok(())
}

/// Read commands from standard input.
pub async fn run_stdin(idle_flush: Duration, machine_tx: Sender<MachineRequest>) -> std::io::Result<()> {
    tracing::info!("Listening for commands on standard input");
    pump(tokio::io::stdin(), idle_flush, machine_tx).await?;
    tracing::info!("Standard input closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    fn text(request: MachineRequest) -> String {
        match request {
            MachineRequest::Serial(bytes) => String::from_utf8(bytes).unwrap(),
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[tokio::test]
    async fn quiet_line_is_flushed() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(8);
        let reader_task = tokio::spawn(pump(reader, Duration::from_millis(20), tx));

        writer.write_all(b"X100").await.unwrap();
        assert_eq!(text(rx.recv().await.unwrap()), "X100");
        assert_eq!(text(rx.recv().await.unwrap()), "\n");

        writer.write_all(b"Z5\n").await.unwrap();
        assert_eq!(text(rx.recv().await.unwrap()), "Z5\n");

        drop(writer);
        reader_task.await.unwrap().unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn end_of_input_flushes_once() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(8);
        writer.write_all(b"S90").await.unwrap();
        drop(writer);
        pump(reader, Duration::from_secs(5), tx).await.unwrap();
        assert_eq!(text(rx.recv().await.unwrap()), "S90");
        assert_eq!(text(rx.recv().await.unwrap()), "\n");
        assert!(rx.recv().await.is_none());
    }
}
