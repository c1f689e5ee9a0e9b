use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::assembler::LineAssembler;
use super::{LineSink, RawChunk};

/// Why the consumer loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// Shutdown was requested
    Cancelled,
    /// Every producer handle was dropped
    Closed,
}

/// Producer side of the dispatch queue.
///
/// Only appends and signals, so it is safe to call from the byte-arrival path.
#[derive(Clone)]
pub struct ChunkSender {
    tx: mpsc::UnboundedSender<RawChunk>,
}

impl ChunkSender {
    /// Queue a chunk; false once the consumer is gone
    pub fn push(&self, chunk: &[u8]) -> bool {
        self.tx.send(chunk.to_vec()).is_ok()
    }

    /// Forward everything read from `reader` into the queue until the
    /// stream ends, fails, or the consumer goes away.
    pub fn spawn_pump<R>(self, mut reader: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        log::warn!("Serial link closed");
                        break;
                    }
                    Ok(n) => {
                        log::trace!("rx {}", hex::encode(&buf[..n]));
                        if !self.push(&buf[..n]) {
                            break;
                        }
                    }
                    Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
                    Err(e) => {
                        log::error!("Serial read failed: {}", e);
                        break;
                    }
                }
            }
        })
    }
}

/// Single consumer draining the queue through a [`LineAssembler`]
pub struct DispatchConsumer {
    rx: mpsc::UnboundedReceiver<RawChunk>,
    assembler: LineAssembler,
    sink: Arc<dyn LineSink>,
    cancel: watch::Receiver<bool>,
}

/// Create a queue; the consumer stops when `cancel` turns true
pub fn dispatch_queue(
    assembler: LineAssembler,
    sink: Arc<dyn LineSink>,
    cancel: watch::Receiver<bool>,
) -> (ChunkSender, DispatchConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChunkSender { tx },
        DispatchConsumer {
            rx,
            assembler,
            sink,
            cancel,
        },
    )
}

impl DispatchConsumer {
    pub fn spawn(self) -> JoinHandle<ConsumerExit> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> ConsumerExit {
        let started = Instant::now();
        let mut lines_processed = 0u64;

        let exit = loop {
            if self.is_cancelled() {
                break ConsumerExit::Cancelled;
            }

            let chunk = tokio::select! {
                biased;
                changed = self.cancel.changed() => {
                    if changed.is_err() {
                        break ConsumerExit::Cancelled;
                    }
                    continue;
                }
                chunk = self.rx.recv() => chunk,
            };

            let Some(chunk) = chunk else {
                break ConsumerExit::Closed;
            };

            if self.is_cancelled() {
                break ConsumerExit::Cancelled;
            }

            // Lines left over on cancellation are dropped; the tail stays in the assembler.
            let mut cancelled = false;
            for line in self.assembler.feed(&chunk) {
                if !line.is_empty() {
                    self.sink.handle_line(&line);
                    lines_processed += 1;
                }
                if self.is_cancelled() {
                    cancelled = true;
                    break;
                }
            }
            if cancelled {
                break ConsumerExit::Cancelled;
            }
        };

        log::debug!(
            "Dispatch consumer exited ({:?}) after {:?}, {} lines processed",
            exit,
            started.elapsed(),
            lines_processed
        );
        exit
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        lines: Mutex<Vec<String>>,
    }

    impl LineSink for Collect {
        fn handle_line(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }

    /// Cancels shutdown as soon as it sees a given line
    struct CancelOn {
        trigger: &'static str,
        cancel: watch::Sender<bool>,
        lines: Mutex<Vec<String>>,
    }

    impl LineSink for CancelOn {
        fn handle_line(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
            if line == self.trigger {
                self.cancel.send_replace(true);
            }
        }
    }

    #[tokio::test]
    async fn test_lines_are_delivered_in_order_without_empties() {
        let sink = Arc::new(Collect::default());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let (tx, consumer) = dispatch_queue(LineAssembler::new(), sink.clone(), cancel_rx);

        assert!(tx.push(b"event,ST"));
        assert!(tx.push(b"ART\r\n\r\nevent,POWER_LOST\r"));
        assert!(tx.push(b"\nevent,POWER_RESTORED\r\n"));
        drop(tx);

        assert_eq!(consumer.run().await, ConsumerExit::Closed);
        assert_eq!(
            *sink.lines.lock().unwrap(),
            vec!["event,START", "event,POWER_LOST", "event,POWER_RESTORED"]
        );
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let sink = Arc::new(Collect::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (_tx, consumer) = dispatch_queue(LineAssembler::new(), sink.clone(), cancel_rx);

        let handle = consumer.spawn();
        tokio::task::yield_now().await;
        cancel_tx.send_replace(true);

        assert_eq!(handle.await.unwrap(), ConsumerExit::Cancelled);
        assert!(sink.lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_drops_remaining_lines() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let sink = Arc::new(CancelOn {
            trigger: "b",
            cancel: cancel_tx,
            lines: Mutex::new(Vec::new()),
        });
        let (tx, consumer) = dispatch_queue(LineAssembler::new(), sink.clone(), cancel_rx);

        tx.push(b"a\r\nb\r\nc\r\nd\r\ntail");
        assert_eq!(consumer.run().await, ConsumerExit::Cancelled);
        assert_eq!(*sink.lines.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_pump_forwards_stream_until_eof() {
        let sink = Arc::new(Collect::default());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let (tx, consumer) = dispatch_queue(LineAssembler::new(), sink.clone(), cancel_rx);

        let (mut device, host) = tokio::io::duplex(64);
        let pump = tx.spawn_pump(host);
        let consumer = consumer.spawn();

        use tokio::io::AsyncWriteExt;
        device.write_all(b"event,START\r\nresponse,POWER_MONITOR_ON\r\n").await.unwrap();
        drop(device);

        pump.await.unwrap();
        assert_eq!(consumer.await.unwrap(), ConsumerExit::Closed);
        assert_eq!(
            *sink.lines.lock().unwrap(),
            vec!["event,START", "response,POWER_MONITOR_ON"]
        );
    }
}
