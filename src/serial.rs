// src/serial.rs - line-oriented serial transport backing the MMU wire protocol.
//
// Stands in for the out-of-scope `ProtocolLogic` framing layer (spec.md §6.1):
// this module only gets bytes on and off the wire. CRC, retransmit and
// per-message timeout policy belong to `mmu::protocol::SerialProtocol`.
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::SerialError;

/// Serial connection statistics, mirrored for diagnostics the way the
/// printer-host connection tracks its own link health.
#[derive(Debug, Clone, Default)]
pub struct SerialStats {
    pub lines_sent: u64,
    pub lines_received: u64,
    pub errors: u64,
    pub timeouts: u64,
}

#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port_name: String,
    pub baud_rate: u32,
}

/// Line-framed serial link to the MMU. Background reader/writer tasks bridge
/// the raw port to channels so the coordinator never blocks on I/O directly.
pub struct SerialConnection {
    response_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    command_tx: mpsc::UnboundedSender<String>,
    stats: Arc<Mutex<SerialStats>>,
    config: SerialConfig,
}

impl SerialConnection {
    pub async fn new(port_name: &str, baud_rate: u32) -> Result<Self, SerialError> {
        let config = SerialConfig {
            port_name: port_name.to_string(),
            baud_rate,
        };

        let port = serial2_tokio::SerialPort::open(&config.port_name, config.baud_rate)
            .map_err(|e| SerialError::Open(e.to_string()))?;
        let port = Arc::new(port);

        let (response_tx, response_rx) = mpsc::unbounded_channel::<String>();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();

        let read_port = port.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            let mut pending = String::new();
            loop {
                match read_port.read(&mut buf).await {
                    Ok(0) => {
                        tracing::info!("MMU serial connection closed");
                        break;
                    }
                    Ok(n) => {
                        pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                        while let Some(idx) = pending.find('\n') {
                            let line: String = pending.drain(..=idx).collect();
                            let trimmed = line.trim();
                            if !trimmed.is_empty() {
                                tracing::trace!("MMU RX: {}", trimmed);
                                if response_tx.send(trimmed.to_string()).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("MMU serial read error: {}", e);
                        break;
                    }
                }
            }
        });

        let write_port = port.clone();
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let line = format!("{}\n", command);
                tracing::trace!("MMU TX: {}", command);
                match timeout(Duration::from_secs(1), write_port.write_all(line.as_bytes())).await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!("MMU serial write error: {}", e);
                        break;
                    }
                    Err(_) => {
                        tracing::error!("MMU serial write timeout");
                        break;
                    }
                }
            }
            tracing::info!("MMU serial writer task terminated");
        });

        Ok(Self {
            response_rx: Arc::new(Mutex::new(response_rx)),
            command_tx,
            stats: Arc::new(Mutex::new(SerialStats::default())),
            config,
        })
    }

    pub async fn send_line(&self, line: &str) -> Result<(), SerialError> {
        {
            let mut stats = self.stats.lock().await;
            stats.lines_sent += 1;
        }
        self.command_tx
            .send(line.to_string())
            .map_err(|_| SerialError::Closed)
    }

    pub async fn recv_line(&self, timeout_ms: u64) -> Result<String, SerialError> {
        let mut rx = self.response_rx.lock().await;
        match timeout(Duration::from_millis(timeout_ms), rx.recv()).await {
            Ok(Some(line)) => {
                let mut stats = self.stats.lock().await;
                stats.lines_received += 1;
                Ok(line)
            }
            Ok(None) => {
                let mut stats = self.stats.lock().await;
                stats.errors += 1;
                Err(SerialError::Closed)
            }
            Err(_) => {
                let mut stats = self.stats.lock().await;
                stats.timeouts += 1;
                Err(SerialError::Timeout)
            }
        }
    }

    pub fn try_recv_line(&self) -> Option<String> {
        let mut rx = self.response_rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    pub async fn stats(&self) -> SerialStats {
        self.stats.lock().await.clone()
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl std::fmt::Debug for SerialConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialConnection")
            .field("config", &self.config)
            .finish()
    }
}
