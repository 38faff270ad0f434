//! Input bridge: background listener and the thread boundary
//!
//! One task polls the open input port in small non-blocking increments and
//! pushes messages into a bounded single-producer/single-consumer queue. It
//! never touches controls or groups; the deck drains the queue on its own
//! tick. Switching ports stops the previous listener (signal + bounded
//! join) before the next one starts, so at most one listener is ever live —
//! overlapping switch requests resolve as last-wins.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::midi::MidiMessage;
use crate::transport::MidiInputHandle;

/// Bound on queued inbound messages; overflow drops with a warning
const QUEUE_CAPACITY: usize = 1024;

/// Poll increment of the listener; keeps stop latency low without burning CPU
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The listener must never hang application exit
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle to the single MIDI input listener
pub struct InputBridge {
    rx: mpsc::Receiver<MidiMessage>,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    port_name: String,
}

impl InputBridge {
    /// Spawn a listener over an open input handle
    pub fn start(input: Box<dyn MidiInputHandle>) -> Self {
        let port_name = input.port_name().to_string();
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);

        info!("listening for MIDI input on '{}'", port_name);
        let handle = tokio::spawn(listen(input, tx, stop_rx));

        Self { rx, stop_tx, handle, port_name }
    }

    /// Stop the previous listener, if any, then start one on `input`
    pub async fn replace(previous: Option<InputBridge>, input: Box<dyn MidiInputHandle>) -> Self {
        if let Some(bridge) = previous {
            bridge.shutdown().await;
        }
        Self::start(input)
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Pop one queued message without blocking
    pub fn try_recv(&mut self) -> Option<MidiMessage> {
        self.rx.try_recv().ok()
    }

    /// Signal the listener to stop and join it with a bounded timeout.
    /// On timeout the task is abandoned rather than blocking exit.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        match tokio::time::timeout(JOIN_TIMEOUT, self.handle).await {
            Ok(_) => debug!("input listener for '{}' stopped", self.port_name),
            Err(_) => warn!(
                "input listener for '{}' did not stop within {:?}, abandoning",
                self.port_name, JOIN_TIMEOUT
            ),
        }
    }
}

async fn listen(
    mut input: Box<dyn MidiInputHandle>,
    tx: mpsc::Sender<MidiMessage>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        for msg in input.poll_pending() {
            if tx.try_send(msg).is_err() {
                warn!("inbound MIDI queue full, dropping {}", msg);
            }
        }

        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
    debug!("input listener exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedInput;
    use std::time::Instant;

    #[tokio::test]
    async fn test_messages_flow_through_queue() {
        let input = ScriptedInput::new();
        input.push(MidiMessage::ControlChange { channel: 0, cc: 10, value: 64 });
        input.push(MidiMessage::NoteOn { channel: 1, note: 60, velocity: 100 });

        let mut bridge = InputBridge::start(Box::new(input.clone()));

        // Give the listener a couple of poll increments
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            bridge.try_recv(),
            Some(MidiMessage::ControlChange { channel: 0, cc: 10, value: 64 })
        );
        assert_eq!(
            bridge.try_recv(),
            Some(MidiMessage::NoteOn { channel: 1, note: 60, velocity: 100 })
        );
        assert_eq!(bridge.try_recv(), None);

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_bounded() {
        let bridge = InputBridge::start(Box::new(ScriptedInput::new()));

        let started = Instant::now();
        bridge.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_replace_switches_listener() {
        let first = ScriptedInput::new();
        let bridge = InputBridge::start(Box::new(first.clone()));

        let second = ScriptedInput::new();
        second.push(MidiMessage::ChannelPressure { channel: 2, pressure: 40 });
        let mut bridge = InputBridge::replace(Some(bridge), Box::new(second.clone())).await;

        tokio::time::sleep(Duration::from_millis(50)).await;

        // Messages pushed to the replaced input no longer arrive
        first.push(MidiMessage::ControlChange { channel: 0, cc: 1, value: 1 });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            bridge.try_recv(),
            Some(MidiMessage::ChannelPressure { channel: 2, pressure: 40 })
        );
        assert_eq!(bridge.try_recv(), None);

        bridge.shutdown().await;
    }
}
