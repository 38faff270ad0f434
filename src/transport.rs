//! MIDI transport seam
//!
//! The engine talks to MIDI hardware through these traits only: open a
//! named port, send discrete messages, drain waiting inbound messages
//! without blocking. Closing a handle is dropping it. The production
//! implementation sits on `midir`; tests substitute scripted handles.

use std::sync::mpsc;

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use thiserror::Error;
use tracing::debug;

use crate::midi::{format_hex, MidiMessage};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("MIDI backend unavailable: {0}")]
    Backend(String),

    #[error("port '{0}' not found")]
    PortNotFound(String),

    #[error("failed to connect to port '{0}': {1}")]
    Connect(String, String),

    #[error("send failed: {0}")]
    Send(String),
}

/// Open inbound port: non-blocking enumeration of waiting messages
pub trait MidiInputHandle: Send {
    /// Resolved name of the connected port
    fn port_name(&self) -> &str;

    /// Drain every message received since the last call. Never blocks.
    fn poll_pending(&mut self) -> Vec<MidiMessage>;
}

/// Open outbound port: discrete message sends
pub trait MidiOutputHandle: Send {
    fn port_name(&self) -> &str;

    fn send(&mut self, msg: &MidiMessage) -> Result<(), TransportError>;
}

/// Port enumeration and connection factory
pub trait Transport {
    fn input_ports(&self) -> Result<Vec<String>, TransportError>;
    fn output_ports(&self) -> Result<Vec<String>, TransportError>;
    fn open_input(&self, name: &str) -> Result<Box<dyn MidiInputHandle>, TransportError>;
    fn open_output(&self, name: &str) -> Result<Box<dyn MidiOutputHandle>, TransportError>;
}

/// `midir`-backed transport
#[derive(Debug, Default)]
pub struct MidirTransport;

impl MidirTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for MidirTransport {
    fn input_ports(&self) -> Result<Vec<String>, TransportError> {
        let midi_in = MidiInput::new("ccdeck-scan")
            .map_err(|e| TransportError::Backend(e.to_string()))?;

        let mut names = Vec::new();
        for port in midi_in.ports() {
            if let Ok(name) = midi_in.port_name(&port) {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn output_ports(&self) -> Result<Vec<String>, TransportError> {
        let midi_out = MidiOutput::new("ccdeck-scan")
            .map_err(|e| TransportError::Backend(e.to_string()))?;

        let mut names = Vec::new();
        for port in midi_out.ports() {
            if let Ok(name) = midi_out.port_name(&port) {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn MidiInputHandle>, TransportError> {
        let midi_in = MidiInput::new("ccdeck-in")
            .map_err(|e| TransportError::Backend(e.to_string()))?;

        // Case-insensitive substring match on the port name
        let pattern = name.to_lowercase();
        let (port, resolved) = midi_in
            .ports()
            .into_iter()
            .filter_map(|p| midi_in.port_name(&p).ok().map(|n| (p, n)))
            .find(|(_, n)| n.to_lowercase().contains(&pattern))
            .ok_or_else(|| TransportError::PortNotFound(name.to_string()))?;

        debug!("opening input port '{}'", resolved);

        // The midir callback runs on the backend's thread; it only parses
        // and forwards, so poll_pending stays non-blocking.
        let (tx, rx) = mpsc::channel();
        let connection = midi_in
            .connect(
                &port,
                "ccdeck",
                move |_timestamp, data, _| {
                    if let Some(msg) = MidiMessage::parse(data) {
                        let _ = tx.send(msg);
                    } else {
                        debug!("ignoring unparsed MIDI: {}", format_hex(data));
                    }
                },
                (),
            )
            .map_err(|e| TransportError::Connect(resolved.clone(), e.to_string()))?;

        Ok(Box::new(MidirInputHandle { port_name: resolved, rx, _connection: connection }))
    }

    fn open_output(&self, name: &str) -> Result<Box<dyn MidiOutputHandle>, TransportError> {
        let midi_out = MidiOutput::new("ccdeck-out")
            .map_err(|e| TransportError::Backend(e.to_string()))?;

        let pattern = name.to_lowercase();
        let (port, resolved) = midi_out
            .ports()
            .into_iter()
            .filter_map(|p| midi_out.port_name(&p).ok().map(|n| (p, n)))
            .find(|(_, n)| n.to_lowercase().contains(&pattern))
            .ok_or_else(|| TransportError::PortNotFound(name.to_string()))?;

        debug!("opening output port '{}'", resolved);

        let connection = midi_out
            .connect(&port, "ccdeck")
            .map_err(|e| TransportError::Connect(resolved.clone(), e.to_string()))?;

        Ok(Box::new(MidirOutputHandle { port_name: resolved, connection }))
    }
}

struct MidirInputHandle {
    port_name: String,
    rx: mpsc::Receiver<MidiMessage>,
    // Held to keep the connection alive; dropping closes the port
    _connection: MidiInputConnection<()>,
}

impl MidiInputHandle for MidirInputHandle {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn poll_pending(&mut self) -> Vec<MidiMessage> {
        self.rx.try_iter().collect()
    }
}

struct MidirOutputHandle {
    port_name: String,
    connection: MidiOutputConnection,
}

impl MidiOutputHandle for MidirOutputHandle {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send(&mut self, msg: &MidiMessage) -> Result<(), TransportError> {
        let data = msg.encode();
        self.connection
            .send(&data)
            .map_err(|e| TransportError::Send(e.to_string()))?;
        debug!("sent {} | {}", format_hex(&data), msg);
        Ok(())
    }
}
