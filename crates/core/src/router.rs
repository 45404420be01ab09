//! Static source-port routing to the two call legs

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

use crate::demux::TransportPayload;
use crate::error::Error;
use crate::Result;

/// One leg of the call, and its channel in the stereo output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowId {
    Left,
    Right,
}

impl FlowId {
    pub const ALL: [FlowId; 2] = [FlowId::Left, FlowId::Right];

    /// Index into per-flow state arrays
    pub fn index(self) -> usize {
        match self {
            FlowId::Left => 0,
            FlowId::Right => 1,
        }
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowId::Left => f.write_str("left"),
            FlowId::Right => f.write_str("right"),
        }
    }
}

/// A payload that matched one of the configured ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedPayload {
    pub flow: FlowId,
    pub payload: Bytes,

    /// True for the first payload ever routed to this flow
    pub first: bool,
}

/// Maps source ports to flows. The table is fixed at construction.
#[derive(Debug, Clone)]
pub struct FlowRouter {
    ports: [u16; 2],
    started: [bool; 2],
}

impl FlowRouter {
    pub fn new(left_port: u16, right_port: u16) -> Result<Self> {
        if left_port == 0 || right_port == 0 {
            return Err(Error::Config("Flow ports must be non-zero".to_string()));
        }
        if left_port == right_port {
            return Err(Error::Config(format!(
                "Left and right flows cannot share source port {}",
                left_port
            )));
        }

        Ok(Self {
            ports: [left_port, right_port],
            started: [false; 2],
        })
    }

    pub fn port(&self, flow: FlowId) -> u16 {
        self.ports[flow.index()]
    }

    /// Flow for a source port, if any
    pub fn lookup(&self, source_port: u16) -> Option<FlowId> {
        FlowId::ALL
            .into_iter()
            .find(|flow| self.ports[flow.index()] == source_port)
    }

    pub fn has_started(&self, flow: FlowId) -> bool {
        self.started[flow.index()]
    }

    /// Route a payload by source port. Unmapped ports yield `Error::Unrouted`.
    pub fn route(&mut self, payload: TransportPayload) -> Result<RoutedPayload> {
        let flow = self
            .lookup(payload.source_port)
            .ok_or(Error::Unrouted(payload.source_port))?;

        let first = !self.started[flow.index()];
        if first {
            self.started[flow.index()] = true;
            debug!("Audio stream started on {} flow from port {}", flow, payload.source_port);
        } else {
            trace!("Routed {} bytes to {} flow", payload.payload.len(), flow);
        }

        Ok(RoutedPayload {
            flow,
            payload: payload.payload,
            first,
        })
    }
}
