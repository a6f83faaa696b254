#![allow(dead_code)]

use elink_core::{CoordinateConvention, DisplayGeometry, InputPort, OperatorKey, RenderPort};
use elink_link::DeviceLink;
use elink_link::testing::ScriptedHost;
use elink_session::{Connector, SessionConfig};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub enum Drawn {
    Target { x: f64, y: f64, visible: bool },
    Text(String),
}

/// Remembers every draw call.
#[derive(Debug)]
pub struct RecordingRender {
    pub geometry: DisplayGeometry,
    pub drawn: Vec<Drawn>,
    pub presented: usize,
}

impl RecordingRender {
    pub fn new() -> Self {
        Self {
            geometry: DisplayGeometry::new(1024.0, 768.0, CoordinateConvention::TopLeft),
            drawn: Vec::new(),
            presented: 0,
        }
    }

    pub fn last(&self) -> Option<&Drawn> {
        self.drawn.last()
    }

    pub fn last_text(&self) -> &str {
        match self.drawn.last() {
            Some(Drawn::Text(text)) => text,
            other => panic!("expected text, last draw was {other:?}"),
        }
    }
}

impl RenderPort for RecordingRender {
    fn display_geometry(&self) -> DisplayGeometry {
        self.geometry
    }

    fn draw_target(&mut self, x: f64, y: f64, visible: bool) {
        self.drawn.push(Drawn::Target { x, y, visible });
    }

    fn draw_status_text(&mut self, text: &str) {
        self.drawn.push(Drawn::Text(text.to_string()));
    }

    fn present(&mut self) -> anyhow::Result<()> {
        self.presented += 1;
        Ok(())
    }
}

/// Hands out one batch of keys per tick; empty once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    batches: VecDeque<Vec<OperatorKey>>,
    current: Vec<OperatorKey>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, keys: &[OperatorKey]) -> Self {
        self.batches.push_back(keys.to_vec());
        self
    }

    pub fn push(&mut self, keys: &[OperatorKey]) {
        self.batches.push_back(keys.to_vec());
    }
}

impl InputPort for ScriptedInput {
    fn drain_keys(&mut self) -> impl Iterator<Item = OperatorKey> + '_ {
        self.current = self.batches.pop_front().unwrap_or_default();
        self.current.drain(..)
    }
}

pub fn connector_with(config: SessionConfig) -> Connector<ScriptedHost> {
    let link = DeviceLink::with_host(ScriptedHost::new(), &config.host, &config.prefix);
    let geometry = RecordingRender::new().display_geometry();
    let mut connector = Connector::new(link, config, geometry).unwrap();
    connector.link_mut().host_mut().clear_calls();
    connector
}

/// Connected, with `ab.edf` open and the host call log cleared.
pub fn ready_connector() -> Connector<ScriptedHost> {
    let mut connector = connector_with(SessionConfig::default());
    connector.open_file("ab").unwrap();
    connector.link_mut().host_mut().clear_calls();
    connector
}
