// Sink Module - DDP output sink painting one color across a WLED strip
use std::net::UdpSocket;

use anyhow::Result;
use ddp_rs::connection::DDPConnection;
use ddp_rs::protocol::{PixelConfig, ID};
use log::warn;

use crate::color::Color;
use crate::fade::ColorSink;

/// Sends each rendered color to every pixel of a WLED strip over DDP.
/// Duty percentages map to 8-bit channel values on the wire.
pub struct DdpSink {
    connection: DDPConnection,
    frame: Vec<u8>,
}

impl DdpSink {
    pub fn new(address: &str, led_count: usize) -> Result<Self> {
        let dest_addr = format!("{}:4048", address);
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let connection =
            DDPConnection::try_new(&dest_addr, PixelConfig::default(), ID::Default, socket)?;

        Ok(DdpSink {
            connection,
            frame: vec![0; led_count.max(1) * 3],
        })
    }
}

impl ColorSink for DdpSink {
    fn render(&mut self, color: Color) {
        let (r, g, b) = color.to_bytes();
        for pixel in self.frame.chunks_exact_mut(3) {
            pixel[0] = r;
            pixel[1] = g;
            pixel[2] = b;
        }

        // A dropped frame is invisible at the step rate; don't let it
        // bubble into the animation loop.
        if let Err(e) = self.connection.write(&self.frame) {
            warn!("DDP send failed: {}", e);
        }
    }
}
