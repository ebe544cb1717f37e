// Copyright (C) 2026 The beatline authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Drives the audio graph into a real output device via cpal.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use super::AudioGraph;

/// Errors from opening the output device.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("no output device available")]
    NoDevice,

    #[error("failed to build output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),
}

/// An open output stream. The graph clock advances as long as this is
/// alive; dropping it stops the callback.
pub struct Output {
    // Held so the stream keeps running.
    _stream: cpal::Stream,
    device_name: String,
}

impl Output {
    /// Opens the default output device and starts rendering the graph
    /// through it.
    pub fn open(graph: Arc<AudioGraph>) -> Result<Output, OutputError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "unknown device".to_string());

        let config = cpal::StreamConfig {
            channels: super::CHANNEL_COUNT as u16,
            sample_rate: cpal::SampleRate(graph.sample_rate()),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _| graph.render(data),
            |err| error!(err = %err, "Output stream error"),
            None,
        )?;
        stream.play()?;

        info!(device = device_name, "Output stream started");
        Ok(Output {
            _stream: stream,
            device_name,
        })
    }

    /// The name of the open device.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

/// Lists the names of the available output devices.
pub fn list_devices() -> Result<Vec<String>, OutputError> {
    let host = cpal::default_host();
    Ok(host
        .output_devices()?
        .map(|device| {
            device
                .name()
                .unwrap_or_else(|_| "unknown device".to_string())
        })
        .collect())
}
