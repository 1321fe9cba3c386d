use anyhow::Context;
use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Finds the input device named `device_name`, or the host default.
pub fn get_or_default_input(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host
            .default_input_device()
            .context("No default input device"),
        Some(target) => host
            .input_devices()?
            .find(|device| device.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No input device named {target}")),
    }
}

/// Finds the output device named `device_name`, or the host default.
pub fn get_or_default_output(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    match device_name {
        None => host
            .default_output_device()
            .context("No default output device"),
        Some(target) => host
            .output_devices()?
            .find(|device| device.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No output device named {target}")),
    }
}

fn describe(device: &Device, config: cpal::SupportedStreamConfig, default_name: &str) -> String {
    let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
    let mut line = format!(
        " * {}({}ch, {}hz)",
        name,
        config.channels(),
        config.sample_rate().0
    );
    if name == default_name {
        line.push_str(" [default]");
    }
    line
}

/// Lists input devices, one per line, marking the default.
pub fn get_available_inputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();
    let mut device_names = Vec::new();
    for device in host.input_devices()? {
        match device.default_input_config() {
            Ok(config) => device_names.push(describe(&device, config, &default_name)),
            Err(e) => tracing::debug!("skipping input device without config: {}", e),
        }
    }
    Ok(device_names.join("\n"))
}

/// Lists output devices, one per line, marking the default.
pub fn get_available_outputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();
    let mut device_names = Vec::new();
    for device in host.output_devices()? {
        match device.default_output_config() {
            Ok(config) => device_names.push(describe(&device, config, &default_name)),
            Err(e) => tracing::debug!("skipping output device without config: {}", e),
        }
    }
    Ok(device_names.join("\n"))
}
