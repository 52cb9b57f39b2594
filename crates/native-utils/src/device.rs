use anyhow::Context;
use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Finds the input device called `device_name`, or the host's default input
/// device when no name is given.
pub fn get_or_default_input(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());

    let Some(target) = device_name else {
        return host
            .default_input_device()
            .context("No default input device available");
    };

    let input_devices = host
        .input_devices()
        .context("Failed to enumerate input devices")?;
    for in_device in input_devices {
        if in_device.name().is_ok_and(|name| name == target) {
            return Ok(in_device);
        }
    }
    Err(anyhow::anyhow!("No input device named {target:?}"))
}

/// One line per input device: name, channel count and sample rate, with the
/// default device marked.
pub fn get_available_inputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_device = host
        .default_input_device()
        .and_then(|device| device.name().ok())
        .unwrap_or_default();

    let mut device_names: Vec<String> = Vec::new();
    let input_devices = host
        .input_devices()
        .context("Failed to enumerate input devices")?;
    for in_device in input_devices {
        let Ok(d_name) = in_device.name() else {
            continue;
        };
        let d = match in_device.default_input_config() {
            Ok(d_cfg) => format_device(&d_name, d_cfg.channels(), d_cfg.sample_rate().0),
            Err(e) => {
                tracing::debug!("Skipping config for {}: {}", d_name, e);
                format!(" * {d_name}")
            }
        };
        if d_name == default_device {
            device_names.push(format!("{d} [default]"));
        } else {
            device_names.push(d);
        }
    }
    Ok(device_names.join("\n"))
}

fn format_device(name: &str, channels: u16, sample_rate: u32) -> String {
    format!(" * {name}({channels}ch, {sample_rate}hz)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_device() {
        assert_eq!(format_device("USB Mic", 1, 48000), " * USB Mic(1ch, 48000hz)");
    }

    #[test]
    fn test_unknown_device_name_is_an_error() {
        // Runs without audio hardware too: enumeration either fails or finds nothing.
        assert!(get_or_default_input(Some("no-such-device-for-tests")).is_err());
    }
}
