use anyhow::Result;
use console::style;
use rxwatch::{HttpRelayController, RecoveryActuator, RelayState};
use std::path::Path;
use std::sync::Arc;

use super::{icons, load_config};
use crate::args::SwitchState;

pub(crate) async fn cmd_relay(config_path: &Path, device_id: u32, state: SwitchState) -> Result<()> {
    let config = load_config(config_path)?;
    let relay = Arc::new(HttpRelayController::new(
        &config.relay,
        config.probe_timeout(),
    )?);
    let actuator = RecoveryActuator::new(relay, config.post_power_wait());

    let state = match state {
        SwitchState::On => RelayState::On,
        SwitchState::Off => RelayState::Off,
    };

    match actuator.set(device_id, state).await {
        Ok(()) => println!(
            "{} Relay for device {} switched {}",
            style(icons::SUCCESS).green(),
            device_id,
            state.as_str()
        ),
        Err(e) => {
            println!(
                "{} Relay for device {} not switched: {}",
                style(icons::ERROR).red(),
                device_id,
                e
            );
            std::process::exit(1);
        }
    }

    Ok(())
}
