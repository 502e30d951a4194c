use std::sync::Arc;
use std::time::Duration;

use crate::player::Shared;

const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs on its own ordinary-priority thread (§4.6). Reclaims DecoderStates the render path has
/// flagged `ready_for_collection`; the compare-and-swap in `ActiveSet::reclaim_if_marked`
/// guarantees no render pass still in flight can observe a freed slot.
///
/// Also doubles as the poll point for device/sample-rate changes (§9 Open Questions decision 4):
/// `cpal` has no push notification for a changed default device or nominal sample rate, so the
/// host's device list is compared against the last-seen one on this thread's existing wake
/// cycle rather than wiring up a separate listener thread.
pub struct Collector {
    shared: Arc<Shared>,
    known_devices: Vec<String>,
}

impl Collector {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            known_devices: current_output_device_names(),
        }
    }

    pub fn run(mut self) {
        use std::sync::atomic::Ordering;
        while !self.shared.shutdown.load(Ordering::Acquire) {
            self.shared.collector_signal.wait_timeout(WAIT_TIMEOUT);
            self.shared.run_stop_hook_if_requested();
            let reclaimed = self.shared.active_set.reclaim_if_marked();
            if reclaimed > 0 {
                log::debug!("collector reclaimed {} decoder state(s)", reclaimed);
            }
            self.poll_device_list();
        }
    }

    fn poll_device_list(&mut self) {
        let devices = current_output_device_names();
        if devices != self.known_devices {
            log::debug!(
                "output device list changed: {:?} -> {:?}",
                self.known_devices,
                devices
            );
            self.known_devices = devices;
        }
    }
}

#[cfg(feature = "cpal-output")]
fn current_output_device_names() -> Vec<String> {
    use cpal::traits::{DeviceTrait, HostTrait};
    let host = cpal::default_host();
    match host.output_devices() {
        Ok(devices) => devices.filter_map(|device| device.name().ok()).collect(),
        Err(err) => {
            log::debug!("failed to enumerate output devices: {}", err);
            Vec::new()
        }
    }
}

#[cfg(not(feature = "cpal-output"))]
fn current_output_device_names() -> Vec<String> {
    // `cubeb` exposes no stable device-enumeration API in this backend; device-list polling is
    // a `cpal`-only refinement here, documented as best-effort per the Open Questions decision.
    Vec::new()
}
