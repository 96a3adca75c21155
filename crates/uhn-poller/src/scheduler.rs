// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Keyed one-shot command timers.
//!
//! Two tables: `timers` keyed by an arbitrary id for general delayed
//! commands, and `pulses` keyed by device name for auto-revert pulses.
//!
//! Pulse keying is by device name only: one pulse may be in flight per
//! device, and arming a new one cancels the previous timer (last write
//! wins). Rapid re-pressing therefore cannot produce overlapping reverts.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::DeviceCommand;

/// One-shot timer scheduler feeding the owning bus poller's command queue.
pub struct CommandScheduler {
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    pulses: Mutex<HashMap<String, JoinHandle<()>>>,
    pusher: mpsc::Sender<DeviceCommand>,
}

impl CommandScheduler {
    /// Creates a scheduler that pushes fired commands into `pusher`.
    pub fn new(pusher: mpsc::Sender<DeviceCommand>) -> Self {
        debug!("Command scheduler created");
        Self {
            timers: Mutex::new(HashMap::new()),
            pulses: Mutex::new(HashMap::new()),
            pusher,
        }
    }

    /// Schedules `cmd` after `delay`.
    ///
    /// A zero delay pushes immediately and returns an empty id. Otherwise a
    /// one-shot timer is armed under the command's id, or a nanosecond
    /// timestamp when the command has none.
    pub fn schedule(&self, cmd: DeviceCommand, delay: Duration) -> String {
        if delay.is_zero() {
            push_now(&self.pusher, cmd);
            return String::new();
        }

        let id = if cmd.id.is_empty() {
            chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_string()
        } else {
            cmd.id.clone()
        };

        let handle = spawn_timer(self.pusher.clone(), cmd, delay);
        if let Some(previous) = self
            .timers
            .lock()
            .expect("timer table lock poisoned")
            .insert(id.clone(), handle)
        {
            previous.abort();
        }
        id
    }

    /// Schedules a pulse revert for the command's device.
    ///
    /// An earlier unfired pulse for the same device is cancelled.
    pub fn schedule_pulse(&self, cmd: DeviceCommand, delay: Duration) {
        if delay.is_zero() {
            push_now(&self.pusher, cmd);
            return;
        }

        let key = cmd.device.name.clone();
        let handle = spawn_timer(self.pusher.clone(), cmd, delay);
        if let Some(previous) = self
            .pulses
            .lock()
            .expect("pulse table lock poisoned")
            .insert(key, handle)
        {
            previous.abort();
        }
    }

    /// Cancels the pending pulse for the command's device.
    ///
    /// Returns `true` when an entry existed (it may already have fired;
    /// aborting a finished timer is a no-op).
    pub fn clear_pulse(&self, cmd: &DeviceCommand) -> bool {
        match self
            .pulses
            .lock()
            .expect("pulse table lock poisoned")
            .remove(&cmd.device.name)
        {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels an id-keyed timer. Returns `true` when one existed.
    pub fn cancel(&self, id: &str) -> bool {
        match self
            .timers
            .lock()
            .expect("timer table lock poisoned")
            .remove(id)
        {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every pending timer in both tables. Idempotent.
    pub fn stop(&self) {
        for (_, handle) in self
            .timers
            .lock()
            .expect("timer table lock poisoned")
            .drain()
        {
            handle.abort();
        }
        for (_, handle) in self
            .pulses
            .lock()
            .expect("pulse table lock poisoned")
            .drain()
        {
            handle.abort();
        }
        debug!("Command scheduler stopped");
    }

    /// Number of armed (possibly fired-but-uncollected) pulse entries.
    pub fn pulse_count(&self) -> usize {
        self.pulses.lock().expect("pulse table lock poisoned").len()
    }
}

impl Drop for CommandScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_timer(
    pusher: mpsc::Sender<DeviceCommand>,
    cmd: DeviceCommand,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        push_now(&pusher, cmd);
    })
}

fn push_now(pusher: &mpsc::Sender<DeviceCommand>, cmd: DeviceCommand) {
    if pusher.try_send(cmd).is_err() {
        warn!("scheduled command dropped, queue full or closed");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uhn_config::{
        BusConfig, BusType, CatalogCapabilities, CatalogDeviceSpec, CatalogLimits, CatalogTimings,
        DeviceSpec,
    };

    fn test_device(name: &str) -> Arc<DeviceSpec> {
        Arc::new(DeviceSpec {
            name: name.to_string(),
            unit_id: 1,
            type_key: "t".to_string(),
            retry_count: 0,
            debug: false,
            bus: Arc::new(BusConfig {
                bus_id: "bus1".to_string(),
                bus_type: BusType::Tcp,
                tcp_addr: "10.0.0.1:502".to_string(),
                port: String::new(),
                baud: 0,
                data_bits: 0,
                stop_bits: 0,
                parity: String::new(),
                timeout_ms: 150,
                settle_before_request_ms: 0,
                settle_after_write_ms: 0,
                poll_interval_ms: 0,
                command_buffer_size: 8,
                debug: false,
            }),
            catalog: Arc::new(CatalogDeviceSpec {
                vendor: "acme".to_string(),
                model: "T".to_string(),
                digital_outputs: None,
                digital_inputs: None,
                analog_outputs: None,
                analog_inputs: None,
                limits: CatalogLimits {
                    max_coils_per_read: 16,
                    max_inputs_per_read: 16,
                    max_registers_per_read: 8,
                },
                timings: CatalogTimings::default(),
                capabilities: CatalogCapabilities::default(),
                debug: false,
            }),
        })
    }

    fn command(device_name: &str, value: u16) -> DeviceCommand {
        DeviceCommand {
            id: String::new(),
            device: test_device(device_name),
            action: "setDigitalOutput".to_string(),
            address: 3,
            value,
            pulse_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_zero_delay_pushes_immediately() {
        let (tx, mut rx) = mpsc::channel(4);
        let scheduler = CommandScheduler::new(tx);

        let id = scheduler.schedule(command("d1", 1), Duration::ZERO);
        assert!(id.is_empty());
        assert_eq!(rx.recv().await.unwrap().value, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_schedule_fires_once() {
        let (tx, mut rx) = mpsc::channel(4);
        let scheduler = CommandScheduler::new(tx);

        let id = scheduler.schedule(command("d1", 0), Duration::from_millis(200));
        assert!(!id.is_empty());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(rx.try_recv().unwrap().value, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let (tx, mut rx) = mpsc::channel(4);
        let scheduler = CommandScheduler::new(tx);

        let id = scheduler.schedule(command("d1", 0), Duration::from_millis(200));
        assert!(scheduler.cancel(&id));
        assert!(!scheduler.cancel(&id));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulse_last_write_wins() {
        let (tx, mut rx) = mpsc::channel(4);
        let scheduler = CommandScheduler::new(tx);

        // First pulse would fire at t+200; replaced at t+100 by one firing
        // at t+600.
        scheduler.schedule_pulse(command("d1", 0), Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut second = command("d1", 0);
        second.id = "second".to_string();
        scheduler.schedule_pulse(second, Duration::from_millis(500));
        assert_eq!(scheduler.pulse_count(), 1);

        // Past the first deadline: nothing fired.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());

        // The replacement fires at its own deadline.
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(rx.try_recv().unwrap().id, "second");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulses_for_different_devices_coexist() {
        let (tx, mut rx) = mpsc::channel(4);
        let scheduler = CommandScheduler::new(tx);

        scheduler.schedule_pulse(command("d1", 0), Duration::from_millis(100));
        scheduler.schedule_pulse(command("d2", 1), Duration::from_millis(100));
        assert_eq!(scheduler.pulse_count(), 2);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let mut fired = vec![rx.try_recv().unwrap(), rx.try_recv().unwrap()];
        fired.sort_by(|a, b| a.device.name.cmp(&b.device.name));
        assert_eq!(fired[0].device.name, "d1");
        assert_eq!(fired[1].device.name, "d2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_pulse() {
        let (tx, mut rx) = mpsc::channel(4);
        let scheduler = CommandScheduler::new(tx);

        let cmd = command("d1", 0);
        scheduler.schedule_pulse(cmd.clone(), Duration::from_millis(200));
        assert!(scheduler.clear_pulse(&cmd));
        assert!(!scheduler.clear_pulse(&cmd));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_everything() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = CommandScheduler::new(tx);

        scheduler.schedule(command("d1", 0), Duration::from_millis(100));
        scheduler.schedule_pulse(command("d2", 1), Duration::from_millis(100));
        scheduler.stop();
        scheduler.stop(); // idempotent

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.pulse_count(), 0);
    }
}
