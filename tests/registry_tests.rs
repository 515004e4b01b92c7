//! Multi-device discovery keyed by device id.

mod common;

use common::{init_logging, SimDevice};
use numato_gpio::{DeviceRegistry, Error, NumatoGpio, Result};
use std::collections::HashMap;
use std::io;

/// Simulated devices by path, each with its own id.
fn bench(devices: &[(&'static str, u8, u32)]) -> HashMap<&'static str, SimDevice> {
    init_logging();
    devices
        .iter()
        .map(|&(path, ports, id)| {
            let sim = SimDevice::new(ports);
            sim.state().id = id;
            (path, sim)
        })
        .collect()
}

fn opener<'a>(
    sims: &'a HashMap<&'static str, SimDevice>,
) -> impl Fn(&str) -> Result<NumatoGpio> + 'a {
    move |path| match sims.get(path) {
        Some(sim) => NumatoGpio::with_transport(path, sim.transport()),
        None => Err(Error::Transport(io::Error::new(
            io::ErrorKind::NotFound,
            "no such device",
        ))),
    }
}

#[test]
fn test_discover_keys_by_device_id() {
    let sims = bench(&[("/dev/sim0", 16, 3), ("/dev/sim1", 32, 1), ("/dev/sim2", 128, 2)]);
    let mut registry = DeviceRegistry::new();
    assert!(registry.is_empty());

    let added = registry.discover_with(&["/dev/sim0", "/dev/sim1", "/dev/sim2"], opener(&sims));
    assert_eq!(added, 3);
    assert_eq!(registry.len(), 3);

    // Ids, not the order of the paths, decide the keys.
    let listed: Vec<_> = registry
        .iter()
        .map(|(id, device)| (id, device.path().to_string(), device.ports()))
        .collect();
    assert_eq!(
        listed,
        vec![
            (1, "/dev/sim1".to_string(), 32),
            (2, "/dev/sim2".to_string(), 128),
            (3, "/dev/sim0".to_string(), 16),
        ]
    );
    assert_eq!(registry.get(3).unwrap().path(), "/dev/sim0");
    assert!(registry.get(0).is_none());

    assert_eq!(registry.cleanup(), 0);
    assert!(registry.is_empty());
}

#[test]
fn test_unusable_paths_are_skipped() {
    let sims = bench(&[("/dev/sim0", 16, 7)]);
    let broken = SimDevice::new(12);
    let mut registry = DeviceRegistry::new();

    let added = registry.discover_with(
        &["/dev/missing", "/dev/broken", "/dev/sim0"],
        |path: &str| {
            if path == "/dev/broken" {
                NumatoGpio::with_transport(path, broken.transport())
            } else {
                opener(&sims)(path)
            }
        },
    );
    assert_eq!(added, 1);
    assert_eq!(registry.get(7).unwrap().path(), "/dev/sim0");
}

#[test]
fn test_duplicate_id_is_rejected() {
    let sims = bench(&[("/dev/sim0", 16, 5), ("/dev/sim1", 16, 5)]);
    let mut registry = DeviceRegistry::new();

    let added = registry.discover_with(&["/dev/sim0", "/dev/sim1"], opener(&sims));
    assert_eq!(added, 1);
    assert_eq!(registry.get(5).unwrap().path(), "/dev/sim0");

    // The rejected session was restored to its safe state.
    let rejected = sims["/dev/sim1"].state();
    assert_eq!(rejected.iodir, 0xFFFF);
    assert_eq!(rejected.commands.last().unwrap(), "gpio notify off");
}

#[test]
fn test_insert_reports_duplicate() {
    let sims = bench(&[("/dev/sim0", 8, 9), ("/dev/sim1", 8, 9)]);
    let open = opener(&sims);
    let mut registry = DeviceRegistry::new();

    assert_eq!(registry.insert(open("/dev/sim0").unwrap()).unwrap(), 9);
    match registry.insert(open("/dev/sim1").unwrap()) {
        Err(Error::DuplicateDeviceId { device, id }) => {
            assert_eq!(device, "/dev/sim1");
            assert_eq!(id, 9);
        }
        other => panic!("Expected DuplicateDeviceId, got {:?}", other),
    }
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_rediscovery() {
    let sims = bench(&[("/dev/sim0", 16, 1), ("/dev/sim1", 16, 2)]);
    let paths = ["/dev/sim0", "/dev/sim1"];
    let mut registry = DeviceRegistry::new();
    assert_eq!(registry.discover_with(&paths, opener(&sims)), 2);

    // Registered paths are not opened again.
    let before = sims["/dev/sim0"].command_count();
    assert_eq!(registry.discover_with(&paths, opener(&sims)), 0);
    assert_eq!(sims["/dev/sim0"].command_count(), before);

    // An unplugged device is noticed on its next exchange and dropped.
    sims["/dev/sim1"].close();
    assert!(registry.get(2).unwrap().readall().is_err());
    assert!(!registry.get(2).unwrap().is_open());
    assert_eq!(registry.discover_with(&["/dev/sim0"], opener(&sims)), 0);
    assert_eq!(registry.len(), 1);
    assert!(registry.get(2).is_none());

    // Plugged back in, it is found again.
    sims["/dev/sim1"].state().closed = false;
    assert_eq!(registry.discover_with(&paths, opener(&sims)), 1);
    assert!(registry.get(2).unwrap().is_open());
}

#[test]
fn test_remove_hands_back_session() {
    let sims = bench(&[("/dev/sim0", 32, 4)]);
    let mut registry = DeviceRegistry::new();
    registry.discover_with(&["/dev/sim0"], opener(&sims));

    let device = registry.remove(4).unwrap();
    assert!(registry.is_empty());
    assert!(device.is_open());
    device.cleanup().unwrap();
}

#[test]
fn test_discover_without_devices() {
    init_logging();
    let mut registry = DeviceRegistry::new();
    assert_eq!(registry.discover(&["/dev/numato-gpio-does-not-exist"]), 0);
    assert!(registry.is_empty());
}
