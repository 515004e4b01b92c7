use numato_gpio::{default_device_paths, DeviceRegistry};

fn main() {
    env_logger::init();
    let mut registry = DeviceRegistry::new();
    let found = registry.discover(&default_device_paths());
    println!("Found {} device(s)", found);

    for (id, device) in registry.iter() {
        let version = device.version().unwrap_or_else(|_| "?".to_string());
        println!(
            "{:>10}: {} ({}, {} ports, firmware {})",
            id,
            device.path(),
            device.spec().name,
            device.ports(),
            version
        );
        println!("{:>10}  {}", "", device.spec().url);
    }

    let failures = registry.cleanup();
    if failures > 0 {
        eprintln!("{} device(s) failed to clean up", failures);
    }
}
