use numato_gpio::{Edge, NumatoGpio, Result};
use std::{env, thread, time::Duration};

fn main() -> Result<()> {
    env_logger::init();
    let path = env::args().nth(1).unwrap_or_else(|| "/dev/ttyACM0".to_string());
    let device = NumatoGpio::open(&path)?;
    println!("{}", device);

    if !device.can_notify() {
        eprintln!(
            "Error: {} does not send change notifications.",
            device.spec().name
        );
        return device.cleanup();
    }

    // Callbacks run one after another on the session's event thread.
    for port in 0..device.ports() {
        device.add_event_detect(
            port,
            |port, level| println!("port {:3} -> {:?}", port, level),
            Edge::Both,
        )?;
    }
    device.set_notify(true)?;

    println!("Watching all {} ports for 30 s...", device.ports());
    thread::sleep(Duration::from_secs(30));

    for port in device.spec().adc_port_numbers() {
        let raw = device.adc_read(port)?;
        println!(
            "{:>5}: {:4} ({:.2} V @ 3.3 V ref)",
            device.spec().adc_label(port).unwrap_or("?"),
            raw,
            device.spec().adc_voltage(raw, 3.3)
        );
    }

    device.cleanup()
}
