use numato_gpio::{GpioDirection, GpioLevel, NumatoGpio, Result};
use std::{env, thread, time::Duration};

const BLINK_PORT: u8 = 0;
const BLINK_COUNT: usize = 20;

fn main() -> Result<()> {
    env_logger::init();
    let path = env::args().nth(1).unwrap_or_else(|| "/dev/ttyACM0".to_string());
    println!("Opening {}...", path);
    let device = NumatoGpio::open(&path)?;
    println!("Device opened: {}", device);

    println!("Configuring port {} as output...", BLINK_PORT);
    device.setup(BLINK_PORT, GpioDirection::Output)?;

    println!("Blinking port {} {} times", BLINK_PORT, BLINK_COUNT);
    for _ in 0..BLINK_COUNT {
        device.write(BLINK_PORT, GpioLevel::High)?;
        thread::sleep(Duration::from_millis(250));
        device.write(BLINK_PORT, GpioLevel::Low)?;
        thread::sleep(Duration::from_millis(250));
    }

    // Back to all inputs, write protected.
    device.cleanup()
}
