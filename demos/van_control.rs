//! Terminal front end for the relay controller.
//!
//! Connects to the relay board over Core Bluetooth and prints every status change. Commands are
//! read from stdin, one per line:
//!
//! * `on` / `off` - switch the relay
//! * `bg` / `fg` - simulate the host entering background / foreground
//! * `status` - print the current status
//! * `quit`
//!
//! Run with `RUST_LOG=van_control=debug` to follow the state machine.

#[cfg(target_os = "macos")]
fn main() -> anyhow::Result<()> {
    use log::*;
    use std::io::BufRead;
    use std::thread;
    use van_control::link::apple::CoreBluetoothLink;
    use van_control::*;

    fn describe(status: &Status) -> String {
        let bars = status.signal_level().bars() as usize;
        format!("{:<10} relay {:<3} signal {}{} {}",
            if status.is_connected() { "connected" } else { "-" },
            if status.relay { "on" } else { "off" },
            "#".repeat(bars),
            ".".repeat(4 - bars),
            status.signal.map(|v| format!("{} dBm", v)).unwrap_or_default())
    }

    env_logger::init();

    let controller = ControllerBuilder::new()
        .build(|sink| match CoreBluetoothLink::new(sink) {
            Ok(link) => link,
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        })?;
    let presenter = controller.presenter();

    let updates = presenter.subscribe();
    thread::spawn(move || {
        for status in updates.iter() {
            println!("{:?}: {}", status.state, describe(&status));
        }
    });

    println!("Looking for the relay board...");
    for line in std::io::stdin().lock().lines() {
        match line?.trim() {
            "on" => presenter.request_relay_change(true),
            "off" => presenter.request_relay_change(false),
            "bg" => controller.entered_background()?,
            "fg" => controller.entered_foreground()?,
            "status" => println!("{}", describe(&presenter.status())),
            "quit" => break,
            "" => {}
            other => eprintln!("unknown command {:?}", other),
        }
    }

    controller.shutdown();
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("the Core Bluetooth link is only available on macOS")
}
