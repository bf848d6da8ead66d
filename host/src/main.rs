//! Terminal for a BLE UART bridge.
//!
//! Lines typed on stdin are written to the bridged UART; bytes received from
//! the UART are printed as they arrive. Type `blequit` to exit.

use std::time::Duration;

use anyhow::{bail, Context};
use btleplug::api::BDAddr;
use clap::Parser;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use ble_uart_host::config::{
    DEFAULT_BAUD_RATE, DEFAULT_QUEUE_CAPACITY, MAX_WRITE_SIZE, SCAN_TIMEOUT,
};
use ble_uart_host::transport::BtleplugTransport;
use ble_uart_host::{AdapterError, BleSerial, GattTransport, HostConfig, SerialEvent};

/// Line that ends the session
const QUIT_COMMAND: &str = "blequit";

#[derive(Parser)]
#[command(name = "ble-term")]
#[command(about = "Serial terminal over a BLE UART bridge")]
struct Args {
    /// Bluetooth address of the bridge, e.g. 0A:A0:55:12:34:56
    #[arg(short = 'u', long)]
    address: BDAddr,

    /// UART baud rate to request from the bridge
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Send and show data as hex instead of text
    #[arg(short = 'x', long)]
    hex: bool,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long, default_value_t = 5000)]
    retry_delay_ms: u64,

    /// Receive queue capacity in bytes
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("{}", "BLE UART Terminal".bold());
    println!("Bridge: {}", args.address);
    println!("Baud:   {}", args.baud);
    println!("Type '{}' to exit", QUIT_COMMAND);
    println!();

    let config = HostConfig {
        retry_delay: Duration::from_millis(args.retry_delay_ms),
        queue_capacity: args.queue_capacity,
        scan_timeout: SCAN_TIMEOUT,
        baud_rate: args.baud,
    };

    let (transport, mut events) = BtleplugTransport::start(args.address, config.scan_timeout)
        .await
        .context("Failed to open Bluetooth adapter")?;
    let mut port = BleSerial::new(transport, config);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("Bluetooth transport stopped");
                };
                port.handle(event);

                while let Some(event) = port.next_event() {
                    report(event);
                }
                loop {
                    let n = port.read(&mut buf);
                    if n == 0 {
                        break;
                    }
                    print_data(&buf[..n], args.hex);
                }
            }
            line = stdin.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim() == QUIT_COMMAND {
                    break;
                }

                let data = if args.hex {
                    match parse_hex(&line) {
                        Some(data) => data,
                        None => {
                            eprintln!("{}", "Invalid hex input".red());
                            continue;
                        }
                    }
                } else {
                    format!("{}\n", line).into_bytes()
                };

                if let Err(e) = write_all(&mut port, &data) {
                    eprintln!("{} {}", "Write failed:".red(), e);
                }
            }
        }
    }

    Ok(())
}

/// Send `data` as consecutive writes the bridge can accept
///
/// Each write is fire-and-forget; a lost one shows up as `WriteFailed`.
fn write_all<T: GattTransport>(port: &mut BleSerial<T>, data: &[u8]) -> Result<(), AdapterError> {
    for chunk in data.chunks(MAX_WRITE_SIZE) {
        port.write(chunk)?;
    }
    Ok(())
}

fn report(event: SerialEvent) {
    match event {
        SerialEvent::Connected => println!("{}", "[connected]".green()),
        SerialEvent::Disconnected => println!("{}", "[disconnected]".yellow()),
        SerialEvent::ConnectionFailed => println!("{}", "[connection failed, retrying]".yellow()),
        SerialEvent::Rejected => println!("{}", "[authentication rejected]".red()),
        SerialEvent::BaudRateReported(baud) => println!("{}", format!("[baud {}]", baud).cyan()),
        SerialEvent::WriteFailed(len) => {
            eprintln!("{}", format!("[write of {} bytes lost]", len).red())
        }
        SerialEvent::DataArrived(_) => {}
    }
}

fn print_data(data: &[u8], hex: bool) {
    use std::io::Write;

    if hex {
        let line: Vec<String> = data.iter().map(|b| format!("{:02X}", b)).collect();
        println!("{}", line.join(" "));
    } else {
        print!("{}", String::from_utf8_lossy(data));
        let _ = std::io::stdout().flush();
    }
}

/// Parse space-separated or contiguous hex digits
fn parse_hex(input: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = input.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(s, 16).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ble_uart_host::config::SERVICE_UUID;
    use ble_uart_host::LinkEvent;

    /// Transport that records the size of every data write
    #[derive(Default)]
    struct WriteSizes(Vec<usize>);

    impl GattTransport for WriteSizes {
        type Handle = u16;

        fn connect(&mut self) {}
        fn discover_services(&mut self) {}
        fn resolve_characteristics(&mut self) {}
        fn enable_notifications(&mut self, _read: &u16) {}
        fn write_baud(&mut self, _baud: &u16, _value: [u8; 4]) {}
        fn read_baud(&mut self, _baud: &u16) {}
        fn write_without_response(&mut self, _write: &u16, data: &[u8]) {
            self.0.push(data.len());
        }
        fn tear_down(&mut self) {}
        fn schedule_retry(&mut self, _delay: Duration) {}
    }

    fn ready_port() -> BleSerial<WriteSizes> {
        let mut port = BleSerial::new(WriteSizes::default(), HostConfig::default());
        for event in [
            LinkEvent::LinkEstablished,
            LinkEvent::ServiceFound(SERVICE_UUID),
            LinkEvent::CharacteristicsResolved {
                baud: Some(1),
                read: Some(3),
                write: Some(2),
            },
            LinkEvent::NotificationsEnabled,
        ] {
            port.handle(event);
        }
        port
    }

    #[test]
    fn test_long_line_split_to_write_size() {
        let mut port = ready_port();
        write_all(&mut port, &[b'a'; 300]).unwrap();
        assert_eq!(port.transport().0, vec![MAX_WRITE_SIZE, MAX_WRITE_SIZE, 44]);
    }

    #[test]
    fn test_write_all_needs_connection() {
        let mut port = BleSerial::new(WriteSizes::default(), HostConfig::default());
        assert_eq!(write_all(&mut port, b"hi"), Err(AdapterError::NotConnected));
        assert!(port.transport().0.is_empty());
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("01 ab FF"), Some(vec![0x01, 0xAB, 0xFF]));
        assert_eq!(parse_hex("0102"), Some(vec![0x01, 0x02]));
        assert_eq!(parse_hex("abc"), None);
        assert_eq!(parse_hex("zz"), None);
        assert_eq!(parse_hex(""), None);
    }
}
