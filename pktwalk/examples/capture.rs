//! Dissects a few canned frames and prints their trees.
//!
//! ```sh
//! RUST_LOG=pktwalk=debug cargo run --example capture -- prefs.toml
//! ```

use hex_literal::hex;
use pktwalk::{ByteView, DissectorRegistry, PacketInfo, Preferences, TransportKind};
use tracing_subscriber::EnvFilter;

const FRAMES: &[(TransportKind, u32, &[u8])] = &[
    (
        TransportKind::IpProtocol,
        17,
        &hex!(
            "c3 50 79 19 00 25 00 00"
            "53 45 53 53 49 4f 4e 30 30 31"
            "00 00 00 00 00 00 00 01"
            "00 02"
            "00 02 41 42"
            "00 03 53 54 55"
        ),
    ),
    (
        TransportKind::Ethertype,
        0x88FB,
        &hex!("10 01 00 2a 14 06 00 15 5d 01 02 03 00 00"),
    ),
    (
        TransportKind::IpProtocol,
        17,
        &hex!(
            "16 2e 16 2e 00 1f 00 00"
            "00 00 00 01"
            "00 05 00 04 67 77 30 31"
            "00 08 00 07 52 42 37 35 30 47 72"
        ),
    ),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let prefs = match std::env::args().nth(1) {
        Some(path) => Preferences::read_file(path)?,
        None => Preferences::default(),
    };
    let registry = DissectorRegistry::configured(&prefs);

    for (i, (kind, key, data)) in FRAMES.iter().enumerate() {
        let dissection = registry.dissect(*kind, *key, ByteView::new(data), PacketInfo::default());
        println!(
            "#{} {} {} ({:?})",
            i + 1,
            dissection.columns.protocol,
            dissection.columns.info,
            dissection.outcome
        );
        print!("{dissection}");
        println!();
    }
    Ok(())
}
