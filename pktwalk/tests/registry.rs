use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use pktwalk::{
    ByteView, DissectContext, DissectEntryResult, Dissector, DissectorRegistry, PacketInfo,
    Preferences, TransportKind,
};

/// Claims everything it is handed.
struct Sink(&'static str);

impl Dissector for Sink {
    fn name(&self) -> &'static str {
        self.0
    }

    fn dissect<'a>(&self, cx: &mut DissectContext<'_, 'a>, view: ByteView<'a>) -> DissectEntryResult {
        cx.columns.set_protocol(self.0);
        DissectEntryResult::Consumed(view.reported_len())
    }
}

const BATCH: std::ops::Range<u32> = 40000..40016;

#[test]
fn snapshots_never_see_half_an_update() {
    let registry = Arc::new(DissectorRegistry::with_defaults());
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                while !done.load(Ordering::Relaxed) {
                    let table = registry.snapshot();
                    let present = BATCH
                        .filter(|port| table.get(TransportKind::UdpPort, *port).is_some())
                        .count();
                    assert!(
                        present == 0 || present == BATCH.len(),
                        "saw {present} of {} registrations",
                        BATCH.len()
                    );
                    // the built-in registrations are never disturbed
                    assert!(table.get(TransportKind::IpProtocol, 17).is_some());
                }
            });
        }

        for round in 0..500 {
            registry.update(|builder| {
                for port in BATCH {
                    if round % 2 == 0 {
                        builder.register(TransportKind::UdpPort, port, Arc::new(Sink("sink")));
                    } else {
                        builder.deregister(TransportKind::UdpPort, port);
                    }
                }
            });
        }
        done.store(true, Ordering::Relaxed);
    });
}

#[test]
fn dissection_keeps_its_snapshot() {
    let registry = DissectorRegistry::with_defaults();
    let before = registry.snapshot();
    registry.register(TransportKind::UdpPort, 5678, Arc::new(Sink("sink")));

    let data = [0_u8; 8];
    let old = before.dissect(TransportKind::UdpPort, 5678, ByteView::new(&data), PacketInfo::default());
    let new = registry.dissect(TransportKind::UdpPort, 5678, ByteView::new(&data), PacketInfo::default());
    assert_eq!(old.columns.protocol, "MNDP");
    assert_eq!(new.columns.protocol, "sink");
}

#[test]
fn reconfigure_from_preferences() {
    let registry = DissectorRegistry::with_defaults();
    registry.register(TransportKind::UdpPort, 9, Arc::new(Sink("discard")));

    let prefs = Preferences::from_toml_str(
        r#"
        [protocols.gopher]
        tcp-ports = "7070-7071"

        [protocols.mndp]
        udp-ports = ""
        heuristic = true

        [protocols.fefd]
        enabled = false
        "#,
    )
    .unwrap();
    registry.reconfigure(&prefs);

    let table = registry.snapshot();
    assert!(table.get(TransportKind::TcpPort, 70).is_none());
    assert!(table.get(TransportKind::TcpPort, 7070).is_some());
    assert!(table.get(TransportKind::TcpPort, 7071).is_some());
    assert!(table.get(TransportKind::UdpPort, 5678).is_none());
    assert_eq!(
        table
            .heuristics(TransportKind::UdpPort)
            .iter()
            .map(|h| h.name())
            .collect::<Vec<_>>(),
        ["mndp"]
    );
    assert!(table
        .get(TransportKind::Table("llc.cisco_pid"), 0x0111)
        .is_none());
    // untouched protocols keep their defaults
    assert!(table.get(TransportKind::UdpPort, 31001).is_some());
    assert!(table.get(TransportKind::Ethertype, 0x88FB).is_some());
    // registrations made by hand do not survive
    assert!(table.get(TransportKind::UdpPort, 9).is_none());

    registry.reconfigure(&Preferences::default());
    let table = registry.snapshot();
    assert!(table.get(TransportKind::TcpPort, 70).is_some());
    assert!(table.heuristics(TransportKind::UdpPort).is_empty());
}
