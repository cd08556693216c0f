//! MikroTik Neighbor Discovery Protocol.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use crate::catalog::TlvLayout;
use crate::field::ValueTable;
use crate::prefs::{PortRange, ProtocolPrefs};
use crate::registry::{
    DissectContext, DissectEntryResult, Dissector, RegistryBuilder, TransportKind,
};
use crate::view::{ByteOrder, ByteView};
use crate::{Catalog, Variants};

use super::walk_protocol;

const DEFAULT_PORT: u16 = 5678;

const TLV_LAYOUT: TlvLayout = TlvLayout::new(2, 2);

/// Header plus one TLV header.
const MIN_LEN: usize = 8;

static UNPACK: ValueTable = ValueTable::new(&[
    (0, "None"),
    (1, "Simple"),
    (2, "Uncompressed headers"),
    (3, "Uncompressed all"),
]);

#[derive(Catalog)]
#[pktwalk(name = "MikroTik Neighbor Discovery Protocol", abbrev = "mndp")]
#[allow(dead_code)]
struct Announcement {
    header: u16,
    sequence_number: u16,
    #[pktwalk(rename = "TLV", abbrev = "tlv", tlv = "TLV_LAYOUT")]
    tlvs: Vec<Tlv>,
}

#[derive(Variants)]
#[pktwalk(name = "TLV Type")]
#[allow(dead_code)]
enum Tlv {
    #[pktwalk(tag = 1, rename = "MAC Address", abbrev = "mac")]
    MacAddress(#[pktwalk(typ = "ether")] [u8; 6]),
    #[pktwalk(tag = 5)]
    Identity(#[pktwalk(rest)] String),
    #[pktwalk(tag = 7)]
    Version(#[pktwalk(rest)] String),
    #[pktwalk(tag = 8)]
    Platform(#[pktwalk(rest)] String),
    /// Seconds since boot.
    #[pktwalk(tag = 10)]
    Uptime(#[pktwalk(enc = "le")] u32),
    #[pktwalk(tag = 11, rename = "Software ID")]
    SoftwareId(#[pktwalk(rest)] String),
    #[pktwalk(tag = 12)]
    Board(#[pktwalk(rest)] String),
    #[pktwalk(tag = 14)]
    Unpack(#[pktwalk(lookup = "UNPACK")] u8),
    #[pktwalk(tag = 15, rename = "IPv6 Address", abbrev = "ipv6")]
    Ipv6Address(Ipv6Addr),
    #[pktwalk(tag = 16)]
    InterfaceName(#[pktwalk(rest)] String),
    #[pktwalk(tag = 17, rename = "IPv4 Address", abbrev = "ipv4")]
    Ipv4Address(Ipv4Addr),
}

pub struct Mndp;

pub(super) fn register(builder: &mut RegistryBuilder, prefs: &ProtocolPrefs) {
    let ports = prefs
        .udp_ports
        .clone()
        .unwrap_or_else(|| PortRange::single(DEFAULT_PORT));
    builder.register_ports(TransportKind::UdpPort, &ports, Arc::new(Mndp));
    if prefs.heuristic.unwrap_or(false) {
        builder.register_heuristic(TransportKind::UdpPort, Arc::new(Mndp));
    }
}

impl Dissector for Mndp {
    fn name(&self) -> &'static str {
        "mndp"
    }

    /// The first TLV must be of a known type, and fit in the datagram.
    fn probe(&self, view: &ByteView<'_>) -> bool {
        if view.reported_len() < MIN_LEN {
            return false;
        }
        let (Ok(typ), Ok(len)) = (
            view.get_u16(4, ByteOrder::Big),
            view.get_u16(6, ByteOrder::Big),
        ) else {
            return false;
        };
        Tlv::variants().select(u64::from(typ)).is_some()
            && usize::from(len) <= view.reported_len() - MIN_LEN
    }

    fn dissect<'a>(&self, cx: &mut DissectContext<'_, 'a>, view: ByteView<'a>) -> DissectEntryResult {
        let layer = walk_protocol(Announcement::catalog(), &view);

        cx.columns.set_protocol("MNDP");
        cx.columns.set_info("");
        for (abbrev, label) in [("mndp.tlv.identity", "Identity"), ("mndp.tlv.platform", "Platform")] {
            if let Some(value) = layer.node.find(abbrev).and_then(|f| f.value.as_str()) {
                cx.columns.append_info(&format!("{label} = {value}"));
            }
        }

        let res = layer.outcome();
        cx.push(layer.node);
        res
    }
}
