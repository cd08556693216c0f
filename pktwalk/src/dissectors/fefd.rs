//! Cisco Far End Failure Detection, carried over LLC/SNAP with Cisco's OUI.

use std::sync::Arc;

use crate::catalog::TlvLayout;
use crate::field::ValueTable;
use crate::prefs::ProtocolPrefs;
use crate::registry::{
    DissectContext, DissectEntryResult, Dissector, RegistryBuilder, TransportKind,
};
use crate::view::ByteView;
use crate::{Catalog, Variants};

use super::walk_protocol;

/// Protocol ID within Cisco's SNAP OUI.
const CISCO_PID_FEFD: u32 = 0x0111;

/// Lengths count the 4-byte type and length header too.
const TLV_LAYOUT: TlvLayout = TlvLayout::new(2, 2).including_header();

static OPCODES: ValueTable = ValueTable::new(&[
    (0, "Reserved"),
    (1, "Probe"),
    (2, "Echo"),
    (3, "Flush"),
]);

#[derive(Catalog)]
#[allow(dead_code)]
struct VersionOpcode {
    #[pktwalk(mask = 0xE0)]
    version: u8,
    #[pktwalk(mask = 0x1F, lookup = "OPCODES")]
    opcode: u8,
}

#[derive(Catalog)]
#[allow(dead_code)]
struct Flags {
    #[pktwalk(rename = "Recommended Timeout", abbrev = "rt", mask = 0x01)]
    recommended_timeout: bool,
    #[pktwalk(rename = "ReSynch", abbrev = "rsy", mask = 0x02)]
    resynch: bool,
}

#[derive(Catalog)]
#[pktwalk(name = "Far End Failure Detection", abbrev = "fefd")]
#[allow(dead_code)]
struct Pdu {
    #[pktwalk(rename = "Version/Opcode", bits = "VersionOpcode")]
    version_opcode: u8,
    #[pktwalk(bits = "Flags")]
    flags: u8,
    checksum: u16,
    #[pktwalk(rename = "TLV", abbrev = "tlv", tlv = "TLV_LAYOUT")]
    tlvs: Vec<Tlv>,
}

#[derive(Variants)]
#[pktwalk(name = "TLV Type")]
#[allow(dead_code)]
enum Tlv {
    #[pktwalk(tag = 1, rename = "Device ID")]
    DeviceId(#[pktwalk(rest)] String),
    #[pktwalk(tag = 2, rename = "Port ID")]
    PortId(#[pktwalk(rest)] String),
    #[pktwalk(tag = 3)]
    Echo(#[pktwalk(rest)] Vec<u8>),
    /// Seconds between probes.
    #[pktwalk(tag = 4)]
    MessageInterval(u8),
    #[pktwalk(tag = 5)]
    TimeoutInterval(u8),
    #[pktwalk(tag = 6)]
    DeviceName(#[pktwalk(rest)] String),
    #[pktwalk(tag = 7)]
    SequenceNumber(u32),
}

pub struct Fefd;

pub(super) fn register(builder: &mut RegistryBuilder, _prefs: &ProtocolPrefs) {
    builder.register(
        TransportKind::Table("llc.cisco_pid"),
        CISCO_PID_FEFD,
        Arc::new(Fefd),
    );
}

impl Dissector for Fefd {
    fn name(&self) -> &'static str {
        "fefd"
    }

    fn dissect<'a>(&self, cx: &mut DissectContext<'_, 'a>, view: ByteView<'a>) -> DissectEntryResult {
        let layer = walk_protocol(Pdu::catalog(), &view);

        cx.columns.set_protocol("FEFD");
        if let Ok(first) = view.get_u8(0) {
            cx.columns.set_info(OPCODES.lookup(u64::from(first & 0x1F)));
        }

        let res = layer.outcome();
        cx.push(layer.node);
        res
    }
}
