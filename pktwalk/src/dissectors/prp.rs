//! HSR/PRP supervision frames, sent periodically by redundancy-aware nodes to announce
//! themselves.

use std::sync::Arc;

use crate::catalog::TlvLayout;
use crate::prefs::ProtocolPrefs;
use crate::registry::{
    DissectContext, DissectEntryResult, Dissector, RegistryBuilder, TransportKind,
};
use crate::view::{ByteOrder, ByteView};
use crate::{Catalog, Variants};

use super::walk_protocol;

const ETHERTYPE_SUPERVISION: u32 = 0x88FB;

/// One byte each for type and length. A type 0 TLV ends the list, and anything after it is
/// padding.
const TLV_LAYOUT: TlvLayout = TlvLayout::new(1, 1).with_end_type(0);

#[derive(Catalog)]
#[allow(dead_code)]
struct PathVersion {
    #[pktwalk(mask = 0xF000)]
    path: u16,
    #[pktwalk(mask = 0x0FFF)]
    version: u16,
}

#[derive(Catalog)]
#[pktwalk(name = "HSR/PRP Supervision", abbrev = "prp")]
#[allow(dead_code)]
struct Supervision {
    #[pktwalk(rename = "Path/Version", bits = "PathVersion")]
    path_version: u16,
    sequence_number: u16,
    #[pktwalk(rename = "TLV", abbrev = "tlv", tlv = "TLV_LAYOUT")]
    tlvs: Vec<Tlv>,
}

#[derive(Variants)]
#[pktwalk(name = "TLV Type")]
#[allow(dead_code)]
enum Tlv {
    #[pktwalk(tag = 0, rename = "End of TLVs")]
    End,
    #[pktwalk(tag = 20, rename = "PRP Node (Duplicate Discard)")]
    DuplicateDiscard {
        #[pktwalk(rename = "Source MAC Address", typ = "ether")]
        source_mac: [u8; 6],
    },
    #[pktwalk(tag = 21, rename = "PRP Node (Duplicate Accept)")]
    DuplicateAccept {
        #[pktwalk(rename = "Source MAC Address", typ = "ether")]
        source_mac: [u8; 6],
    },
    #[pktwalk(tag = 22, rename = "Obsolete TLV")]
    Obsolete {
        #[pktwalk(rename = "Source MAC Address", typ = "ether")]
        source_mac: [u8; 6],
    },
    #[pktwalk(tag = 23, rename = "HSR Node")]
    HsrNode {
        #[pktwalk(rename = "Source MAC Address", typ = "ether")]
        source_mac: [u8; 6],
    },
    #[pktwalk(tag = 30, rename = "RedBox MAC Address")]
    RedboxMac(#[pktwalk(typ = "ether")] [u8; 6]),
    #[pktwalk(tag = 31, rename = "VDAN MAC Address")]
    VdanMac(#[pktwalk(typ = "ether")] [u8; 6]),
}

pub struct Prp;

pub(super) fn register(builder: &mut RegistryBuilder, _prefs: &ProtocolPrefs) {
    builder.register(TransportKind::Ethertype, ETHERTYPE_SUPERVISION, Arc::new(Prp));
}

impl Dissector for Prp {
    fn name(&self) -> &'static str {
        "prp"
    }

    fn dissect<'a>(&self, cx: &mut DissectContext<'_, 'a>, view: ByteView<'a>) -> DissectEntryResult {
        let layer = walk_protocol(Supervision::catalog(), &view);

        cx.columns.set_protocol("HSR/PRP");
        cx.columns.set_info("Supervision Frame");
        if let Ok(seq) = view.get_u16(2, ByteOrder::Big) {
            cx.columns.append_info(&format!("SeqNum = {seq}"));
        }
        if let Some(mac) = layer.node.find("prp.tlv.source_mac") {
            cx.columns.append_info(&format!("MAC = {}", mac.value));
        }

        let res = layer.outcome();
        cx.push(layer.node);
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoded::{DiagnosticKind, Value};
    use crate::registry::{DissectorTable, PacketInfo, Dissection};
    use hex_literal::hex;

    fn table() -> DissectorTable {
        let mut builder = RegistryBuilder::new();
        register(&mut builder, &ProtocolPrefs::default());
        builder.build()
    }

    fn dissect<'a>(table: &DissectorTable, data: &'a [u8]) -> Dissection<'a> {
        table.dissect(
            TransportKind::Ethertype,
            ETHERTYPE_SUPERVISION,
            ByteView::new(data),
            PacketInfo::default(),
        )
    }

    #[test]
    fn test_stops_at_end_tlv() {
        let data = hex!(
            "10 01 00 2a"
            "14 06 00 15 5d 01 02 03"
            "00 00"
            "00 00 00 00 00 00"
        );
        let table = table();
        let dissection = dissect(&table, &data);
        assert_eq!(dissection.outcome, DissectEntryResult::Consumed(14));
        assert_eq!(
            dissection.columns.info,
            "Supervision Frame, SeqNum = 42, MAC = 00:15:5d:01:02:03"
        );

        let root = &dissection.tree[0];
        assert_eq!(root.find("prp.path_version.path").unwrap().value, Value::UInt(1));
        assert_eq!(root.find("prp.path_version.version").unwrap().value, Value::UInt(1));

        let tlvs: Vec<_> = root
            .find_all("prp.tlv")
            .map(|f| (f.name, f.start, f.len))
            .collect();
        assert_eq!(
            tlvs,
            [("PRP Node (Duplicate Discard)", 4, 8), ("End of TLVs", 12, 2)]
        );
    }

    #[test]
    fn test_overlong_tlv() {
        let data = hex!("10 01 00 01 14 0a 00 15 5d 01 02 03 00 00");
        let table = table();
        let dissection = dissect(&table, &data);
        let DissectEntryResult::Error(diag) = &dissection.outcome else {
            panic!("unexpected outcome {:?}", dissection.outcome);
        };
        assert_eq!(diag.kind, DiagnosticKind::Malformed);
        assert_eq!(diag.offset, 5);
        assert_eq!(diag.message, "TLV length 10 exceeds the 8 bytes remaining");
        let tlv = dissection.find("prp.tlv").unwrap();
        assert_eq!(tlv.diagnostic.as_ref(), Some(diag));
    }

    #[test]
    fn test_value_too_short_for_its_type() {
        let data = hex!("10 01 00 01 1e 04 00 15 5d 01 00 00");
        let table = table();
        let dissection = dissect(&table, &data);
        let DissectEntryResult::Error(diag) = &dissection.outcome else {
            panic!("unexpected outcome {:?}", dissection.outcome);
        };
        assert_eq!(diag.message, "TLV value of 4 bytes is too short");
        assert_eq!(dissection.diagnostics().len(), 1);
    }

    #[test]
    fn test_unknown_tlv_is_kept_raw() {
        let data = hex!("10 01 00 01 63 02 ab cd 00 00");
        let table = table();
        let dissection = dissect(&table, &data);
        assert_eq!(dissection.outcome, DissectEntryResult::Consumed(10));
        let tlv = dissection.find("prp.tlv").unwrap();
        assert_eq!(tlv.display.as_deref(), Some("Unknown (0x63)"));
        assert_eq!(
            tlv.find("prp.tlv.value").map(|f| f.value.clone()),
            Some(Value::Bytes(&[0xab, 0xcd]))
        );
    }
}
