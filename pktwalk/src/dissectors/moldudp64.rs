//! MoldUDP64, a framing for sequenced market data messages over UDP.
//!
//! Each datagram carries a session, the sequence number of its first message, and a count of
//! message blocks. Messages are numbered implicitly from the header's sequence number. The
//! message bytes are handed to whatever is registered in the `moldudp64.payload` table.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::catalog::{CatalogBuilder, CountRule, FieldCatalog, GroupSpec, Repeat};
use crate::decoded::{DecodedField, Value};
use crate::field::{FieldSpec, FieldType, LengthRule};
use crate::prefs::{PortRange, ProtocolPrefs};
use crate::registry::{
    DissectContext, DissectEntryResult, Dissector, RegistryBuilder, TransportKind,
};
use crate::view::{ByteOrder, ByteView};
use crate::Catalog;

use super::walk_protocol;

const DEFAULT_PORT: u16 = 31001;
const PAYLOAD_TABLE: TransportKind = TransportKind::Table("moldudp64.payload");

const SEQUENCE_OFFSET: usize = 10;
const COUNT_OFFSET: usize = 18;
/// A message count announcing that the session is over. No blocks follow.
const END_OF_SESSION: u16 = 0xFFFF;

const BLOCK: &str = "moldudp64.message_block";
const BLOCK_DATA: &str = "moldudp64.message_block.message_data";

#[derive(Catalog)]
#[pktwalk(name = "Message Block", abbrev = "message_block")]
#[allow(dead_code)]
struct MessageBlock {
    message_length: u16,
    #[pktwalk(len_field = "message_length")]
    message_data: Vec<u8>,
}

fn header() -> CatalogBuilder {
    FieldCatalog::builder("MoldUDP64", "moldudp64")
        .field(
            FieldSpec::new("Session", "session", FieldType::String)
                .with_length(LengthRule::Fixed(10)),
        )
        .field(FieldSpec::new(
            "Sequence Number",
            "sequence_number",
            FieldType::U64,
        ))
        .field(FieldSpec::new(
            "Message Count",
            "message_count",
            FieldType::U16,
        ))
}

static PACKET: Lazy<FieldCatalog> = Lazy::new(|| {
    header()
        .group(GroupSpec::repeated(
            "Message Block",
            "message_block",
            MessageBlock::catalog().clone(),
            Repeat::Count(CountRule::Field("message_count")),
        ))
        .build()
        .unwrap_or_else(|e| panic!("invalid MoldUDP64 catalog: {e}"))
});

static END_OF_SESSION_PACKET: Lazy<FieldCatalog> = Lazy::new(|| {
    header()
        .build()
        .unwrap_or_else(|e| panic!("invalid MoldUDP64 catalog: {e}"))
});

pub struct MoldUdp64;

pub(super) fn register(builder: &mut RegistryBuilder, prefs: &ProtocolPrefs) {
    let ports = prefs
        .udp_ports
        .clone()
        .unwrap_or_else(|| PortRange::single(DEFAULT_PORT));
    builder.register_ports(TransportKind::UdpPort, &ports, Arc::new(MoldUdp64));
}

impl Dissector for MoldUdp64 {
    fn name(&self) -> &'static str {
        "moldudp64"
    }

    fn dissect<'a>(&self, cx: &mut DissectContext<'_, 'a>, view: ByteView<'a>) -> DissectEntryResult {
        let count = view.get_u16(COUNT_OFFSET, ByteOrder::Big).ok();
        let catalog = match count {
            Some(END_OF_SESSION) => &*END_OF_SESSION_PACKET,
            _ => &*PACKET,
        };
        let mut layer = walk_protocol(catalog, &view);
        let sequence = view.get_u64(SEQUENCE_OFFSET, ByteOrder::Big).ok();

        cx.columns.set_protocol("MoldUDP64");
        match (sequence, count) {
            (Some(seq), Some(END_OF_SESSION)) => {
                cx.columns.set_info(format!("SeqNum = {seq}, End of Session"));
            }
            (Some(seq), Some(count)) => {
                cx.columns
                    .set_info(format!("SeqNum = {seq}, MsgCount = {count}"));
            }
            _ => (),
        }

        let mut res = layer.outcome();
        let blocks = layer
            .node
            .children
            .iter_mut()
            .filter(|f| f.abbrev == BLOCK)
            .enumerate();
        for (i, block) in blocks {
            if let Some(seq) = sequence {
                block.children.insert(
                    0,
                    DecodedField::generated(
                        "Sequence Number",
                        format!("{BLOCK}.sequence_number"),
                        FieldType::U64,
                        block.start,
                        Value::UInt(seq.wrapping_add(i as u64)),
                    ),
                );
            }
            if block.diagnostic.is_some() {
                continue;
            }

            let Some((start, len)) = block.find(BLOCK_DATA).map(|f| (f.start, f.len)) else {
                continue;
            };
            let Ok(payload) = view.subset(start - view.base(), len) else {
                continue;
            };
            let sub = cx.dispatch_under(block, PAYLOAD_TABLE, 0, payload);
            if let DissectEntryResult::Error(diag) = sub {
                if matches!(res, DissectEntryResult::Consumed(_)) {
                    res = DissectEntryResult::Error(diag);
                }
            }
        }

        cx.push(layer.node);
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DissectorTable, PacketInfo};
    use hex_literal::hex;

    /// Claims whatever it is handed.
    struct Itch;

    impl Dissector for Itch {
        fn name(&self) -> &'static str {
            "itch"
        }

        fn dissect<'a>(
            &self,
            cx: &mut DissectContext<'_, 'a>,
            view: ByteView<'a>,
        ) -> DissectEntryResult {
            let Ok(kind) = view.get_u8(0) else {
                return DissectEntryResult::NotThisProtocol;
            };
            cx.push(DecodedField::field(
                "Message Type",
                "itch.message_type",
                FieldType::U8,
                view.base(),
                1,
                Value::UInt(u64::from(kind)),
            ));
            DissectEntryResult::Consumed(view.reported_len())
        }
    }

    fn table() -> DissectorTable {
        let mut builder = RegistryBuilder::new();
        register(&mut builder, &ProtocolPrefs::default());
        builder.register(PAYLOAD_TABLE, 0, Arc::new(Itch));
        builder.build()
    }

    #[test]
    fn test_payloads_are_handed_on() {
        let data = hex!(
            "53 45 53 53 49 4f 4e 30 30 31"
            "00 00 00 00 00 00 00 07"
            "00 02"
            "00 02 41 42"
            "00 01 53"
        );
        let dissection = table().dissect(
            TransportKind::UdpPort,
            u32::from(DEFAULT_PORT),
            ByteView::new(&data),
            PacketInfo::default(),
        );
        assert_eq!(dissection.outcome, DissectEntryResult::Consumed(data.len()));
        assert_eq!(dissection.columns.info, "SeqNum = 7, MsgCount = 2");

        let root = &dissection.tree[0];
        let blocks: Vec<_> = root.children.iter().filter(|f| f.abbrev == BLOCK).collect();
        assert_eq!(blocks.len(), 2);

        let seqs: Vec<_> = blocks
            .iter()
            .filter_map(|b| b.find("moldudp64.message_block.sequence_number"))
            .map(|f| (f.generated, f.value.clone()))
            .collect();
        assert_eq!(seqs, [(true, Value::UInt(7)), (true, Value::UInt(8))]);

        let kinds: Vec<_> = blocks
            .iter()
            .filter_map(|b| b.find("itch.message_type"))
            .map(|f| (f.start, f.value.clone()))
            .collect();
        assert_eq!(kinds, [(22, Value::UInt(0x41)), (26, Value::UInt(0x53))]);
    }

    #[test]
    fn test_end_of_session() {
        let data = hex!(
            "53 45 53 53 49 4f 4e 30 30 31"
            "00 00 00 00 00 00 01 00"
            "ff ff"
        );
        let dissection = table().dissect(
            TransportKind::UdpPort,
            u32::from(DEFAULT_PORT),
            ByteView::new(&data),
            PacketInfo::default(),
        );
        assert_eq!(dissection.outcome, DissectEntryResult::Consumed(20));
        assert_eq!(dissection.columns.info, "SeqNum = 256, End of Session");
        assert!(dissection.diagnostics().is_empty());
        assert_eq!(
            dissection.find("moldudp64.session").and_then(|f| f.value.as_str().map(str::to_owned)),
            Some("SESSION001".to_string())
        );
    }

    #[test]
    fn test_heartbeat_has_no_blocks() {
        let data = hex!(
            "53 45 53 53 49 4f 4e 30 30 31"
            "00 00 00 00 00 00 00 09"
            "00 00"
        );
        let dissection = table().dissect(
            TransportKind::UdpPort,
            u32::from(DEFAULT_PORT),
            ByteView::new(&data),
            PacketInfo::default(),
        );
        assert_eq!(dissection.outcome, DissectEntryResult::Consumed(20));
        assert!(dissection.find(BLOCK).is_none());
    }

    #[test]
    fn test_missing_blocks_are_malformed() {
        let data = hex!(
            "53 45 53 53 49 4f 4e 30 30 31"
            "00 00 00 00 00 00 00 01"
            "00 03"
            "00 01 41"
        );
        let dissection = table().dissect(
            TransportKind::UdpPort,
            u32::from(DEFAULT_PORT),
            ByteView::new(&data),
            PacketInfo::default(),
        );
        let DissectEntryResult::Error(diag) = &dissection.outcome else {
            panic!("unexpected outcome {:?}", dissection.outcome);
        };
        assert_eq!(diag.message, "expected 3 Message Block elements, found 1");
        assert_eq!(dissection.diagnostics().len(), 1);
        // the block that did decode still reaches the payload table
        assert!(dissection.find("itch.message_type").is_some());
    }
}
