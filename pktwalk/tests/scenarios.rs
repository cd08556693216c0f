use hex_literal::hex;
use pktwalk::{
    decode, ByteOrder, ByteView, DiagnosticKind, DissectEntryResult, DissectorRegistry,
    FieldCatalog, FieldSpec, FieldType, LengthRule, PacketInfo, ReadError, TlvLayout, TlvSpec, TransportKind,
    Value, ValueTable, VariantCatalog,
};
use test_case::test_case;

const MOLDUDP64_PORT: u32 = 31001;
const BLOCK: &str = "moldudp64.message_block";

/// Session `SESSION001`, first sequence number 1, two message blocks.
const TWO_BLOCKS: [u8; 29] = hex!(
    "53 45 53 53 49 4f 4e 30 30 31"
    "00 00 00 00 00 00 00 01"
    "00 02"
    "00 02 41 42"
    "00 03 53 54 55"
);

fn moldudp64(data: &[u8]) -> pktwalk::Dissection<'_> {
    DissectorRegistry::with_defaults().dissect(
        TransportKind::UdpPort,
        MOLDUDP64_PORT,
        ByteView::new(data),
        PacketInfo::default(),
    )
}

#[test]
fn moldudp64_blocks_are_numbered_from_the_header() {
    let dissection = moldudp64(&TWO_BLOCKS);
    assert_eq!(dissection.outcome, DissectEntryResult::Consumed(29));
    assert!(dissection.diagnostics().is_empty());

    let root = &dissection.tree[0];
    assert_eq!(
        root.find("moldudp64.sequence_number").map(|f| f.value.clone()),
        Some(Value::UInt(1))
    );
    assert_eq!(
        root.find("moldudp64.message_count").map(|f| f.value.clone()),
        Some(Value::UInt(2))
    );

    let blocks: Vec<_> = root.find_all(BLOCK).collect();
    assert_eq!(blocks.len(), 2);
    let seqs: Vec<_> = blocks
        .iter()
        .filter_map(|b| b.find("moldudp64.message_block.sequence_number"))
        .map(|f| f.value.clone())
        .collect();
    assert_eq!(seqs, [Value::UInt(1), Value::UInt(2)]);
    assert_eq!(
        blocks.iter().map(|b| (b.start, b.len)).collect::<Vec<_>>(),
        [(20, 4), (24, 5)]
    );
}

#[test]
fn moldudp64_overlong_block_is_malformed() {
    let mut data = TWO_BLOCKS;
    data[25] = 0x09;
    let dissection = moldudp64(&data);

    let DissectEntryResult::Error(diag) = &dissection.outcome else {
        panic!("unexpected outcome {:?}", dissection.outcome);
    };
    assert_eq!(diag.kind, DiagnosticKind::Malformed);
    assert_eq!(diag.offset, 26);

    let diagnostics = dissection.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics
        .iter()
        .all(|d| d.kind != DiagnosticKind::OutOfBounds));

    let blocks: Vec<_> = dissection.tree[0].find_all(BLOCK).collect();
    assert_eq!(blocks.len(), 2);
    assert!(blocks[0].diagnostic.is_none());
    assert_eq!(blocks[1].diagnostic.as_ref(), Some(diag));
}

#[test]
fn moldudp64_over_udp() {
    let mut frame = hex!("9c 40 79 19 00 25 00 00").to_vec();
    frame.extend_from_slice(&TWO_BLOCKS);
    let dissection = DissectorRegistry::with_defaults().dissect(
        TransportKind::IpProtocol,
        17,
        ByteView::new(&frame),
        PacketInfo::default(),
    );
    assert_eq!(dissection.outcome, DissectEntryResult::Consumed(37));
    assert_eq!(dissection.columns.protocol, "MoldUDP64");
    assert_eq!(dissection.columns.info, "SeqNum = 1, MsgCount = 2");

    // offsets are relative to the whole frame
    let blocks: Vec<_> = dissection
        .tree
        .iter()
        .flat_map(|f| f.find_all(BLOCK))
        .map(|b| b.start)
        .collect();
    assert_eq!(blocks, [28, 32]);
}

fn supervision_tlvs() -> FieldCatalog {
    let source = FieldCatalog::builder("PRP Node", "prp_node")
        .field(FieldSpec::new("Source MAC Address", "source_mac", FieldType::Ether))
        .build()
        .unwrap();
    let variants = VariantCatalog::builder("TLV Type")
        .variant(&[20], "PRP Node", "prp_node", source)
        .variant(&[0], "End of TLVs", "end", FieldCatalog::builder("End", "end").build().unwrap())
        .build()
        .unwrap();
    FieldCatalog::builder("Supervision", "sup")
        .tlv(TlvSpec::new(
            "TLV",
            "tlv",
            TlvLayout::new(1, 1).with_end_type(0),
            variants,
        ))
        .build()
        .unwrap()
}

#[test]
fn tlv_walk_stops_after_the_end_sentinel() {
    // anything past the sentinel is not even looked at, bad lengths included
    let data = hex!("14 06 00 15 5d 01 02 03 00 00 ff ff ff");
    let walk = decode(&supervision_tlvs(), &ByteView::new(&data), 0).unwrap();
    assert!(walk.is_complete());
    assert_eq!(walk.offset, 10);

    let tlvs: Vec<_> = walk.fields.iter().map(|f| (f.name, f.start, f.len)).collect();
    assert_eq!(tlvs, [("PRP Node", 0, 8), ("End of TLVs", 8, 2)]);
    assert_eq!(
        walk.find("sup.tlv.source_mac").map(|f| f.value.clone()),
        Some(Value::Ether([0x00, 0x15, 0x5d, 0x01, 0x02, 0x03]))
    );
}

#[test]
fn truncated_and_out_of_bounds_reads_differ() {
    let data = [0_u8; 50];
    let view = ByteView::truncated(&data, 100);
    assert!(matches!(
        view.get_u32(60, ByteOrder::Big),
        Err(ReadError::Truncated { offset: 60, .. })
    ));
    assert!(matches!(
        view.get_u32(200, ByteOrder::Big),
        Err(ReadError::OutOfBounds { offset: 200, .. })
    ));
    // straddling the captured end is still only truncation
    assert!(matches!(
        view.get_u32(48, ByteOrder::Big),
        Err(ReadError::Truncated { .. })
    ));
    assert!(matches!(
        view.get_u32(98, ByteOrder::Big),
        Err(ReadError::OutOfBounds { .. })
    ));
}

#[test]
fn truncated_walk_keeps_what_was_captured() {
    let catalog = FieldCatalog::builder("Test", "test")
        .field(FieldSpec::new("Skip", "skip", FieldType::Bytes).with_length(LengthRule::Fixed(46)))
        .field(FieldSpec::new("A", "a", FieldType::U32))
        .field(FieldSpec::new("B", "b", FieldType::U32))
        .build()
        .unwrap();
    let data = [0_u8; 50];
    let walk = decode(&catalog, &ByteView::truncated(&data, 100), 0).unwrap();
    let diag = walk.diagnostic.as_ref().unwrap();
    assert_eq!(diag.kind, DiagnosticKind::Truncated);
    assert_eq!(diag.offset, 50);
    assert_eq!(walk.offset, 50);
    assert!(walk.find("test.a").is_some());
    assert!(walk.find("test.b").is_none());
}

static COLOURS: ValueTable = ValueTable::new(&[(1, "Red"), (2, "Green"), (0x7f, "Blue")]);

#[test_case(1, "Red")]
#[test_case(2, "Green")]
#[test_case(0x7f, "Blue")]
#[test_case(0, "Unknown (0x0)")]
#[test_case(0xfe, "Unknown (0xfe)")]
fn enum_lookup(value: u8, label: &str) {
    let catalog = FieldCatalog::builder("Test", "test")
        .field(FieldSpec::new("Colour", "colour", FieldType::U8).with_table(&COLOURS))
        .build()
        .unwrap();
    let data = [value];
    let walk = decode(&catalog, &ByteView::new(&data), 0).unwrap();
    let field = walk.find("test.colour").unwrap();
    assert_eq!(field.value, Value::UInt(u64::from(value)));
    assert_eq!(field.display.as_deref(), Some(label));
    assert_eq!(COLOURS.lookup(u64::from(value)), label);
}

#[test]
fn custom_fallback_label() {
    static CODES: ValueTable = ValueTable::new(&[(0, "Ok")]).with_unknown("Reserved");
    assert_eq!(CODES.lookup(0), "Ok");
    assert_eq!(CODES.lookup(9), "Reserved (0x9)");
}

#[test_case(0xF000, 0x1234, 0x1; "top nibble")]
#[test_case(0x0FFF, 0x1234, 0x234; "low bits")]
#[test_case(0x0180, 0xffff, 0x3; "straddling bytes")]
#[test_case(0x0001, 0x0000, 0x0; "single bit")]
fn mask_extraction(mask: u64, raw: u16, want: u64) {
    let spec = FieldSpec::new("Bits", "bits", FieldType::U16).with_mask(mask);
    let catalog = FieldCatalog::builder("Test", "test")
        .field(spec.clone())
        .build()
        .unwrap();
    let data = raw.to_be_bytes();
    let walk = decode(&catalog, &ByteView::new(&data), 0).unwrap();
    assert_eq!(walk.find("test.bits").unwrap().value, Value::UInt(want));

    let raw = u64::from(raw);
    assert_eq!(spec.extract(raw), (raw & mask) >> mask.trailing_zeros());
    // putting the value back leaves the other bits as they were
    assert_eq!(spec.encode_masked(raw, want), raw);
    let other = spec.encode_masked(raw, want ^ 1);
    assert_eq!(other & !mask, raw & !mask);
    assert_eq!(spec.extract(other), want ^ 1);
}
