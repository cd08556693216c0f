#![allow(dead_code)]

// Tests type-length-value lists, with masked sub-fields in the header

use pktwalk::*;

const LAYOUT: TlvLayout = TlvLayout::new(1, 1).with_end_type(0);

#[derive(Catalog)]
struct Bits {
    #[pktwalk(mask = 0xF0)]
    high: u8,
    #[pktwalk(mask = 0x0F)]
    low: u8,
}

#[derive(Catalog)]
#[pktwalk(abbrev = "foo")]
struct ProtoFoo {
    #[pktwalk(bits = "Bits")]
    header: u8,
    #[pktwalk(tlv = "LAYOUT")]
    options: Vec<Opt>,
}

#[derive(Variants)]
enum Opt {
    #[pktwalk(tag = 0)]
    End,
    #[pktwalk(tag = 1)]
    Name(#[pktwalk(rest)] String),
    #[pktwalk(tag = 2)]
    Address(std::net::Ipv4Addr),
}

fn main() {
    let data = [0x12, 0x01, 0x02, b'h', b'i', 0x02, 0x04, 10, 0, 0, 1, 0x00, 0x00];
    let walk = decode(ProtoFoo::catalog(), &ByteView::new(&data), 0).unwrap();
    assert!(walk.is_complete());
    assert_eq!(walk.offset, data.len());
    assert_eq!(walk.find("foo.header.low").and_then(|f| f.value.as_u64()), Some(2));
    assert_eq!(walk.find("foo.options.name").and_then(|f| f.value.as_str()), Some("hi"));
    assert!(walk.find("foo.options.address").is_some());
}
