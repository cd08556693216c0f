#![allow(dead_code)]

// Tests fixed size fields: byte arrays, text of a fixed width, MAC addresses and 24-bit integers

use pktwalk::*;

#[derive(Catalog)]
struct ProtoFoo {
    raw: [u8; 3],
    #[pktwalk(typ = "string")]
    session: [u8; 10],
    #[pktwalk(typ = "ether")]
    mac: [u8; 6],
    #[pktwalk(typ = "u24")]
    offset: u32,
}

fn main() {
    let data = [0_u8; 22];
    let walk = decode(ProtoFoo::catalog(), &ByteView::new(&data), 0).unwrap();
    assert!(walk.is_complete());
    assert_eq!(walk.offset, 22);
    assert_eq!(walk.find("proto_foo.offset").unwrap().typ, Some(FieldType::U24));
}
