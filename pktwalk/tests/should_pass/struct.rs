#![allow(dead_code)]

// Tests that structs can derive Catalog

use pktwalk::*;

#[derive(Catalog)]
#[pktwalk(name = "Proto Foo", abbrev = "foo")]
struct ProtoFoo {
    bar: u64,
    baz: [u8; 9],
    #[pktwalk(enc = "le")]
    qux: u32,
    flag: bool,
}

fn main() {
    let catalog = ProtoFoo::catalog();
    assert_eq!(catalog.abbrev(), "foo");
    assert_eq!(catalog.items().len(), 4);
}
