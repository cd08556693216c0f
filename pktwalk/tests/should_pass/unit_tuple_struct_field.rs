#![allow(dead_code)]

// Tests that field types which are a unit tuple struct work fine

use pktwalk::*;

#[derive(Catalog)]
#[pktwalk(abbrev = "foo")]
struct ProtoFoo {
    foo: Foo,
}

#[derive(Catalog)]
struct Foo(#[pktwalk(enc = "le")] u16);

fn main() {
    let data = [0x01, 0x02];
    let walk = decode(ProtoFoo::catalog(), &ByteView::new(&data), 0).unwrap();
    assert_eq!(walk.find("foo.foo.foo").and_then(|f| f.value.as_u64()), Some(0x0201));
}
