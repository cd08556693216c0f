#![allow(dead_code)]

// Tests that an enum deriving Variants can be chosen by an earlier field

use pktwalk::*;

static KINDS: ValueTable = ValueTable::new(&[(1, "Ping"), (2, "Pong")]);

#[derive(Catalog)]
#[pktwalk(abbrev = "foo")]
struct ProtoFoo {
    #[pktwalk(lookup = "KINDS")]
    kind: u8,
    #[pktwalk(dispatch_field = "kind")]
    body: Body,
}

#[derive(Variants)]
enum Body {
    #[pktwalk(tag = 1)]
    Ping { id: u16 },
    #[pktwalk(tag = [2, 3])]
    Pong(u32),
    #[pktwalk(default)]
    Other {
        #[pktwalk(rest)]
        raw: Vec<u8>,
    },
}

fn main() {
    let data = [0x01, 0x00, 0x2a];
    let walk = decode(ProtoFoo::catalog(), &ByteView::new(&data), 0).unwrap();
    assert_eq!(walk.find("foo.body").and_then(|f| f.display.as_deref()), Some("Ping"));
    assert_eq!(walk.find("foo.body.id").and_then(|f| f.value.as_u64()), Some(42));

    let data = [0x09, 0xff];
    let walk = decode(ProtoFoo::catalog(), &ByteView::new(&data), 0).unwrap();
    assert!(walk.find("foo.body.raw").is_some());
}
