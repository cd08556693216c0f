#![allow(dead_code)]

// Tests that we can use types in other modules as fields on the catalog

use pktwalk::*;

#[derive(Catalog)]
#[pktwalk(abbrev = "foo")]
struct ProtoFoo {
    foo: foo::Foo,
}

mod foo {
    use pktwalk::*;

    #[derive(Catalog)]
    pub struct Foo {
        bar: bar::Bar,
    }

    mod bar {
        use pktwalk::*;

        #[derive(Catalog)]
        pub struct Bar {
            x: u8,
        }
    }
}

fn main() {
    let data = [7_u8];
    let walk = decode(ProtoFoo::catalog(), &ByteView::new(&data), 0).unwrap();
    assert_eq!(walk.find("foo.foo.bar.x").and_then(|f| f.value.as_u64()), Some(7));
}
