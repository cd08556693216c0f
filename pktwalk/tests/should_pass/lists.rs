#![allow(dead_code)]

// Tests counted and open-ended lists, and the length rules of variable sized fields

use pktwalk::*;

#[derive(Catalog)]
#[pktwalk(abbrev = "foo")]
struct ProtoFoo {
    n: u8,
    #[pktwalk(len_field = "n")]
    blocks: Vec<Block>,
    #[pktwalk(prefix = 1)]
    name: String,
    #[pktwalk(delimiter = b';')]
    tag: String,
    #[pktwalk(rest)]
    words: Vec<Word>,
}

#[derive(Catalog)]
struct Block {
    len: u16,
    #[pktwalk(len_field = "len")]
    data: Vec<u8>,
}

#[derive(Catalog)]
struct Word {
    #[pktwalk(line)]
    text: String,
}

fn main() {
    let data = b"\x02\x00\x01a\x00\x00\x03bobx;hello\r\nworld\n";
    let walk = decode(ProtoFoo::catalog(), &ByteView::new(data), 0).unwrap();
    assert!(walk.is_complete());
    assert_eq!(walk.fields.iter().filter(|f| f.abbrev == "foo.blocks").count(), 2);
    assert_eq!(walk.find("foo.name").and_then(|f| f.value.as_str()), Some("bob"));
    assert_eq!(walk.find("foo.tag").and_then(|f| f.value.as_str()), Some("x"));
    let words: Vec<_> = walk
        .fields
        .iter()
        .filter_map(|f| f.find("foo.words.text"))
        .filter_map(|f| f.value.as_str())
        .collect();
    assert_eq!(words, ["hello", "world"]);
}
