//! Gopher, a line-oriented document retrieval protocol.
//!
//! A client sends a selector terminated by CRLF. The server answers with either a menu, one
//! tab-separated entry per line ending with a lone `.`, or with the document itself.

use std::borrow::Cow;
use std::sync::Arc;

use crate::cursor::CursorDissector;
use crate::decoded::{DecodedField, Diagnostic};
use crate::field::ValueTable;
use crate::prefs::{PortRange, ProtocolPrefs};
use crate::registry::{
    DissectContext, DissectEntryResult, Dissector, RegistryBuilder, TransportKind,
};
use crate::view::ByteView;
use crate::Catalog;

use super::{outcome, walk_protocol};

const DEFAULT_PORT: u16 = 70;

const DIRECTORY_LIST: &str = "[Directory list]";

static ITEM_TYPES: ValueTable = ValueTable::new(&[
    (b'0' as u64, "File"),
    (b'1' as u64, "Directory"),
    (b'2' as u64, "CSO phone-book server"),
    (b'3' as u64, "Error"),
    (b'4' as u64, "BinHexed Macintosh file"),
    (b'5' as u64, "DOS binary archive"),
    (b'6' as u64, "UNIX uuencoded file"),
    (b'7' as u64, "Index-Search server"),
    (b'8' as u64, "Telnet session"),
    (b'9' as u64, "Binary file"),
    (b'+' as u64, "Redundant server"),
    (b'T' as u64, "tn3270 session"),
    (b'g' as u64, "GIF file"),
    (b'I' as u64, "Image file"),
    (b'h' as u64, "HTML"),
    (b'i' as u64, "Informational message"),
    (b's' as u64, "Sound"),
]);

#[derive(Catalog)]
#[pktwalk(name = "Gopher", abbrev = "gopher")]
#[allow(dead_code)]
struct Request {
    #[pktwalk(rename = "Query", line)]
    query: String,
}

#[derive(Catalog)]
#[pktwalk(name = "Directory Entry", abbrev = "gopher.direntry")]
#[allow(dead_code)]
struct DirEntry {
    #[pktwalk(rename = "Item Type", lookup = "ITEM_TYPES")]
    item_type: u8,
    #[pktwalk(rename = "Display String", delimiter = b'\t')]
    name: String,
    #[pktwalk(delimiter = b'\t')]
    selector: String,
    #[pktwalk(delimiter = b'\t')]
    host: String,
    #[pktwalk(line)]
    port: String,
}

#[derive(Catalog)]
#[pktwalk(name = "Gopher", abbrev = "gopher")]
#[allow(dead_code)]
struct Document {
    #[pktwalk(rest)]
    message_body: Vec<u8>,
}

/// Tells requests from responses by whether the destination port is one of `ports`.
pub struct Gopher {
    ports: PortRange,
}

impl Gopher {
    pub fn new(ports: PortRange) -> Self {
        Self { ports }
    }
}

pub(super) fn register(builder: &mut RegistryBuilder, prefs: &ProtocolPrefs) {
    let ports = prefs
        .tcp_ports
        .clone()
        .unwrap_or_else(|| PortRange::single(DEFAULT_PORT));
    let handle = Arc::new(Gopher::new(ports.clone()));
    builder.register_ports(TransportKind::TcpPort, &ports, handle);
}

impl Dissector for Gopher {
    fn name(&self) -> &'static str {
        "gopher"
    }

    fn dissect<'a>(&self, cx: &mut DissectContext<'_, 'a>, view: ByteView<'a>) -> DissectEntryResult {
        cx.columns.set_protocol("Gopher");
        let is_request = cx.pinfo.dst_port.map_or(false, |p| self.ports.contains(p));
        if is_request {
            request(cx, view)
        } else if is_directory(&view) {
            directory(cx, view)
        } else {
            let layer = walk_protocol(Document::catalog(), &view);
            cx.columns.set_info("Response: [Text]");
            let res = layer.outcome();
            cx.push(layer.node);
            res
        }
    }
}

fn request<'a>(cx: &mut DissectContext<'_, 'a>, view: ByteView<'a>) -> DissectEntryResult {
    let mut layer = walk_protocol(Request::catalog(), &view);
    let query = layer
        .node
        .children
        .iter_mut()
        .find(|f| f.abbrev == "gopher.query");
    match query {
        Some(query) if query.value.as_str() == Some("") => {
            query.display = Some(Cow::Borrowed(DIRECTORY_LIST));
            cx.columns.set_info(format!("Request: {DIRECTORY_LIST}"));
        }
        Some(query) => {
            let info = format!("Request: {}", query.value);
            cx.columns.set_info(info);
        }
        None => cx.columns.set_info("Request"),
    }
    let res = layer.outcome();
    cx.push(layer.node);
    res
}

/// A menu starts with a known item type, and has a tab before its first line ends.
fn is_directory(view: &ByteView<'_>) -> bool {
    let Ok(first) = view.get_u8(0) else {
        return false;
    };
    if ITEM_TYPES.get(u64::from(first)).is_none() {
        return false;
    }
    match (view.find_byte(0, b'\t'), view.find_byte(0, b'\n')) {
        (Some(tab), Some(newline)) => tab < newline,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Length of the line holding the lone `.` which closes a menu, if there is one at `offset`.
fn end_of_directory(view: &ByteView<'_>, offset: usize) -> Option<usize> {
    if view.get_u8(offset) != Ok(b'.') {
        return None;
    }
    match (view.get_u8(offset + 1), view.get_u8(offset + 2)) {
        (Ok(b'\n'), _) => Some(2),
        (Ok(b'\r'), Ok(b'\n')) => Some(3),
        (Err(_), _) => Some(1),
        _ => None,
    }
}

fn directory<'a>(cx: &mut DissectContext<'_, 'a>, view: ByteView<'a>) -> DissectEntryResult {
    cx.columns.set_info(format!("Response: {DIRECTORY_LIST}"));
    let mut root = DecodedField::node("Gopher", "gopher", view.base(), 0);
    let mut cursor = CursorDissector::new(view);
    let mut diagnostic = None;
    let mut entries = 0;

    while cursor.remaining() > 0 {
        let start = cursor.offset();
        if let Some(len) = end_of_directory(&view, start) {
            root.push(DecodedField::node(
                "End of Directory",
                "gopher.end",
                view.base() + start,
                len,
            ));
            cursor = CursorDissector::at(view, start + len);
            break;
        }

        let walk = match cursor.decode(DirEntry::catalog()) {
            Ok(walk) => walk,
            Err(e) => {
                diagnostic = Some(Diagnostic::from_read(&e, view.base()));
                break;
            }
        };
        let mut entry = DecodedField::node(
            "Directory Entry",
            "gopher.direntry",
            view.base() + start,
            walk.offset - start,
        );
        entry.children = walk.fields;
        entry.display = entry
            .find("gopher.direntry.name")
            .and_then(|f| f.value.as_str())
            .map(|name| Cow::Owned(name.to_string()));
        entry.diagnostic = walk.diagnostic.clone();
        root.push(entry);
        entries += 1;

        if walk.diagnostic.is_some() {
            diagnostic = walk.diagnostic;
            break;
        }
    }

    root.len = cursor.offset();
    root.display = Some(Cow::Owned(format!("{entries} entries")));
    cx.push(root);
    outcome(cursor.offset(), diagnostic.as_ref())
}
