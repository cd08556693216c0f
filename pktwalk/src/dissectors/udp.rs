//! User Datagram Protocol.

use std::sync::Arc;

use crate::decoded::Diagnostic;
use crate::error::ReadError;
use crate::prefs::ProtocolPrefs;
use crate::registry::{
    DissectContext, DissectEntryResult, Dissector, RegistryBuilder, TransportKind,
};
use crate::view::{ByteOrder, ByteView};
use crate::Catalog;

use super::walk_protocol;

const HEADER_LEN: usize = 8;

/// IANA protocol number.
const IP_PROTO_UDP: u32 = 17;

#[derive(Catalog)]
#[pktwalk(name = "User Datagram Protocol", abbrev = "udp")]
#[allow(dead_code)]
struct Header {
    #[pktwalk(rename = "Source Port", abbrev = "srcport")]
    src_port: u16,
    #[pktwalk(rename = "Destination Port", abbrev = "dstport")]
    dst_port: u16,
    length: u16,
    checksum: u16,
}

/// Hands its payload to whatever is registered for the destination port, then the source port,
/// then to the UDP heuristics.
pub struct Udp;

pub(super) fn register(builder: &mut RegistryBuilder, _prefs: &ProtocolPrefs) {
    builder.register(TransportKind::IpProtocol, IP_PROTO_UDP, Arc::new(Udp));
}

fn read_header(view: &ByteView<'_>) -> Result<(u16, u16, u16), ReadError> {
    Ok((
        view.get_u16(0, ByteOrder::Big)?,
        view.get_u16(2, ByteOrder::Big)?,
        view.get_u16(4, ByteOrder::Big)?,
    ))
}

impl Dissector for Udp {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn dissect<'a>(&self, cx: &mut DissectContext<'_, 'a>, view: ByteView<'a>) -> DissectEntryResult {
        let mut layer = walk_protocol(Header::catalog(), &view);
        cx.columns.set_protocol("UDP");

        let (src_port, dst_port, length) = match read_header(&view) {
            Ok(header) => header,
            Err(_) => {
                let res = layer.outcome();
                cx.push(layer.node);
                return res;
            }
        };
        cx.pinfo.src_port = Some(src_port);
        cx.pinfo.dst_port = Some(dst_port);

        let length = usize::from(length);
        if length < HEADER_LEN || length > view.reported_len() {
            let diag = Diagnostic::malformed(
                view.base() + 4,
                format!(
                    "length {length} is outside {HEADER_LEN}..={}",
                    view.reported_len()
                ),
            );
            layer.node.diagnostic = Some(diag.clone());
            cx.columns
                .set_info(format!("{src_port} → {dst_port} [bad length {length}]"));
            cx.push(layer.node);
            return DissectEntryResult::Error(diag);
        }
        cx.columns.set_info(format!(
            "{src_port} → {dst_port} Len={}",
            length - HEADER_LEN
        ));
        cx.push(layer.node);

        let payload = match view.subset(HEADER_LEN, length - HEADER_LEN) {
            Ok(payload) => payload,
            Err(e) => return DissectEntryResult::Error(Diagnostic::from_read(&e, view.base())),
        };

        let mut res = cx.dispatch_exact(TransportKind::UdpPort, u32::from(dst_port), payload);
        if res == DissectEntryResult::NotThisProtocol && src_port != dst_port {
            res = cx.dispatch_exact(TransportKind::UdpPort, u32::from(src_port), payload);
        }
        if res == DissectEntryResult::NotThisProtocol {
            res = cx.dispatch_heuristics(TransportKind::UdpPort, payload);
        }

        match res {
            DissectEntryResult::Error(diag) => DissectEntryResult::Error(diag),
            DissectEntryResult::NotThisProtocol => {
                if payload.reported_len() > 0 {
                    cx.push_data(&payload);
                }
                DissectEntryResult::Consumed(length)
            }
            DissectEntryResult::Consumed(_) => DissectEntryResult::Consumed(length),
        }
    }
}
