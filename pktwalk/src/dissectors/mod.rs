//! Built-in protocol dissectors.
//!
//! Each module describes its wire format with catalogs and adds whatever control flow the
//! protocol needs on top: choosing between layouts, generated fields, and handing payloads on to
//! other dissectors.

use crate::catalog::FieldCatalog;
use crate::cursor::decode;
use crate::decoded::{DecodedField, Diagnostic, DiagnosticKind};
use crate::prefs::{Preferences, ProtocolPrefs};
use crate::registry::{DissectEntryResult, RegistryBuilder};
use crate::view::ByteView;

mod fefd;
mod gopher;
mod mndp;
mod moldudp64;
mod prp;
mod udp;

pub use fefd::Fefd;
pub use gopher::Gopher;
pub use mndp::Mndp;
pub use moldudp64::MoldUdp64;
pub use prp::Prp;
pub use udp::Udp;

type Register = fn(&mut RegistryBuilder, &ProtocolPrefs);

const BUILT_IN: [(&str, Register); 6] = [
    ("udp", udp::register),
    ("moldudp64", moldudp64::register),
    ("prp", prp::register),
    ("mndp", mndp::register),
    ("fefd", fefd::register),
    ("gopher", gopher::register),
];

/// Abbreviations of the built-in protocols, which are also their keys in [`Preferences`].
pub fn protocols() -> impl Iterator<Item = &'static str> {
    BUILT_IN.iter().map(|(name, _)| *name)
}

/// Registers every built-in protocol which `prefs` does not disable.
pub fn register_all(builder: &mut RegistryBuilder, prefs: &Preferences) {
    for name in prefs.protocols.keys() {
        if !protocols().any(|p| p == name.as_str()) {
            tracing::warn!(protocol = %name, "preferences name an unknown protocol");
        }
    }

    let defaults = ProtocolPrefs::default();
    for (name, register) in BUILT_IN {
        if !prefs.is_enabled(name) {
            tracing::debug!(protocol = name, "disabled by preferences");
            continue;
        }
        register(builder, prefs.protocol(name).unwrap_or(&defaults));
    }
}

/// One protocol's catalog, decoded under a node of its own.
pub(crate) struct Layer<'a> {
    pub(crate) node: DecodedField<'a>,
    /// Bytes consumed, relative to the view.
    pub(crate) end: usize,
    pub(crate) diagnostic: Option<Diagnostic>,
}

impl Layer<'_> {
    pub(crate) fn outcome(&self) -> DissectEntryResult {
        outcome(self.end, self.diagnostic.as_ref())
    }
}

pub(crate) fn walk_protocol<'a>(catalog: &FieldCatalog, view: &ByteView<'a>) -> Layer<'a> {
    let mut node = DecodedField::node(catalog.name(), catalog.abbrev(), view.base(), 0);
    let (end, diagnostic) = match decode(catalog, view, 0) {
        Ok(walk) => {
            node.children = walk.fields;
            (walk.offset, walk.diagnostic)
        }
        Err(e) => (0, Some(Diagnostic::from_read(&e, view.base()))),
    };
    node.len = end;
    if let Some(diag) = &diagnostic {
        if !node.walk().any(|f| f.diagnostic.as_ref() == Some(diag)) {
            node.diagnostic = Some(diag.clone());
        }
    }
    Layer {
        node,
        end,
        diagnostic,
    }
}

/// A truncated capture still counts as a successful dissection of what was there.
pub(crate) fn outcome(end: usize, diagnostic: Option<&Diagnostic>) -> DissectEntryResult {
    match diagnostic {
        Some(diag) if diag.kind != DiagnosticKind::Truncated => {
            DissectEntryResult::Error(diag.clone())
        }
        _ => DissectEntryResult::Consumed(end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::PortRange;
    use crate::registry::TransportKind;

    #[test]
    fn test_defaults_register_everything() {
        let mut builder = RegistryBuilder::new();
        register_all(&mut builder, &Preferences::default());
        let table = builder.build();

        let expected = [
            (TransportKind::IpProtocol, 17, "udp"),
            (TransportKind::UdpPort, 31001, "moldudp64"),
            (TransportKind::Ethertype, 0x88FB, "prp"),
            (TransportKind::UdpPort, 5678, "mndp"),
            (TransportKind::Table("llc.cisco_pid"), 0x0111, "fefd"),
            (TransportKind::TcpPort, 70, "gopher"),
        ];
        for (kind, key, name) in expected {
            assert_eq!(table.get(kind, key).map(|h| h.name()), Some(name), "{kind} {key}");
        }
        assert_eq!(table.len(), expected.len());
        assert!(table.heuristics(TransportKind::UdpPort).is_empty());
    }

    #[test]
    fn test_preferences_shape_registrations() {
        let prefs = Preferences::default()
            .with_protocol(
                "fefd",
                ProtocolPrefs {
                    enabled: false,
                    ..Default::default()
                },
            )
            .with_protocol(
                "gopher",
                ProtocolPrefs {
                    tcp_ports: Some("70,7070-7071".parse().unwrap()),
                    ..Default::default()
                },
            )
            .with_protocol(
                "mndp",
                ProtocolPrefs {
                    udp_ports: Some(PortRange::default()),
                    heuristic: Some(true),
                    ..Default::default()
                },
            )
            .with_protocol("not-a-protocol", ProtocolPrefs::default());

        let mut builder = RegistryBuilder::new();
        register_all(&mut builder, &prefs);
        let table = builder.build();

        assert!(table.get(TransportKind::Table("llc.cisco_pid"), 0x0111).is_none());
        for port in [70, 7070, 7071] {
            assert!(table.get(TransportKind::TcpPort, port).is_some());
        }
        assert!(table.get(TransportKind::UdpPort, 5678).is_none());
        let heuristics: Vec<_> = table
            .heuristics(TransportKind::UdpPort)
            .iter()
            .map(|h| h.name())
            .collect();
        assert_eq!(heuristics, ["mndp"]);
    }

    #[test]
    fn test_outcome_policy() {
        let truncated = Diagnostic::truncated(4, "cut short");
        let malformed = Diagnostic::malformed(4, "bad length");
        assert_eq!(outcome(8, None), DissectEntryResult::Consumed(8));
        assert_eq!(outcome(8, Some(&truncated)), DissectEntryResult::Consumed(8));
        assert_eq!(
            outcome(8, Some(&malformed)),
            DissectEntryResult::Error(malformed.clone())
        );
    }
}
