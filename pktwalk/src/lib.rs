//! **pktwalk** is a declarative packet field walker. Protocol layouts are described once, as
//! immutable catalogs of fields, and a single bounds-checked engine walks them over packet bytes
//! to produce a tree of decoded fields.
//!
//! * [Getting started](#getting-started)
//! * [Types](#types)
//! * [Lists, switches and TLVs](#lists-switches-and-tlvs)
//! * [Dispatching payloads](#dispatching-payloads)
//! * [Errors](#errors)
//!
//! # Getting started
//!
//! A layout is usually written as a Rust type deriving [`Catalog`](macro@Catalog).
//!
//! ```rust
//! use pktwalk::{decode, ByteView, Catalog};
//!
//! #[derive(Catalog)]
//! #[pktwalk(name = "Baby UDP", abbrev = "baby_udp")]
//! struct BabyUdp {
//!     src_port: u16,
//!     dst_port: u16,
//!     length: u16,
//!     checksum: u16,
//!     #[pktwalk(rest)]
//!     payload: Vec<u8>,
//! }
//!
//! let packet = [0x1f, 0x90, 0x00, 0x35, 0x00, 0x0a, 0x00, 0x00, 0xca, 0xfe];
//! let walk = decode(BabyUdp::catalog(), &ByteView::new(&packet), 0).unwrap();
//! assert!(walk.is_complete());
//! assert_eq!(walk.find("baby_udp.dst_port").and_then(|f| f.value.as_u64()), Some(53));
//! ```
//!
//! The struct itself is never constructed. It only exists to describe the layout, which is built
//! into a static [`FieldCatalog`] the first time [`Catalog::catalog`] is called. Catalogs can
//! also be put together by hand with [`FieldCatalog::builder`].
//!
//! # Types
//!
//! | Rust type | Field type |
//! |---|---|
//! | `u8`, `u16`, `u32`, `u64` | [`FieldType::U8`] .. [`FieldType::U64`], or `U24` with `typ = "u24"` |
//! | `bool` | [`FieldType::Boolean`] |
//! | `Ipv4Addr`, `Ipv6Addr` | [`FieldType::Ipv4`], [`FieldType::Ipv6`] |
//! | `[u8; N]` | N bytes, or a MAC address with `typ = "ether"` |
//! | `Vec<u8>`, `String` | bytes or text, sized by `len_field`, `prefix`, `delimiter`, `line` or `rest` |
//!
//! Integers are big-endian unless `enc = "le"` says otherwise. A `mask` narrows an integer to
//! some of its bits, and `bits = "Type"` shows the masked fields of another catalog under it.
//! `lookup = "TABLE"` labels values through a [`ValueTable`].
//!
//! # Lists, switches and TLVs
//!
//! * `Vec<T>` with `len_field` repeats `T` as many times as an earlier field says, and with
//!   `rest` until the data runs out.
//! * An enum deriving [`Variants`](macro@Variants) together with `dispatch_field` picks a layout
//!   by the value of an earlier field.
//! * `Vec<T>` of such an enum with `tlv = "LAYOUT"` walks a type-length-value sequence framed by
//!   a [`TlvLayout`].
//!
//! # Dispatching payloads
//!
//! [`Dissector`]s are registered by `(transport kind, key)` in a [`RegistryBuilder`], which
//! builds an immutable [`DissectorTable`]. The live [`DissectorRegistry`] swaps tables
//! atomically, so a dissection in flight always sees one consistent set of registrations.
//!
//! ```rust
//! use pktwalk::{ByteView, DissectorRegistry, PacketInfo, TransportKind};
//!
//! let registry = DissectorRegistry::with_defaults();
//! let frame = [0x00, 0x46, 0xc7, 0x38, 0x00, 0x0b, 0x00, 0x00, b'/', b'\r', b'\n'];
//! let dissection = registry.dissect(
//!     TransportKind::IpProtocol,
//!     17,
//!     ByteView::new(&frame),
//!     PacketInfo::default(),
//! );
//! assert_eq!(dissection.columns.protocol, "UDP");
//! assert!(dissection.find("udp.srcport").is_some());
//! ```
//!
//! # Errors
//!
//! Packet data never causes a panic. A walk that cannot go on stops with a [`Diagnostic`]
//! attached to the innermost node, and everything decoded up to that point is kept. Reads
//! between the captured and the reported length of a packet are told apart from reads past the
//! end of it, so a short capture is not mistaken for a malformed packet.

#![forbid(unsafe_code)]

// Lets the derive macros refer to this crate as `pktwalk` from inside it too.
extern crate self as pktwalk;

pub mod catalog;
pub mod cursor;
pub mod decoded;
pub mod dissectors;
pub mod error;
pub mod field;
pub mod prefs;
pub mod registry;
pub mod view;

pub use catalog::{
    Catalog, CatalogBuilder, CountRule, FieldCatalog, GroupSpec, Item, Repeat, SwitchSpec,
    TlvLayout, TlvSpec, Variant, VariantCatalog, VariantCatalogBuilder, Variants,
};
pub use cursor::{decode, CursorDissector, Walk};
pub use decoded::{DecodedField, Diagnostic, DiagnosticKind, Severity, Value};
pub use error::{ReadError, SpecError};
pub use field::{FieldSpec, FieldType, LengthRule, ValueTable};
pub use prefs::{PortRange, Preferences, PrefsError, ProtocolPrefs};
pub use registry::{
    Columns, DissectContext, DissectEntryResult, Dissection, Dissector, DissectorRegistry,
    DissectorTable, PacketInfo, RegistryBuilder, TransportKind, MAX_DISPATCH_DEPTH,
};
pub use view::{ByteOrder, ByteView};

pub use pktwalk_derive::{Catalog, Variants};

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}
