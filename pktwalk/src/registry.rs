//! Demultiplexing of payloads to dissectors.
//!
//! A [`RegistryBuilder`] collects registrations and produces an immutable [`DissectorTable`].
//! The process-wide [`DissectorRegistry`] holds the current table behind an `Arc`, and swaps in a
//! new one whenever registrations change. A dissection takes a snapshot up front, so it never
//! observes a half-applied update.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::instrument;

use crate::decoded::{DecodedField, Diagnostic};
use crate::dissectors;
use crate::prefs::{PortRange, Preferences};
use crate::view::ByteView;

/// How deeply dissectors may hand payloads to one another.
pub const MAX_DISPATCH_DEPTH: usize = 32;

/// The namespace of a dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportKind {
    Ethertype,
    IpProtocol,
    UdpPort,
    TcpPort,
    RtpPayloadType,
    /// A table owned by some protocol, e.g. `llc.cisco_pid`.
    Table(&'static str),
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Ethertype => f.write_str("ethertype"),
            TransportKind::IpProtocol => f.write_str("ip.proto"),
            TransportKind::UdpPort => f.write_str("udp.port"),
            TransportKind::TcpPort => f.write_str("tcp.port"),
            TransportKind::RtpPayloadType => f.write_str("rtp.pt"),
            TransportKind::Table(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DissectEntryResult {
    /// The dissector claimed the payload and used this many bytes of it.
    Consumed(usize),
    /// The payload does not belong to the dissector. Not an error.
    NotThisProtocol,
    /// The dissector claimed the payload but had to stop early. Whatever it decoded is kept.
    Error(Diagnostic),
}

/// A protocol decoder which can be registered in a [`DissectorTable`].
pub trait Dissector: Send + Sync {
    /// Short protocol name, e.g. `udp`. Heuristic registrations are unique by this name.
    fn name(&self) -> &'static str;

    /// Cheap check on whether `view` may hold this protocol. Consulted only for heuristic
    /// dispatch. Must not look further than a few bytes in.
    fn probe(&self, _view: &ByteView<'_>) -> bool {
        true
    }

    /// Decodes `view`, adding nodes to `cx`.
    fn dissect<'a>(&self, cx: &mut DissectContext<'_, 'a>, view: ByteView<'a>)
        -> DissectEntryResult;
}

/// Information about the packet gathered by the layers below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketInfo {
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    /// The key the running dissector was dispatched on. `None` for heuristic dispatch.
    pub match_key: Option<u32>,
}

impl PacketInfo {
    pub fn with_ports(src_port: u16, dst_port: u16) -> Self {
        Self {
            src_port: Some(src_port),
            dst_port: Some(dst_port),
            match_key: None,
        }
    }
}

/// Summary line of a packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Columns {
    pub protocol: String,
    pub info: String,
}

impl Columns {
    pub fn set_protocol(&mut self, protocol: &str) {
        self.protocol.clear();
        self.protocol.push_str(protocol);
    }

    pub fn set_info(&mut self, info: impl Into<String>) {
        self.info = info.into();
    }

    pub fn append_info(&mut self, info: &str) {
        if !self.info.is_empty() {
            self.info.push_str(", ");
        }
        self.info.push_str(info);
    }
}

/// State threaded through the dissectors of one packet.
pub struct DissectContext<'t, 'a> {
    table: &'t DissectorTable,
    tree: Vec<DecodedField<'a>>,
    pub columns: Columns,
    pub pinfo: PacketInfo,
    depth: usize,
}

impl<'t, 'a> DissectContext<'t, 'a> {
    pub fn new(table: &'t DissectorTable, pinfo: PacketInfo) -> Self {
        Self {
            table,
            tree: Vec::new(),
            columns: Columns::default(),
            pinfo,
            depth: 0,
        }
    }

    pub fn table(&self) -> &'t DissectorTable {
        self.table
    }

    pub fn tree(&self) -> &[DecodedField<'a>] {
        &self.tree
    }

    pub fn push(&mut self, field: DecodedField<'a>) {
        self.tree.push(field);
    }

    /// Adds `view` as undissected data.
    pub fn push_data(&mut self, view: &ByteView<'a>) {
        self.tree.push(DecodedField::data(view));
    }

    /// Tries the dissector registered for `key`, then the heuristics registered for `kind`.
    pub fn dispatch(
        &mut self,
        kind: TransportKind,
        key: u32,
        view: ByteView<'a>,
    ) -> DissectEntryResult {
        match self.dispatch_exact(kind, key, view) {
            DissectEntryResult::NotThisProtocol => self.dispatch_heuristics(kind, view),
            res => res,
        }
    }

    pub fn dispatch_exact(
        &mut self,
        kind: TransportKind,
        key: u32,
        view: ByteView<'a>,
    ) -> DissectEntryResult {
        let table = self.table;
        match table.get(kind, key) {
            Some(handle) => self.call(handle.as_ref(), view, Some(key)),
            None => DissectEntryResult::NotThisProtocol,
        }
    }

    /// Probes the heuristics for `kind` in registration order, until one claims `view`.
    pub fn dispatch_heuristics(
        &mut self,
        kind: TransportKind,
        view: ByteView<'a>,
    ) -> DissectEntryResult {
        let table = self.table;
        for handle in table.heuristics(kind) {
            if !handle.probe(&view) {
                continue;
            }
            match self.call(handle.as_ref(), view, None) {
                DissectEntryResult::NotThisProtocol => continue,
                res => {
                    tracing::debug!(dissector = handle.name(), %kind, "heuristic claimed payload");
                    return res;
                }
            }
        }
        DissectEntryResult::NotThisProtocol
    }

    /// Like [`DissectContext::dispatch`], with whatever gets decoded placed under `parent`.
    pub fn dispatch_under(
        &mut self,
        parent: &mut DecodedField<'a>,
        kind: TransportKind,
        key: u32,
        view: ByteView<'a>,
    ) -> DissectEntryResult {
        let outer = std::mem::take(&mut self.tree);
        let res = self.dispatch(kind, key, view);
        let inner = std::mem::replace(&mut self.tree, outer);
        parent.children.extend(inner);
        res
    }

    fn call(
        &mut self,
        handle: &dyn Dissector,
        view: ByteView<'a>,
        key: Option<u32>,
    ) -> DissectEntryResult {
        if self.depth >= MAX_DISPATCH_DEPTH {
            return DissectEntryResult::Error(Diagnostic::malformed(
                view.base(),
                "dissector recursion limit reached",
            ));
        }
        self.depth += 1;
        let saved = std::mem::replace(&mut self.pinfo.match_key, key);
        let mark = self.tree.len();
        let columns = self.columns.clone();

        let res = handle.dissect(self, view);
        if res == DissectEntryResult::NotThisProtocol {
            self.tree.truncate(mark);
            self.columns = columns;
        }

        self.pinfo.match_key = saved;
        self.depth -= 1;
        res
    }
}

/// The result of dissecting one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dissection<'a> {
    pub outcome: DissectEntryResult,
    pub tree: Vec<DecodedField<'a>>,
    pub columns: Columns,
}

impl<'a> Dissection<'a> {
    pub fn find(&self, abbrev: &str) -> Option<&DecodedField<'a>> {
        self.tree.iter().find_map(|f| f.find(abbrev))
    }

    pub fn diagnostics(&self) -> Vec<&Diagnostic> {
        self.tree.iter().flat_map(|f| f.diagnostics()).collect()
    }
}

impl fmt::Display for Dissection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in &self.tree {
            write!(f, "{field}")?;
        }
        Ok(())
    }
}

type Handle = Arc<dyn Dissector>;

/// Collects registrations for a [`DissectorTable`].
#[derive(Clone, Default)]
pub struct RegistryBuilder {
    exact: HashMap<(TransportKind, u32), Handle>,
    heuristics: HashMap<TransportKind, Vec<Handle>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the dissector previously registered for the key, which this one replaces.
    pub fn register(&mut self, kind: TransportKind, key: u32, handle: Handle) -> Option<Handle> {
        self.exact.insert((kind, key), handle)
    }

    pub fn register_ports(&mut self, kind: TransportKind, ports: &PortRange, handle: Handle) {
        for port in ports.iter() {
            self.register(kind, u32::from(port), handle.clone());
        }
    }

    /// Adds a heuristic for `kind`. A heuristic of the same name is replaced in place.
    pub fn register_heuristic(&mut self, kind: TransportKind, handle: Handle) {
        let list = self.heuristics.entry(kind).or_default();
        match list.iter_mut().find(|h| h.name() == handle.name()) {
            Some(existing) => *existing = handle,
            None => list.push(handle),
        }
    }

    pub fn deregister(&mut self, kind: TransportKind, key: u32) -> Option<Handle> {
        self.exact.remove(&(kind, key))
    }

    /// Removes every exact registration of the named dissector under `kind`.
    pub fn deregister_all(&mut self, kind: TransportKind, name: &str) {
        self.exact.retain(|(k, _), h| *k != kind || h.name() != name);
    }

    pub fn deregister_heuristic(&mut self, kind: TransportKind, name: &str) -> bool {
        let Some(list) = self.heuristics.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| h.name() != name);
        before != list.len()
    }

    pub fn build(self) -> DissectorTable {
        DissectorTable {
            exact: self.exact,
            heuristics: self.heuristics,
        }
    }
}

/// An immutable set of registrations.
#[derive(Clone, Default)]
pub struct DissectorTable {
    exact: HashMap<(TransportKind, u32), Handle>,
    heuristics: HashMap<TransportKind, Vec<Handle>>,
}

impl DissectorTable {
    pub fn get(&self, kind: TransportKind, key: u32) -> Option<&Handle> {
        self.exact.get(&(kind, key))
    }

    pub fn heuristics(&self, kind: TransportKind) -> &[Handle] {
        self.heuristics.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of exact registrations.
    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.heuristics.values().all(Vec::is_empty)
    }

    /// A builder holding the same registrations, for deriving a modified table.
    pub fn to_builder(&self) -> RegistryBuilder {
        RegistryBuilder {
            exact: self.exact.clone(),
            heuristics: self.heuristics.clone(),
        }
    }

    /// Dispatches the payload at `offset` in `view`, discarding the decoded tree.
    pub fn dispatch(
        &self,
        kind: TransportKind,
        key: u32,
        view: ByteView<'_>,
        offset: usize,
    ) -> DissectEntryResult {
        let view = match view.tail(offset) {
            Ok(view) => view,
            Err(e) => {
                return DissectEntryResult::Error(Diagnostic::from_read(&e, view.base()));
            }
        };
        let mut cx = DissectContext::new(self, PacketInfo::default());
        cx.dispatch(kind, key, view)
    }

    /// Dissects a packet handed over by the capture layer. A payload no dissector claims is kept
    /// as a data node.
    #[instrument(skip(self, view, pinfo), level = "trace")]
    pub fn dissect<'a>(
        &self,
        kind: TransportKind,
        key: u32,
        view: ByteView<'a>,
        pinfo: PacketInfo,
    ) -> Dissection<'a> {
        let mut cx = DissectContext::new(self, pinfo);
        let outcome = cx.dispatch(kind, key, view);
        if outcome == DissectEntryResult::NotThisProtocol {
            cx.push_data(&view);
        }
        Dissection {
            outcome,
            tree: cx.tree,
            columns: cx.columns,
        }
    }
}

impl fmt::Debug for DissectorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut exact: Vec<_> = self
            .exact
            .iter()
            .map(|((kind, key), h)| (*kind, *key, h.name()))
            .collect();
        exact.sort_unstable();
        let mut heuristics: Vec<_> = self
            .heuristics
            .iter()
            .map(|(kind, list)| (*kind, list.iter().map(|h| h.name()).collect::<Vec<_>>()))
            .collect();
        heuristics.sort_unstable();
        f.debug_struct("DissectorTable")
            .field("exact", &exact)
            .field("heuristics", &heuristics)
            .finish()
    }
}

/// The live, process-wide registry.
#[derive(Debug, Default)]
pub struct DissectorRegistry {
    table: RwLock<Arc<DissectorTable>>,
}

impl DissectorRegistry {
    pub fn new(table: DissectorTable) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
        }
    }

    /// A registry holding every built-in protocol with default preferences.
    pub fn with_defaults() -> Self {
        Self::configured(&Preferences::default())
    }

    pub fn configured(prefs: &Preferences) -> Self {
        let mut builder = RegistryBuilder::new();
        dissectors::register_all(&mut builder, prefs);
        Self::new(builder.build())
    }

    /// The current table. Later changes to the registry do not affect it.
    pub fn snapshot(&self) -> Arc<DissectorTable> {
        self.table.read().clone()
    }

    pub fn register(&self, kind: TransportKind, key: u32, handle: Handle) -> Option<Handle> {
        self.update(|builder| builder.register(kind, key, handle))
    }

    /// Applies a batch of changes to a copy of the current table, then swaps the copy in.
    pub fn update<R>(&self, f: impl FnOnce(&mut RegistryBuilder) -> R) -> R {
        let mut table = self.table.write();
        let mut builder = table.to_builder();
        let ret = f(&mut builder);
        *table = Arc::new(builder.build());
        ret
    }

    /// Rebuilds the built-in protocol registrations from `prefs`. Registrations made through
    /// [`DissectorRegistry::register`] are dropped.
    pub fn reconfigure(&self, prefs: &Preferences) {
        let mut builder = RegistryBuilder::new();
        dissectors::register_all(&mut builder, prefs);
        let table = builder.build();
        let entries = table.len();
        *self.table.write() = Arc::new(table);
        tracing::info!(entries, "dissector registry reconfigured");
    }

    pub fn dissect<'a>(
        &self,
        kind: TransportKind,
        key: u32,
        view: ByteView<'a>,
        pinfo: PacketInfo,
    ) -> Dissection<'a> {
        self.snapshot().dissect(kind, key, view, pinfo)
    }
}
