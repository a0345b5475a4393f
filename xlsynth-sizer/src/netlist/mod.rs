// SPDX-License-Identifier: Apache-2.0

//! Arena-backed gate-level netlist with journaled mutation.
//!
//! Instances, nets and pins live in `Vec<Option<_>>` arenas addressed by
//! stable index newtypes. Destroying an object leaves a `None` tombstone so
//! other ids stay valid; creating one always appends, which lets a rollback
//! undo creations by popping. Every primitive mutation records an inverse in
//! the journal while a transaction is open (see `journal`).

pub mod connectivity;
pub mod edits;
pub mod journal;

use crate::cache::Epoch;
use crate::liberty::{CellId, IndexedLibrary, PortDirection};
use journal::{Journal, JournalEntry, JournalError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use string_interner::symbol::SymbolU32;
use string_interner::{backend::StringBackend, StringInterner};

pub type Sym = SymbolU32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Point { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    R0,
    R90,
    R180,
    R270,
    MX,
    MY,
    MXR90,
    MYR90,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStatus {
    Unplaced,
    #[default]
    Placed,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    #[default]
    Signal,
    Power,
    Ground,
    Clock,
}

impl SignalType {
    pub fn is_supply(self) -> bool {
        matches!(self, SignalType::Power | SignalType::Ground)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOwner {
    /// Terminal `port` (index into the cell's port list) of an instance.
    Instance { inst: InstId, port: usize },
    /// Top-level port of the design.
    Port { name: Sym, location: Point },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub owner: PinOwner,
    /// For instance pins, the cell port's direction. For top-level ports, the
    /// direction as seen from outside the design.
    pub direction: PortDirection,
    pub net: Option<NetId>,
}

impl Pin {
    /// True if this pin drives its net: an instance output, or a top-level
    /// input port.
    pub fn is_driver(&self) -> bool {
        match self.owner {
            PinOwner::Instance { .. } => self.direction.is_output(),
            PinOwner::Port { .. } => self.direction.is_input(),
        }
    }

    pub fn is_load(&self) -> bool {
        match self.owner {
            PinOwner::Instance { .. } => self.direction.is_input(),
            PinOwner::Port { .. } => self.direction.is_output(),
        }
    }

    pub fn is_top_port(&self) -> bool {
        matches!(self.owner, PinOwner::Port { .. })
    }

    pub fn instance(&self) -> Option<InstId> {
        match self.owner {
            PinOwner::Instance { inst, .. } => Some(inst),
            PinOwner::Port { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub name: Sym,
    pub cell: CellId,
    pub location: Point,
    pub orientation: Orientation,
    pub placement: PlacementStatus,
    /// One pin per cell port, in the cell's port order.
    pub pins: Vec<PinId>,
    pub dont_touch: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    pub name: Sym,
    pub signal_type: SignalType,
    pub dont_touch: bool,
    pub pins: Vec<PinId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditError {
    DontTouchInstance(String),
    DontTouchNet(String),
    IncompatibleCell { inst: String, cell: String },
    PinAlreadyConnected(String),
    PinNotConnected(String),
    NetHasPins(String),
    DuplicateName(String),
    NotABuffer(String),
    BothNetsHavePorts(String),
    BufferDrivesOwnInput(String),
    PinNotOnNet { pin: String, net: String },
    PinsOnDifferentInstances,
    NotCommutative { inst: String, a: String, b: String },
    StaleId,
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditError::DontTouchInstance(n) => write!(f, "instance {} is dont_touch", n),
            EditError::DontTouchNet(n) => write!(f, "net {} is dont_touch", n),
            EditError::IncompatibleCell { inst, cell } => {
                write!(f, "cell {} is not pin compatible with instance {}", cell, inst)
            }
            EditError::PinAlreadyConnected(p) => write!(f, "pin {} is already connected", p),
            EditError::PinNotConnected(p) => write!(f, "pin {} is not connected", p),
            EditError::NetHasPins(n) => write!(f, "net {} still has pins", n),
            EditError::DuplicateName(n) => write!(f, "name {} is already in use", n),
            EditError::NotABuffer(n) => write!(f, "instance {} is not a buffer", n),
            EditError::BothNetsHavePorts(n) => {
                write!(f, "buffer {} connects two top-level ports", n)
            }
            EditError::BufferDrivesOwnInput(n) => {
                write!(f, "buffer {} drives its own input net", n)
            }
            EditError::PinNotOnNet { pin, net } => write!(f, "pin {} is not on net {}", pin, net),
            EditError::PinsOnDifferentInstances => {
                f.write_str("pins belong to different instances")
            }
            EditError::NotCommutative { inst, a, b } => {
                write!(f, "inputs {} and {} of {} are not commutative", a, b, inst)
            }
            EditError::StaleId => f.write_str("id refers to a destroyed object"),
        }
    }
}

impl std::error::Error for EditError {}

pub struct Netlist {
    names: StringInterner<StringBackend<Sym>>,
    instances: Vec<Option<Instance>>,
    nets: Vec<Option<Net>>,
    pins: Vec<Option<Pin>>,
    /// Top-level port pins in declaration order.
    ports: Vec<PinId>,
    inst_by_name: HashMap<Sym, InstId>,
    net_by_name: HashMap<Sym, NetId>,
    journal: Journal,
    epoch: Epoch,
}

impl Default for Netlist {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural equality: same objects, cells, connectivity and names. The
/// interner and journal are not compared.
impl PartialEq for Netlist {
    fn eq(&self, other: &Self) -> bool {
        self.instances == other.instances
            && self.nets == other.nets
            && self.pins == other.pins
            && self.ports == other.ports
            && self.inst_by_name == other.inst_by_name
            && self.net_by_name == other.net_by_name
    }
}

impl fmt::Debug for Netlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Netlist")
            .field("instances", &self.instances)
            .field("nets", &self.nets)
            .field("pins", &self.pins)
            .field("ports", &self.ports)
            .finish()
    }
}

impl Netlist {
    pub fn new() -> Self {
        Netlist {
            names: StringInterner::new(),
            instances: Vec::new(),
            nets: Vec::new(),
            pins: Vec::new(),
            ports: Vec::new(),
            inst_by_name: HashMap::new(),
            net_by_name: HashMap::new(),
            journal: Journal::default(),
            epoch: Epoch::default(),
        }
    }

    /// Bumped by every structural mutation and every undo.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn resolve(&self, sym: Sym) -> &str {
        self.names
            .resolve(sym)
            .expect("symbol should always resolve in interner")
    }

    pub fn instance(&self, inst: InstId) -> &Instance {
        self.try_instance(inst)
            .unwrap_or_else(|| panic!("stale instance id {:?}", inst))
    }

    pub fn try_instance(&self, inst: InstId) -> Option<&Instance> {
        self.instances.get(inst.0).and_then(|i| i.as_ref())
    }

    pub fn net(&self, net: NetId) -> &Net {
        self.try_net(net)
            .unwrap_or_else(|| panic!("stale net id {:?}", net))
    }

    pub fn try_net(&self, net: NetId) -> Option<&Net> {
        self.nets.get(net.0).and_then(|n| n.as_ref())
    }

    pub fn pin(&self, pin: PinId) -> &Pin {
        self.pins
            .get(pin.0)
            .and_then(|p| p.as_ref())
            .unwrap_or_else(|| panic!("stale pin id {:?}", pin))
    }

    pub fn instance_ids(&self) -> impl Iterator<Item = InstId> + '_ {
        self.instances
            .iter()
            .enumerate()
            .filter(|(_, i)| i.is_some())
            .map(|(i, _)| InstId(i))
    }

    pub fn net_ids(&self) -> impl Iterator<Item = NetId> + '_ {
        self.nets
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| NetId(i))
    }

    pub fn pin_ids(&self) -> impl Iterator<Item = PinId> + '_ {
        self.pins
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_some())
            .map(|(i, _)| PinId(i))
    }

    /// Upper bound on pin ids, for sizing per-pin side tables.
    pub fn pin_capacity(&self) -> usize {
        self.pins.len()
    }

    pub fn net_capacity(&self) -> usize {
        self.nets.len()
    }

    pub fn instance_capacity(&self) -> usize {
        self.instances.len()
    }

    pub fn num_instances(&self) -> usize {
        self.instances.iter().filter(|i| i.is_some()).count()
    }

    pub fn ports(&self) -> &[PinId] {
        &self.ports
    }

    pub fn instance_name(&self, inst: InstId) -> &str {
        self.resolve(self.instance(inst).name)
    }

    pub fn net_name(&self, net: NetId) -> &str {
        self.resolve(self.net(net).name)
    }

    /// `inst/port` for instance pins, the port name for top-level ports.
    pub fn pin_name(&self, pin: PinId, lib: &IndexedLibrary) -> String {
        match self.pin(pin).owner {
            PinOwner::Instance { inst, port } => {
                let i = self.instance(inst);
                format!(
                    "{}/{}",
                    self.resolve(i.name),
                    lib.cell(i.cell).ports[port].name
                )
            }
            PinOwner::Port { name, .. } => self.resolve(name).to_string(),
        }
    }

    pub fn find_instance(&self, name: &str) -> Option<InstId> {
        let sym = self.names.get(name)?;
        self.inst_by_name.get(&sym).copied()
    }

    pub fn find_net(&self, name: &str) -> Option<NetId> {
        let sym = self.names.get(name)?;
        self.net_by_name.get(&sym).copied()
    }

    pub fn find_port(&self, name: &str) -> Option<PinId> {
        let sym = self.names.get(name)?;
        self.ports
            .iter()
            .copied()
            .find(|p| matches!(self.pin(*p).owner, PinOwner::Port { name: n, .. } if n == sym))
    }

    /// Pin of `inst` for the cell port called `port`.
    pub fn inst_pin(&self, inst: InstId, port: &str, lib: &IndexedLibrary) -> Option<PinId> {
        let i = self.instance(inst);
        lib.cell(i.cell).port_index(port).map(|idx| i.pins[idx])
    }

    pub fn pin_net(&self, pin: PinId) -> Option<NetId> {
        self.pin(pin).net
    }

    pub fn net_pins(&self, net: NetId) -> &[PinId] {
        &self.net(net).pins
    }

    pub fn location(&self, inst: InstId) -> Point {
        self.instance(inst).location
    }

    /// Location of any pin: its instance's origin or the port location.
    pub fn pin_location(&self, pin: PinId) -> Point {
        match self.pin(pin).owner {
            PinOwner::Instance { inst, .. } => self.location(inst),
            PinOwner::Port { location, .. } => location,
        }
    }

    pub fn dont_touch_instance(&self, inst: InstId) -> bool {
        self.instance(inst).dont_touch
    }

    pub fn dont_touch_net(&self, net: NetId) -> bool {
        self.net(net).dont_touch
    }

    pub fn net_has_port(&self, net: NetId) -> bool {
        self.net(net)
            .pins
            .iter()
            .any(|p| self.pin(*p).is_top_port())
    }

    fn intern(&mut self, name: &str) -> Sym {
        self.names.get_or_intern(name)
    }

    fn check_net_touchable(&self, net: NetId) -> Result<(), EditError> {
        match self.try_net(net) {
            None => Err(EditError::StaleId),
            Some(n) if n.dont_touch => Err(EditError::DontTouchNet(self.resolve(n.name).to_string())),
            Some(_) => Ok(()),
        }
    }

    fn check_instance_touchable(&self, inst: InstId) -> Result<(), EditError> {
        match self.try_instance(inst) {
            None => Err(EditError::StaleId),
            Some(i) if i.dont_touch => {
                Err(EditError::DontTouchInstance(self.resolve(i.name).to_string()))
            }
            Some(_) => Ok(()),
        }
    }

    fn pin_label(&self, pin: PinId) -> String {
        match self.pin(pin).owner {
            PinOwner::Instance { inst, port } => format!("{}/#{}", self.instance_name(inst), port),
            PinOwner::Port { name, .. } => self.resolve(name).to_string(),
        }
    }

    fn record(&mut self, entry: JournalEntry) {
        self.journal.record(entry);
        self.epoch.bump();
    }

    // -- Primitive mutations -------------------------------------------------

    /// Adds a top-level port pin. Journaled like the other mutations, so a
    /// rollback removes it again.
    pub fn add_port(
        &mut self,
        name: &str,
        direction: PortDirection,
        location: Point,
    ) -> Result<PinId, EditError> {
        if self.find_port(name).is_some() {
            return Err(EditError::DuplicateName(name.to_string()));
        }
        let name = self.intern(name);
        let pin = PinId(self.pins.len());
        self.pins.push(Some(Pin {
            owner: PinOwner::Port { name, location },
            direction,
            net: None,
        }));
        self.ports.push(pin);
        self.record(JournalEntry::CreatePort { pin });
        Ok(pin)
    }

    pub fn create_net(&mut self, name: &str, signal_type: SignalType) -> Result<NetId, EditError> {
        if self.find_net(name).is_some() {
            return Err(EditError::DuplicateName(name.to_string()));
        }
        let name = self.intern(name);
        let net = NetId(self.nets.len());
        self.nets.push(Some(Net {
            name,
            signal_type,
            dont_touch: false,
            pins: Vec::new(),
        }));
        self.net_by_name.insert(name, net);
        self.record(JournalEntry::CreateNet { net });
        Ok(net)
    }

    /// Destroys an empty net.
    pub fn destroy_net(&mut self, net: NetId) -> Result<(), EditError> {
        self.check_net_touchable(net)?;
        if !self.net(net).pins.is_empty() {
            return Err(EditError::NetHasPins(self.net_name(net).to_string()));
        }
        let saved = self.nets[net.0].take().ok_or(EditError::StaleId)?;
        self.net_by_name.remove(&saved.name);
        self.record(JournalEntry::DestroyNet { net, saved });
        Ok(())
    }

    /// Creates an instance of `cell` with one unconnected pin per cell port.
    pub fn create_instance(
        &mut self,
        name: &str,
        cell: CellId,
        lib: &IndexedLibrary,
        location: Point,
    ) -> Result<InstId, EditError> {
        if self.find_instance(name).is_some() {
            return Err(EditError::DuplicateName(name.to_string()));
        }
        let name = self.intern(name);
        let inst = InstId(self.instances.len());
        let mut pins = Vec::new();
        for (port, cell_port) in lib.cell(cell).ports.iter().enumerate() {
            let pin = PinId(self.pins.len());
            self.pins.push(Some(Pin {
                owner: PinOwner::Instance { inst, port },
                direction: cell_port.direction,
                net: None,
            }));
            pins.push(pin);
        }
        self.instances.push(Some(Instance {
            name,
            cell,
            location,
            orientation: Orientation::R0,
            placement: PlacementStatus::Placed,
            pins: pins.clone(),
            dont_touch: false,
        }));
        self.inst_by_name.insert(name, inst);
        self.record(JournalEntry::CreateInstance { inst, pins });
        Ok(inst)
    }

    /// Disconnects every pin of `inst` and destroys it.
    pub fn destroy_instance(&mut self, inst: InstId) -> Result<(), EditError> {
        self.check_instance_touchable(inst)?;
        let pins = self.instance(inst).pins.clone();
        for pin in &pins {
            if let Some(net) = self.pin(*pin).net {
                self.check_net_touchable(net)?;
            }
        }
        for pin in &pins {
            if self.pin(*pin).net.is_some() {
                self.disconnect(*pin)?;
            }
        }
        let saved = self.instances[inst.0].take().ok_or(EditError::StaleId)?;
        self.inst_by_name.remove(&saved.name);
        let mut saved_pins = Vec::with_capacity(pins.len());
        for pin in &pins {
            if let Some(p) = self.pins[pin.0].take() {
                saved_pins.push((*pin, p));
            }
        }
        self.record(JournalEntry::DestroyInstance {
            inst,
            saved,
            saved_pins,
        });
        Ok(())
    }

    pub fn connect(&mut self, pin: PinId, net: NetId) -> Result<(), EditError> {
        self.check_net_touchable(net)?;
        if self.pin(pin).net.is_some() {
            return Err(EditError::PinAlreadyConnected(self.pin_label(pin)));
        }
        if let Some(inst) = self.pin(pin).instance() {
            self.check_instance_touchable(inst)?;
        }
        self.nets[net.0]
            .as_mut()
            .ok_or(EditError::StaleId)?
            .pins
            .push(pin);
        self.pin_mut(pin).net = Some(net);
        self.record(JournalEntry::Connect { pin, net });
        Ok(())
    }

    pub fn disconnect(&mut self, pin: PinId) -> Result<(), EditError> {
        let Some(net) = self.pin(pin).net else {
            return Err(EditError::PinNotConnected(self.pin_label(pin)));
        };
        self.check_net_touchable(net)?;
        if let Some(inst) = self.pin(pin).instance() {
            self.check_instance_touchable(inst)?;
        }
        let n = self.nets[net.0].as_mut().ok_or(EditError::StaleId)?;
        let position = n
            .pins
            .iter()
            .position(|p| *p == pin)
            .ok_or(EditError::StaleId)?;
        n.pins.remove(position);
        self.pin_mut(pin).net = None;
        self.record(JournalEntry::Disconnect { pin, net, position });
        Ok(())
    }

    /// Swaps the cell of `inst` for a pin-compatible `cell` (same port names
    /// and directions, in any order).
    pub fn replace_cell(
        &mut self,
        inst: InstId,
        cell: CellId,
        lib: &IndexedLibrary,
    ) -> Result<(), EditError> {
        self.check_instance_touchable(inst)?;
        let (prev_cell, prev_pins) = {
            let i = self.instance(inst);
            (i.cell, i.pins.clone())
        };
        if prev_cell == cell {
            return Ok(());
        }
        let incompatible = || EditError::IncompatibleCell {
            inst: self.instance_name(inst).to_string(),
            cell: lib.cell(cell).name.clone(),
        };
        let old_cell = lib.cell(prev_cell);
        let new_cell = lib.cell(cell);
        if old_cell.ports.len() != new_cell.ports.len() {
            return Err(incompatible());
        }
        let mut new_pins = Vec::with_capacity(new_cell.ports.len());
        for port in &new_cell.ports {
            let Some(old_idx) = old_cell.port_index(&port.name) else {
                return Err(incompatible());
            };
            if old_cell.ports[old_idx].direction != port.direction {
                return Err(incompatible());
            }
            new_pins.push(prev_pins[old_idx]);
        }
        self.assign_cell(inst, cell, new_pins);
        self.record(JournalEntry::SwapCell {
            inst,
            prev_cell,
            prev_pins,
        });
        Ok(())
    }

    pub fn set_location(&mut self, inst: InstId, location: Point) -> Result<(), EditError> {
        self.check_instance_touchable(inst)?;
        let i = self.instance_mut(inst);
        let prev = i.location;
        i.location = location;
        self.record(JournalEntry::Move { inst, prev });
        Ok(())
    }

    pub fn set_orientation(
        &mut self,
        inst: InstId,
        orientation: Orientation,
    ) -> Result<(), EditError> {
        self.check_instance_touchable(inst)?;
        let i = self.instance_mut(inst);
        let prev = i.orientation;
        i.orientation = orientation;
        self.record(JournalEntry::Orient { inst, prev });
        Ok(())
    }

    pub fn set_dont_touch_instance(&mut self, inst: InstId, dont_touch: bool) {
        let i = self.instance_mut(inst);
        let prev = i.dont_touch;
        i.dont_touch = dont_touch;
        self.record(JournalEntry::InstanceDontTouch { inst, prev });
    }

    pub fn set_dont_touch_net(&mut self, net: NetId, dont_touch: bool) {
        let n = self.net_mut(net);
        let prev = n.dont_touch;
        n.dont_touch = dont_touch;
        self.record(JournalEntry::NetDontTouch { net, prev });
    }

    pub fn set_signal_type(&mut self, net: NetId, signal_type: SignalType) {
        let n = self.net_mut(net);
        let prev = n.signal_type;
        n.signal_type = signal_type;
        self.record(JournalEntry::NetSignalType { net, prev });
    }

    fn instance_mut(&mut self, inst: InstId) -> &mut Instance {
        self.instances[inst.0]
            .as_mut()
            .unwrap_or_else(|| panic!("stale instance id {:?}", inst))
    }

    fn net_mut(&mut self, net: NetId) -> &mut Net {
        self.nets[net.0]
            .as_mut()
            .unwrap_or_else(|| panic!("stale net id {:?}", net))
    }

    fn pin_mut(&mut self, pin: PinId) -> &mut Pin {
        self.pins[pin.0]
            .as_mut()
            .unwrap_or_else(|| panic!("stale pin id {:?}", pin))
    }

    fn assign_cell(&mut self, inst: InstId, cell: CellId, pins: Vec<PinId>) {
        for (port, pin) in pins.iter().enumerate() {
            if let PinOwner::Instance { port: p, .. } = &mut self.pin_mut(*pin).owner {
                *p = port;
            }
        }
        let i = self.instance_mut(inst);
        i.cell = cell;
        i.pins = pins;
    }

    // -- Transactions --------------------------------------------------------

    pub fn in_transaction(&self) -> bool {
        self.journal.is_open()
    }

    /// Opens the transaction. Only one may be open at a time.
    pub fn begin(&mut self) -> Result<(), JournalError> {
        self.journal.begin()
    }

    /// Keeps the changes and discards the log. Forgets any saved logs, since
    /// they can no longer be undone in isolation.
    pub fn commit(&mut self) -> Result<(), JournalError> {
        self.journal.commit()
    }

    /// Keeps the changes and pushes the log onto the saved stack so it can be
    /// undone later with `restore_saved`.
    pub fn commit_saved(&mut self) -> Result<(), JournalError> {
        self.journal.commit_saved()
    }

    /// Undoes every change since `begin` and closes the transaction. Derived
    /// timing state is stale afterwards.
    pub fn rollback(&mut self) -> Result<(), JournalError> {
        let entries = self.journal.take_open()?;
        log::trace!("rolling back {} journal entries", entries.len());
        self.undo_all(entries);
        Ok(())
    }

    /// Undoes the most recently saved transaction.
    pub fn restore_saved(&mut self) -> Result<(), JournalError> {
        let entries = self.journal.pop_saved()?;
        self.undo_all(entries);
        Ok(())
    }

    pub fn discard_saved(&mut self) {
        self.journal.discard_saved();
    }

    pub fn saved_count(&self) -> usize {
        self.journal.saved_count()
    }

    fn undo_all(&mut self, entries: Vec<JournalEntry>) {
        for entry in entries.into_iter().rev() {
            self.undo(entry);
        }
        self.epoch.bump();
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::SwapCell {
                inst,
                prev_cell,
                prev_pins,
            } => self.assign_cell(inst, prev_cell, prev_pins),
            JournalEntry::Connect { pin, net } => {
                let popped = self.net_mut(net).pins.pop();
                assert_eq!(popped, Some(pin), "journal out of sync undoing connect");
                self.pin_mut(pin).net = None;
            }
            JournalEntry::Disconnect { pin, net, position } => {
                self.net_mut(net).pins.insert(position, pin);
                self.pin_mut(pin).net = Some(net);
            }
            JournalEntry::CreatePort { pin } => {
                assert_eq!(pin.0 + 1, self.pins.len(), "journal out of sync undoing port");
                self.pins.pop();
                self.ports.pop();
            }
            JournalEntry::CreateNet { net } => {
                assert_eq!(net.0 + 1, self.nets.len(), "journal out of sync undoing net");
                if let Some(n) = self.nets.pop().flatten() {
                    self.net_by_name.remove(&n.name);
                }
            }
            JournalEntry::DestroyNet { net, saved } => {
                self.net_by_name.insert(saved.name, net);
                self.nets[net.0] = Some(saved);
            }
            JournalEntry::CreateInstance { inst, pins } => {
                for pin in pins.iter().rev() {
                    assert_eq!(pin.0 + 1, self.pins.len(), "journal out of sync undoing pin");
                    self.pins.pop();
                }
                assert_eq!(
                    inst.0 + 1,
                    self.instances.len(),
                    "journal out of sync undoing instance"
                );
                if let Some(i) = self.instances.pop().flatten() {
                    self.inst_by_name.remove(&i.name);
                }
            }
            JournalEntry::DestroyInstance {
                inst,
                saved,
                saved_pins,
            } => {
                for (id, pin) in saved_pins {
                    self.pins[id.0] = Some(pin);
                }
                self.inst_by_name.insert(saved.name, inst);
                self.instances[inst.0] = Some(saved);
            }
            JournalEntry::Move { inst, prev } => self.instance_mut(inst).location = prev,
            JournalEntry::Orient { inst, prev } => self.instance_mut(inst).orientation = prev,
            JournalEntry::InstanceDontTouch { inst, prev } => {
                self.instance_mut(inst).dont_touch = prev
            }
            JournalEntry::NetDontTouch { net, prev } => self.net_mut(net).dont_touch = prev,
            JournalEntry::NetSignalType { net, prev } => self.net_mut(net).signal_type = prev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liberty::test_utils::make_test_library;
    use pretty_assertions::assert_eq;

    fn lib() -> IndexedLibrary {
        IndexedLibrary::new(make_test_library()).unwrap()
    }

    /// in -> u1(INV) -> n1 -> u2(INV) -> out
    fn two_inverters(lib: &IndexedLibrary) -> Netlist {
        let mut n = Netlist::new();
        let inv = lib.cell_by_name("INV_X1").unwrap();
        let a = n.add_port("in", PortDirection::Input, Point::new(0, 0)).unwrap();
        let y = n.add_port("out", PortDirection::Output, Point::new(100, 0)).unwrap();
        let net_in = n.create_net("in", SignalType::Signal).unwrap();
        let n1 = n.create_net("n1", SignalType::Signal).unwrap();
        let net_out = n.create_net("out", SignalType::Signal).unwrap();
        let u1 = n.create_instance("u1", inv, lib, Point::new(10, 0)).unwrap();
        let u2 = n.create_instance("u2", inv, lib, Point::new(20, 0)).unwrap();
        n.connect(a, net_in).unwrap();
        n.connect(n.inst_pin(u1, "A", lib).unwrap(), net_in).unwrap();
        n.connect(n.inst_pin(u1, "Y", lib).unwrap(), n1).unwrap();
        n.connect(n.inst_pin(u2, "A", lib).unwrap(), n1).unwrap();
        n.connect(n.inst_pin(u2, "Y", lib).unwrap(), net_out).unwrap();
        n.connect(y, net_out).unwrap();
        n
    }

    #[test]
    fn builds_and_queries() {
        let lib = lib();
        let n = two_inverters(&lib);
        let u1 = n.find_instance("u1").unwrap();
        let n1 = n.find_net("n1").unwrap();
        assert_eq!(n.instance_name(u1), "u1");
        assert_eq!(n.net_pins(n1).len(), 2);
        let y = n.inst_pin(u1, "Y", &lib).unwrap();
        assert!(n.pin(y).is_driver());
        assert_eq!(n.pin_name(y, &lib), "u1/Y");
        assert!(n.net_has_port(n.find_net("in").unwrap()));
        assert!(!n.net_has_port(n1));
        assert!(n.pin(n.find_port("in").unwrap()).is_driver());
        assert!(n.pin(n.find_port("out").unwrap()).is_load());
    }

    #[test]
    fn rollback_restores_identical_state() {
        let lib = lib();
        let mut n = two_inverters(&lib);
        let before = n.clone_for_test();
        n.begin().unwrap();
        let u1 = n.find_instance("u1").unwrap();
        let inv2 = lib.cell_by_name("INV_X2").unwrap();
        n.replace_cell(u1, inv2, &lib).unwrap();
        n.set_location(u1, Point::new(5, 5)).unwrap();
        let extra = n.create_net("extra", SignalType::Signal).unwrap();
        let u2 = n.find_instance("u2").unwrap();
        let u2_a = n.inst_pin(u2, "A", &lib).unwrap();
        n.disconnect(u2_a).unwrap();
        n.connect(u2_a, extra).unwrap();
        n.destroy_instance(u1).unwrap();
        assert_ne!(n, before);
        n.rollback().unwrap();
        assert_eq!(n, before);
        assert!(!n.in_transaction());
    }

    #[test]
    fn dont_touch_mutations_are_errors() {
        let lib = lib();
        let mut n = two_inverters(&lib);
        let u1 = n.find_instance("u1").unwrap();
        let n1 = n.find_net("n1").unwrap();
        n.set_dont_touch_instance(u1, true);
        n.set_dont_touch_net(n1, true);
        n.begin().unwrap();
        let inv2 = lib.cell_by_name("INV_X2").unwrap();
        assert_eq!(
            n.replace_cell(u1, inv2, &lib),
            Err(EditError::DontTouchInstance("u1".to_string()))
        );
        let u2 = n.find_instance("u2").unwrap();
        let u2_a = n.inst_pin(u2, "A", &lib).unwrap();
        assert_eq!(
            n.disconnect(u2_a),
            Err(EditError::DontTouchNet("n1".to_string()))
        );
        n.rollback().unwrap();
        assert_eq!(n.instance(u1).cell, lib.cell_by_name("INV_X1").unwrap());
    }

    #[test]
    fn rollback_removes_ports_added_in_the_transaction() {
        let lib = lib();
        let mut n = two_inverters(&lib);
        let before = n.clone_for_test();
        n.begin().unwrap();
        let spare = n.add_port("spare", PortDirection::Output, Point::new(3, 4)).unwrap();
        let n1 = n.find_net("n1").unwrap();
        n.connect(spare, n1).unwrap();
        assert!(n.find_port("spare").is_some());
        n.rollback().unwrap();
        assert!(n.find_port("spare").is_none());
        assert_eq!(n, before);
    }

    #[test]
    fn only_one_transaction_at_a_time() {
        let mut n = Netlist::new();
        n.begin().unwrap();
        assert_eq!(n.begin(), Err(JournalError::AlreadyOpen));
        n.commit().unwrap();
        assert_eq!(n.commit(), Err(JournalError::NotOpen));
        assert_eq!(n.rollback(), Err(JournalError::NotOpen));
    }

    #[test]
    fn replace_cell_rejects_incompatible_ports() {
        let lib = lib();
        let mut n = two_inverters(&lib);
        let u1 = n.find_instance("u1").unwrap();
        let nand = lib.cell_by_name("NAND2_X1").unwrap();
        assert!(matches!(
            n.replace_cell(u1, nand, &lib),
            Err(EditError::IncompatibleCell { .. })
        ));
    }

    #[test]
    fn saved_transactions_restore_newest_first() {
        let lib = lib();
        let mut n = two_inverters(&lib);
        let original = n.clone_for_test();
        let u1 = n.find_instance("u1").unwrap();
        let u2 = n.find_instance("u2").unwrap();
        let inv2 = lib.cell_by_name("INV_X2").unwrap();
        n.begin().unwrap();
        n.replace_cell(u1, inv2, &lib).unwrap();
        n.commit_saved().unwrap();
        let after_first = n.clone_for_test();
        n.begin().unwrap();
        n.replace_cell(u2, inv2, &lib).unwrap();
        n.commit_saved().unwrap();
        assert_eq!(n.saved_count(), 2);
        n.restore_saved().unwrap();
        assert_eq!(n, after_first);
        n.restore_saved().unwrap();
        assert_eq!(n, original);
        assert_eq!(n.restore_saved(), Err(JournalError::NothingSaved));
    }

    impl Netlist {
        /// Structural copy for comparisons in tests.
        pub(crate) fn clone_for_test(&self) -> Netlist {
            Netlist {
                names: self.names.clone(),
                instances: self.instances.clone(),
                nets: self.nets.clone(),
                pins: self.pins.clone(),
                ports: self.ports.clone(),
                inst_by_name: self.inst_by_name.clone(),
                net_by_name: self.net_by_name.clone(),
                journal: Journal::default(),
                epoch: self.epoch,
            }
        }
    }
}
