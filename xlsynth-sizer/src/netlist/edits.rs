// SPDX-License-Identifier: Apache-2.0

//! Composite edits built from the journaled primitives.
//!
//! Each edit validates every precondition before its first mutation, so a
//! refused edit leaves the netlist untouched even outside a transaction.

use super::{EditError, InstId, NetId, Netlist, PinId, Point};
use crate::liberty::{CellId, IndexedLibrary};

/// Which net a buffer removal keeps and which it destroys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRemoval {
    pub survivor: NetId,
    pub removed: NetId,
}

impl Netlist {
    /// Exchanges the nets of two pins of the same instance.
    pub fn swap_pins(&mut self, a: PinId, b: PinId) -> Result<(), EditError> {
        let (Some(inst_a), Some(inst_b)) = (self.pin(a).instance(), self.pin(b).instance()) else {
            return Err(EditError::PinsOnDifferentInstances);
        };
        if inst_a != inst_b {
            return Err(EditError::PinsOnDifferentInstances);
        }
        self.check_instance_touchable(inst_a)?;
        let net_a = self.pin(a).net;
        let net_b = self.pin(b).net;
        for net in [net_a, net_b].into_iter().flatten() {
            self.check_net_touchable(net)?;
        }
        if a == b || net_a == net_b {
            return Ok(());
        }
        if net_a.is_some() {
            self.disconnect(a)?;
        }
        if net_b.is_some() {
            self.disconnect(b)?;
        }
        if let Some(net) = net_b {
            self.connect(a, net)?;
        }
        if let Some(net) = net_a {
            self.connect(b, net)?;
        }
        Ok(())
    }

    /// Input and output pins of a buffer instance.
    fn buffer_pins(&self, inst: InstId, lib: &IndexedLibrary) -> Result<(PinId, PinId), EditError> {
        let cell = self.instance(inst).cell;
        if !lib.is_buffer(cell) {
            return Err(EditError::NotABuffer(self.instance_name(inst).to_string()));
        }
        let pins = self.inst_pins(inst);
        let input = pins.iter().copied().find(|p| self.pin(*p).is_load());
        let output = pins.iter().copied().find(|p| self.pin(*p).is_driver());
        match (input, output) {
            (Some(i), Some(o)) => Ok((i, o)),
            _ => Err(EditError::NotABuffer(self.instance_name(inst).to_string())),
        }
    }

    /// Decides which net survives removal of buffer `inst` without changing
    /// anything. The input net is kept, so the upstream driver's net is
    /// unchanged, unless only the output net carries a top-level port.
    pub fn plan_buffer_removal(
        &self,
        inst: InstId,
        lib: &IndexedLibrary,
    ) -> Result<BufferRemoval, EditError> {
        self.check_instance_touchable(inst)?;
        let (in_pin, out_pin) = self.buffer_pins(inst, lib)?;
        let in_net = self
            .pin(in_pin)
            .net
            .ok_or_else(|| EditError::PinNotConnected(self.pin_name(in_pin, lib)))?;
        let out_net = self
            .pin(out_pin)
            .net
            .ok_or_else(|| EditError::PinNotConnected(self.pin_name(out_pin, lib)))?;
        if in_net == out_net {
            return Err(EditError::BufferDrivesOwnInput(self.instance_name(inst).to_string()));
        }
        self.check_net_touchable(in_net)?;
        self.check_net_touchable(out_net)?;
        let in_port = self.net_has_port(in_net);
        let out_port = self.net_has_port(out_net);
        if in_port && out_port {
            return Err(EditError::BothNetsHavePorts(self.instance_name(inst).to_string()));
        }
        Ok(if out_port {
            BufferRemoval {
                survivor: out_net,
                removed: in_net,
            }
        } else {
            BufferRemoval {
                survivor: in_net,
                removed: out_net,
            }
        })
    }

    /// Removes buffer `inst`, merging its input and output nets.
    pub fn remove_buffer(
        &mut self,
        inst: InstId,
        lib: &IndexedLibrary,
    ) -> Result<BufferRemoval, EditError> {
        let plan = self.plan_buffer_removal(inst, lib)?;
        for pin in self.net_pins(plan.removed).to_vec() {
            if self.pin(pin).instance() == Some(inst) {
                continue;
            }
            if let Some(owner) = self.pin(pin).instance() {
                self.check_instance_touchable(owner)?;
            }
        }
        let (in_pin, out_pin) = self.buffer_pins(inst, lib)?;
        self.disconnect(in_pin)?;
        self.disconnect(out_pin)?;
        for pin in self.net_pins(plan.removed).to_vec() {
            self.disconnect(pin)?;
            self.connect(pin, plan.survivor)?;
        }
        self.destroy_instance(inst)?;
        self.destroy_net(plan.removed)?;
        Ok(plan)
    }

    /// Inserts a `buffer` cell between `net`'s driver and `loads`, which move
    /// to a new net driven by the buffer. The buffer is placed at the
    /// centroid of the moved loads.
    pub fn insert_buffer(
        &mut self,
        net: NetId,
        loads: &[PinId],
        buffer: CellId,
        lib: &IndexedLibrary,
    ) -> Result<InstId, EditError> {
        self.check_net_touchable(net)?;
        for pin in loads {
            if self.pin(*pin).net != Some(net) || !self.pin(*pin).is_load() {
                return Err(EditError::PinNotOnNet {
                    pin: self.pin_name(*pin, lib),
                    net: self.net_name(net).to_string(),
                });
            }
            if let Some(owner) = self.pin(*pin).instance() {
                self.check_instance_touchable(owner)?;
            }
        }
        let base = self.net_name(net).to_string();
        let inst_name = self.fresh_name(&format!("{}_buf", base), |n, s| n.find_instance(s).is_some());
        let net_name = self.fresh_name(&format!("{}_buffered", base), |n, s| n.find_net(s).is_some());
        let location = self.centroid(loads);
        let signal_type = self.net(net).signal_type;

        let new_net = self.create_net(&net_name, signal_type)?;
        let inst = self.create_instance(&inst_name, buffer, lib, location)?;
        let (in_pin, out_pin) = self.buffer_pins(inst, lib)?;
        self.connect(in_pin, net)?;
        self.connect(out_pin, new_net)?;
        for pin in loads {
            self.disconnect(*pin)?;
            self.connect(*pin, new_net)?;
        }
        Ok(inst)
    }

    fn fresh_name(&self, stem: &str, taken: impl Fn(&Netlist, &str) -> bool) -> String {
        let mut i = 0usize;
        loop {
            let candidate = format!("{}{}", stem, i);
            if !taken(self, &candidate) {
                return candidate;
            }
            i += 1;
        }
    }

    fn centroid(&self, pins: &[PinId]) -> Point {
        if pins.is_empty() {
            return Point::default();
        }
        let (sx, sy) = pins.iter().fold((0i64, 0i64), |(x, y), p| {
            let loc = self.pin_location(*p);
            (x + loc.x, y + loc.y)
        });
        let n = pins.len() as i64;
        Point::new(sx / n, sy / n)
    }
}
