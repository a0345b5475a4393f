// SPDX-License-Identifier: Apache-2.0

//! Indexed view over a cell `Library`.
//!
//! `IndexedLibrary` owns the `Library`, parses every output function once on
//! construction, and lazily builds a name index. It is also the home of the
//! derived per-cell data (functional classification, equivalence classes,
//! target slews and loads); those live in epoch-stamped caches so a single
//! `reset_cache()` or `set_dont_use()` invalidates all of them together.

use crate::cache::{Epoch, EpochCache, EpochMap};
use crate::classify::{EquivalenceClasses, FunctionalBucket, TruthTable};
use crate::liberty::cell_formula::{parse_formula, Term};
use crate::liberty::library::{Cell, CellId, Library};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Owning wrapper around a `Library` with lazily built indices for fast lookup.
pub struct IndexedLibrary {
    library: Library,
    /// Parsed function for each `cells[i].ports[j]`, if it has one.
    functions: Vec<Vec<Option<Term>>>,
    /// Map from cell name to index in `library.cells`.
    cell_by_name: RefCell<Option<HashMap<String, CellId>>>,
    epoch: std::cell::Cell<Epoch>,
    pub(crate) buckets: EpochMap<CellId, FunctionalBucket>,
    pub(crate) truth_tables: EpochMap<(CellId, usize), Option<TruthTable>>,
    pub(crate) equivalence: EpochCache<Rc<EquivalenceClasses>>,
    pub(crate) target_slews: EpochCache<Result<[f64; 2], crate::characterize::LookupError>>,
    pub(crate) target_loads: EpochMap<CellId, Result<f64, crate::characterize::LookupError>>,
}

impl IndexedLibrary {
    /// Constructs a new indexed view, validating tables and parsing every
    /// function string.
    pub fn new(library: Library) -> Result<Self, String> {
        library.validate()?;
        let mut functions = Vec::with_capacity(library.cells.len());
        for cell in &library.cells {
            let mut per_port = Vec::with_capacity(cell.ports.len());
            for port in &cell.ports {
                let parsed = match &port.function {
                    Some(text) if !text.trim().is_empty() => {
                        Some(parse_formula(text).map_err(|e| {
                            format!(
                                "cell {} pin {} function {:?}: {}",
                                cell.name, port.name, text, e
                            )
                        })?)
                    }
                    _ => None,
                };
                per_port.push(parsed);
            }
            functions.push(per_port);
        }
        Ok(IndexedLibrary {
            library,
            functions,
            cell_by_name: RefCell::new(None),
            epoch: std::cell::Cell::new(Epoch::default()),
            buckets: EpochMap::default(),
            truth_tables: EpochMap::default(),
            equivalence: EpochCache::default(),
            target_slews: EpochCache::default(),
            target_loads: EpochMap::default(),
        })
    }

    /// Returns a shared reference to the underlying `Library`.
    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        &self.library.cells[id.0]
    }

    pub fn cell_ids(&self) -> impl Iterator<Item = CellId> {
        (0..self.library.cells.len()).map(CellId)
    }

    pub fn num_cells(&self) -> usize {
        self.library.cells.len()
    }

    /// Looks up a cell by name.
    pub fn cell_by_name(&self, name: &str) -> Option<CellId> {
        let mut opt_map = self.cell_by_name.borrow_mut();
        if opt_map.is_none() {
            let mut map: HashMap<String, CellId> = HashMap::new();
            for (i, cell) in self.library.cells.iter().enumerate() {
                map.insert(cell.name.clone(), CellId(i));
            }
            *opt_map = Some(map);
        }
        opt_map.as_ref().and_then(|m| m.get(name).copied())
    }

    /// Parsed function of `cell.ports[port_index]`.
    pub fn function(&self, cell: CellId, port_index: usize) -> Option<&Term> {
        self.functions
            .get(cell.0)
            .and_then(|ports| ports.get(port_index))
            .and_then(|f| f.as_ref())
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch.get()
    }

    /// Drops every derived per-cell value; they are recomputed on demand.
    pub fn reset_cache(&self) {
        let mut e = self.epoch.get();
        e.bump();
        self.epoch.set(e);
        log::debug!("library caches reset; epoch now {}", e.value());
    }

    pub fn set_dont_use(&mut self, cell: CellId, dont_use: bool) {
        self.library.cells[cell.0].dont_use = dont_use;
        self.reset_cache();
    }

    pub fn leakage(&self, cell: CellId) -> Option<f64> {
        self.cell(cell).leakage_power
    }

    /// Max transition limit for an output port, falling back to the library
    /// default.
    pub fn max_transition(&self, cell: CellId, port_index: usize) -> Option<f64> {
        self.cell(cell).ports[port_index]
            .max_transition
            .or(self.library.default_max_transition)
    }

    pub fn max_capacitance(&self, cell: CellId, port_index: usize) -> Option<f64> {
        self.cell(cell).ports[port_index]
            .max_capacitance
            .or(self.library.default_max_capacitance)
    }

    pub fn max_fanout(&self, cell: CellId, port_index: usize) -> Option<f64> {
        self.cell(cell).ports[port_index]
            .max_fanout
            .or(self.library.default_max_fanout)
    }
}
