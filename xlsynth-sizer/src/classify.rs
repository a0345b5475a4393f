// SPDX-License-Identifier: Apache-2.0

//! Functional classification of library cells.
//!
//! Each single-output combinational cell gets a truth table built by
//! enumerating every input assignment against its parsed function. Inputs are
//! ordered by name before enumeration, so two cells with the same behavior get
//! the same table no matter how their ports were declared. Tables are matched
//! against canonical AND/OR/NAND/NOR/XOR/XNOR functions of the same arity;
//! the 0- and 1-input cases cover tie cells, buffers and inverters.
//!
//! Cells with identical port lists and identical output tables form an
//! equivalence class (same function, different drive strength). Classes back
//! the swappable-cell and threshold-voltage-variant queries used by the
//! optimizers.

use crate::liberty::{CellId, CellKind, IndexedLibrary, PortDirection};
use bitvec::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Inputs beyond this produce no truth table at all.
pub const MAX_TRUTH_TABLE_INPUTS: usize = 32;
/// Inputs beyond this are never matched against canonical tables.
pub const MAX_CANONICAL_MATCH_INPUTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FunctionalBucket {
    And,
    Or,
    Nand,
    Nor,
    Xor,
    Xnor,
    Buffer,
    Inverter,
    TieHi,
    TieLo,
    Other,
}

impl FunctionalBucket {
    /// Buckets with a canonical table at every arity of two or more, in match
    /// order.
    const CANONICAL: [FunctionalBucket; 6] = [
        FunctionalBucket::And,
        FunctionalBucket::Or,
        FunctionalBucket::Nand,
        FunctionalBucket::Nor,
        FunctionalBucket::Xor,
        FunctionalBucket::Xnor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FunctionalBucket::And => "AND",
            FunctionalBucket::Or => "OR",
            FunctionalBucket::Nand => "NAND",
            FunctionalBucket::Nor => "NOR",
            FunctionalBucket::Xor => "XOR",
            FunctionalBucket::Xnor => "XNOR",
            FunctionalBucket::Buffer => "BUFFER",
            FunctionalBucket::Inverter => "INVERTER",
            FunctionalBucket::TieHi => "TIEHI",
            FunctionalBucket::TieLo => "TIELO",
            FunctionalBucket::Other => "OTHER",
        }
    }
}

impl fmt::Display for FunctionalBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Truth table over `num_inputs` inputs; bit `row` is the output for the
/// assignment where input `i` takes bit `i` of `row`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TruthTable {
    num_inputs: usize,
    bits: BitVec<u64, Lsb0>,
}

impl TruthTable {
    pub fn from_fn(num_inputs: usize, mut f: impl FnMut(u64) -> bool) -> Self {
        assert!(
            num_inputs <= MAX_TRUTH_TABLE_INPUTS,
            "truth table with {} inputs",
            num_inputs
        );
        let rows = 1u64 << num_inputs;
        let mut bits: BitVec<u64, Lsb0> = BitVec::with_capacity(rows as usize);
        for row in 0..rows {
            bits.push(f(row));
        }
        TruthTable { num_inputs, bits }
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_rows(&self) -> u64 {
        1u64 << self.num_inputs
    }

    pub fn get(&self, row: u64) -> bool {
        self.bits[row as usize]
    }

    pub fn constant(&self) -> Option<bool> {
        if self.bits.all() {
            Some(true)
        } else if self.bits.not_any() {
            Some(false)
        } else {
            None
        }
    }

    /// Canonical table for `bucket` at the given arity, for the buckets that
    /// have one.
    pub fn canonical(bucket: FunctionalBucket, num_inputs: usize) -> Option<TruthTable> {
        let all_ones = (1u64 << num_inputs) - 1;
        let f: fn(u64, u64) -> bool = match bucket {
            FunctionalBucket::And => |row, all| row == all,
            FunctionalBucket::Or => |row, _| row != 0,
            FunctionalBucket::Nand => |row, all| row != all,
            FunctionalBucket::Nor => |row, _| row == 0,
            FunctionalBucket::Xor => |row, _| row.count_ones() % 2 == 1,
            FunctionalBucket::Xnor => |row, _| row.count_ones() % 2 == 0,
            _ => return None,
        };
        Some(TruthTable::from_fn(num_inputs, |row| f(row, all_ones)))
    }
}

/// Partition of the logic cells by (ports, output functions).
pub struct EquivalenceClasses {
    classes: Vec<Vec<CellId>>,
    class_of: Vec<Option<usize>>,
}

impl EquivalenceClasses {
    pub fn class_of(&self, cell: CellId) -> Option<&[CellId]> {
        self.class_of
            .get(cell.0)
            .copied()
            .flatten()
            .map(|c| self.classes[c].as_slice())
    }

    pub fn classes(&self) -> &[Vec<CellId>] {
        &self.classes
    }
}

type Signature = (Vec<(String, PortDirection)>, Vec<Option<TruthTable>>);

fn sorted_input_names(lib: &IndexedLibrary, cell: CellId) -> Vec<String> {
    let mut names: Vec<String> = lib
        .cell(cell)
        .input_ports()
        .map(|p| p.name.clone())
        .collect();
    names.sort();
    names
}

fn swap_bits(row: u64, a: usize, b: usize) -> u64 {
    if ((row >> a) & 1) != ((row >> b) & 1) {
        row ^ ((1u64 << a) | (1u64 << b))
    } else {
        row
    }
}

impl IndexedLibrary {
    /// Truth table of `cell.ports[output_port]` over the cell's inputs in
    /// name order, or `None` when the port has no function, the function
    /// names a non-input, or the cell has too many inputs.
    pub fn truth_table(&self, cell: CellId, output_port: usize) -> Option<TruthTable> {
        let epoch = self.epoch();
        self.truth_tables
            .get_or_insert_with(epoch, (cell, output_port), || {
                self.compute_truth_table(cell, output_port)
            })
    }

    fn compute_truth_table(&self, cell: CellId, output_port: usize) -> Option<TruthTable> {
        let function = self.function(cell, output_port)?;
        let inputs = sorted_input_names(self, cell);
        if inputs.len() > MAX_TRUTH_TABLE_INPUTS {
            return None;
        }
        if function
            .inputs()
            .iter()
            .any(|name| inputs.binary_search(name).is_err())
        {
            log::debug!(
                "cell {} pin {} function references a non-input",
                self.cell(cell).name,
                self.cell(cell).ports[output_port].name
            );
            return None;
        }
        Some(TruthTable::from_fn(inputs.len(), |row| {
            let value_of = |name: &str| {
                inputs
                    .binary_search_by(|p| p.as_str().cmp(name))
                    .ok()
                    .map(|i| (row >> i) & 1 == 1)
            };
            function.eval(&value_of).unwrap_or(false)
        }))
    }

    fn equivalence_classes(&self) -> Rc<EquivalenceClasses> {
        self.equivalence
            .get_or_compute(self.epoch(), || Rc::new(self.compute_equivalence()))
    }

    fn compute_equivalence(&self) -> EquivalenceClasses {
        let mut by_signature: HashMap<Signature, usize> = HashMap::new();
        let mut classes: Vec<Vec<CellId>> = Vec::new();
        let mut class_of: Vec<Option<usize>> = vec![None; self.num_cells()];
        for id in self.cell_ids() {
            let cell = self.cell(id);
            if cell.kind != CellKind::Logic {
                continue;
            }
            let mut ports: Vec<(String, PortDirection)> = cell
                .ports
                .iter()
                .filter(|p| !p.direction.is_supply())
                .map(|p| (p.name.clone(), p.direction))
                .collect();
            ports.sort_by(|a, b| a.0.cmp(&b.0));
            let mut outputs: Vec<(&str, usize)> = cell
                .ports
                .iter()
                .enumerate()
                .filter(|(_, p)| p.direction.is_output())
                .map(|(i, p)| (p.name.as_str(), i))
                .collect();
            outputs.sort();
            let tables: Vec<Option<TruthTable>> = outputs
                .iter()
                .map(|(_, i)| self.truth_table(id, *i))
                .collect();
            if tables.iter().all(Option::is_none) {
                continue;
            }
            let class = *by_signature.entry((ports, tables)).or_insert_with(|| {
                classes.push(Vec::new());
                classes.len() - 1
            });
            classes[class].push(id);
            class_of[id.0] = Some(class);
        }
        for class in classes.iter_mut() {
            class.sort_by(|a, b| {
                let (ca, cb) = (self.cell(*a), self.cell(*b));
                ca.area.total_cmp(&cb.area).then_with(|| ca.name.cmp(&cb.name))
            });
        }
        log::debug!("library has {} functional equivalence classes", classes.len());
        EquivalenceClasses { classes, class_of }
    }

    /// Cells with the same function and ports as `cell` (including `cell`
    /// itself), smallest area first.
    pub fn equivalent_cells(&self, cell: CellId) -> Vec<CellId> {
        match self.equivalence_classes().class_of(cell) {
            Some(class) => class.to_vec(),
            None => vec![cell],
        }
    }

    pub fn classify(&self, cell: CellId) -> FunctionalBucket {
        let epoch = self.epoch();
        if let Some(bucket) = self.buckets.get(epoch, &cell) {
            return bucket;
        }
        let equivalents = self.equivalent_cells(cell);
        // Equivalent cells always share one bucket.
        for other in &equivalents {
            if let Some(bucket) = self.buckets.get(epoch, other) {
                self.buckets.insert(epoch, cell, bucket);
                return bucket;
            }
        }
        let bucket = self.compute_bucket(cell, &equivalents);
        for other in equivalents {
            self.buckets.insert(epoch, other, bucket);
        }
        self.buckets.insert(epoch, cell, bucket);
        bucket
    }

    fn compute_bucket(&self, cell: CellId, equivalents: &[CellId]) -> FunctionalBucket {
        let c = self.cell(cell);
        if c.kind != CellKind::Logic {
            return FunctionalBucket::Other;
        }
        let outputs: Vec<usize> = c
            .ports
            .iter()
            .enumerate()
            .filter(|(_, p)| p.direction.is_output())
            .map(|(i, _)| i)
            .collect();
        if outputs.len() != 1 {
            return FunctionalBucket::Other;
        }
        let output = outputs[0];
        let num_inputs = c.input_ports().count();
        let Some(table) = self.truth_table(cell, output) else {
            return FunctionalBucket::Other;
        };
        match num_inputs {
            0 => match table.constant() {
                Some(true) => FunctionalBucket::TieHi,
                Some(false) => FunctionalBucket::TieLo,
                None => FunctionalBucket::Other,
            },
            1 => match (table.get(0), table.get(1)) {
                (false, true) => FunctionalBucket::Buffer,
                (true, false) => FunctionalBucket::Inverter,
                _ => FunctionalBucket::Other,
            },
            n if n <= MAX_CANONICAL_MATCH_INPUTS => {
                let output_name = &c.ports[output].name;
                let mut tables = vec![table];
                for other in equivalents.iter().filter(|o| **o != cell) {
                    if let Some(t) = self
                        .cell(*other)
                        .port_index(output_name)
                        .and_then(|i| self.truth_table(*other, i))
                    {
                        tables.push(t);
                    }
                }
                for bucket in FunctionalBucket::CANONICAL {
                    let Some(canonical) = TruthTable::canonical(bucket, n) else {
                        continue;
                    };
                    if tables.iter().any(|t| *t == canonical) {
                        return bucket;
                    }
                }
                FunctionalBucket::Other
            }
            _ => FunctionalBucket::Other,
        }
    }

    /// Usable (not don't-use) cells in `bucket`, smallest area first.
    pub fn usable_cells_in_bucket(&self, bucket: FunctionalBucket) -> Vec<CellId> {
        let mut cells: Vec<CellId> = self
            .cell_ids()
            .filter(|id| !self.cell(*id).dont_use && self.classify(*id) == bucket)
            .collect();
        cells.sort_by(|a, b| {
            let (ca, cb) = (self.cell(*a), self.cell(*b));
            ca.area.total_cmp(&cb.area).then_with(|| ca.name.cmp(&cb.name))
        });
        cells
    }

    pub fn buffer_cells(&self) -> Vec<CellId> {
        self.usable_cells_in_bucket(FunctionalBucket::Buffer)
    }

    pub fn inverter_cells(&self) -> Vec<CellId> {
        self.usable_cells_in_bucket(FunctionalBucket::Inverter)
    }

    pub fn tiehi_cells(&self) -> Vec<CellId> {
        self.usable_cells_in_bucket(FunctionalBucket::TieHi)
    }

    pub fn tielo_cells(&self) -> Vec<CellId> {
        self.usable_cells_in_bucket(FunctionalBucket::TieLo)
    }

    pub fn is_buffer(&self, cell: CellId) -> bool {
        self.classify(cell) == FunctionalBucket::Buffer
    }

    /// Usable cells that can replace `cell` in place: same function, same
    /// footprint height, width no larger.
    pub fn swappable_cells(&self, cell: CellId) -> Vec<CellId> {
        let c = self.cell(cell);
        self.equivalent_cells(cell)
            .into_iter()
            .filter(|o| *o != cell)
            .filter(|o| {
                let oc = self.cell(*o);
                !oc.dont_use && oc.height == c.height && oc.width <= c.width
            })
            .collect()
    }

    /// Threshold-voltage variants of `cell` (same function and footprint,
    /// different VT class), including `cell`, ordered by leakage ascending.
    pub fn vt_equiv_cells(&self, cell: CellId) -> Vec<CellId> {
        let c = self.cell(cell);
        if c.vt_class.is_none() {
            return vec![cell];
        }
        let mut cells: Vec<CellId> = self
            .equivalent_cells(cell)
            .into_iter()
            .filter(|o| {
                let oc = self.cell(*o);
                *o == cell
                    || (!oc.dont_use
                        && oc.width == c.width
                        && oc.height == c.height
                        && oc.vt_class.is_some()
                        && oc.vt_class != c.vt_class)
            })
            .collect();
        cells.sort_by(|a, b| {
            let la = self.leakage(*a).unwrap_or(f64::INFINITY);
            let lb = self.leakage(*b).unwrap_or(f64::INFINITY);
            la.total_cmp(&lb)
                .then_with(|| self.cell(*a).name.cmp(&self.cell(*b).name))
        });
        cells
    }

    /// True when exchanging inputs `a` and `b` leaves every output function
    /// that depends on both unchanged. Requires at least one such output.
    pub fn is_commutative(&self, cell: CellId, a: &str, b: &str) -> bool {
        let c = self.cell(cell);
        if !c.is_logic() || a == b {
            return false;
        }
        let inputs = sorted_input_names(self, cell);
        let (Ok(ia), Ok(ib)) = (
            inputs.binary_search_by(|p| p.as_str().cmp(a)),
            inputs.binary_search_by(|p| p.as_str().cmp(b)),
        ) else {
            return false;
        };
        let mut found = false;
        for (idx, port) in c.ports.iter().enumerate() {
            if !port.direction.is_output() {
                continue;
            }
            let Some(function) = self.function(cell, idx) else {
                continue;
            };
            if !(function.depends_on(a) && function.depends_on(b)) {
                continue;
            }
            let Some(table) = self.truth_table(cell, idx) else {
                return false;
            };
            found = true;
            if (0..table.num_rows()).any(|row| table.get(row) != table.get(swap_bits(row, ia, ib))) {
                return false;
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liberty::test_utils::{comb_cell, make_test_library, CombSpec};
    use crate::liberty::{Library, TimingSense};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn lib() -> IndexedLibrary {
        IndexedLibrary::new(make_test_library()).unwrap()
    }

    fn names(lib: &IndexedLibrary, ids: &[CellId]) -> Vec<String> {
        ids.iter().map(|id| lib.cell(*id).name.clone()).collect()
    }

    #[test_case("AND2_X1", FunctionalBucket::And)]
    #[test_case("OR2_X1", FunctionalBucket::Or)]
    #[test_case("NAND2_X1", FunctionalBucket::Nand)]
    #[test_case("NOR2_X1", FunctionalBucket::Nor)]
    #[test_case("XOR2_X1", FunctionalBucket::Xor)]
    #[test_case("XNOR2_X1", FunctionalBucket::Xnor)]
    #[test_case("INV_X1", FunctionalBucket::Inverter)]
    #[test_case("BUF_X2", FunctionalBucket::Buffer)]
    #[test_case("TIEHI", FunctionalBucket::TieHi)]
    #[test_case("TIELO", FunctionalBucket::TieLo)]
    #[test_case("AOI21_X1", FunctionalBucket::Other)]
    #[test_case("DFF_X1", FunctionalBucket::Other)]
    fn classify_matches_canonical_functions(name: &str, expected: FunctionalBucket) {
        let lib = lib();
        let cell = lib.cell_by_name(name).unwrap();
        assert_eq!(lib.classify(cell), expected);
        assert_eq!(lib.classify(cell), expected);
    }

    fn asymmetric<'a>(
        name: &'a str,
        inputs: &'a [&'a str],
        function: &'a str,
    ) -> crate::liberty::Cell {
        comb_cell(CombSpec {
            name,
            inputs,
            function,
            sense: TimingSense::NonUnate,
            strength: 1.0,
            leakage: 1e-9,
            vt: None,
        })
    }

    #[test]
    fn classify_ignores_port_declaration_order() {
        let library = Library {
            name: "order".to_string(),
            cells: vec![
                asymmetric("ANDN_AB", &["A", "B"], "A * !B"),
                asymmetric("ANDN_BA", &["B", "A"], "A * !B"),
                asymmetric("NAND_BA", &["B", "A"], "!(B * A)"),
            ],
            ..Default::default()
        };
        let lib = IndexedLibrary::new(library).unwrap();
        let ab = lib.cell_by_name("ANDN_AB").unwrap();
        let ba = lib.cell_by_name("ANDN_BA").unwrap();
        let y_ab = lib.cell(ab).port_index("Y").unwrap();
        let y_ba = lib.cell(ba).port_index("Y").unwrap();
        assert_eq!(lib.truth_table(ab, y_ab), lib.truth_table(ba, y_ba));
        assert_eq!(lib.classify(ab), lib.classify(ba));
        assert_eq!(lib.equivalent_cells(ab), vec![ab, ba]);
        let nand = lib.cell_by_name("NAND_BA").unwrap();
        assert_eq!(lib.classify(nand), FunctionalBucket::Nand);
    }

    #[test]
    fn classify_skips_cells_beyond_canonical_arity() {
        let inputs: Vec<String> = (0..17).map(|i| format!("I{}", i)).collect();
        let function = inputs.join(" * ");
        let refs: Vec<&str> = inputs.iter().map(|s| s.as_str()).collect();
        let library = Library {
            name: "wide".to_string(),
            cells: vec![asymmetric("AND17", &refs, &function)],
            ..Default::default()
        };
        let lib = IndexedLibrary::new(library).unwrap();
        let cell = lib.cell_by_name("AND17").unwrap();
        let y = lib.cell(cell).port_index("Y").unwrap();
        let table = lib.truth_table(cell, y).unwrap();
        assert_eq!(table.num_inputs(), 17);
        assert!(table.get(table.num_rows() - 1));
        assert_eq!(lib.classify(cell), FunctionalBucket::Other);
    }

    #[test]
    fn equivalence_groups_drive_strengths_and_vt_flavors() {
        let lib = lib();
        let nand = lib.cell_by_name("NAND2_X1").unwrap();
        assert_eq!(
            names(&lib, &lib.equivalent_cells(nand)),
            vec!["NAND2_X1", "NAND2_X1_HVT", "NAND2_X1_LVT", "NAND2_X2"]
        );
        let inv = lib.cell_by_name("INV_X1").unwrap();
        assert_eq!(names(&lib, &lib.equivalent_cells(inv)), vec!["INV_X1", "INV_X2"]);
    }

    #[test]
    fn swappable_cells_respect_footprint() {
        let lib = lib();
        let x2 = lib.cell_by_name("NAND2_X2").unwrap();
        assert_eq!(
            names(&lib, &lib.swappable_cells(x2)),
            vec!["NAND2_X1", "NAND2_X1_HVT", "NAND2_X1_LVT"]
        );
        let x1 = lib.cell_by_name("NAND2_X1").unwrap();
        assert_eq!(
            names(&lib, &lib.swappable_cells(x1)),
            vec!["NAND2_X1_HVT", "NAND2_X1_LVT"]
        );
    }

    #[test]
    fn vt_variants_are_ordered_by_leakage() {
        let lib = lib();
        let svt = lib.cell_by_name("NAND2_X1").unwrap();
        assert_eq!(
            names(&lib, &lib.vt_equiv_cells(svt)),
            vec!["NAND2_X1_HVT", "NAND2_X1", "NAND2_X1_LVT"]
        );
        let inv = lib.cell_by_name("INV_X1").unwrap();
        assert_eq!(lib.vt_equiv_cells(inv), vec![inv]);
    }

    #[test]
    fn dont_use_cells_are_classified_but_not_usable() {
        let mut lib = lib();
        let buf1 = lib.cell_by_name("BUF_X1").unwrap();
        lib.set_dont_use(buf1, true);
        assert_eq!(lib.classify(buf1), FunctionalBucket::Buffer);
        assert_eq!(names(&lib, &lib.buffer_cells()), vec!["BUF_X2", "BUF_X4"]);
        assert_eq!(names(&lib, &lib.tiehi_cells()), vec!["TIEHI"]);
    }

    #[test]
    fn commutative_inputs() {
        let lib = lib();
        let nand = lib.cell_by_name("NAND2_X1").unwrap();
        assert!(lib.is_commutative(nand, "A", "B"));
        let aoi = lib.cell_by_name("AOI21_X1").unwrap();
        assert!(lib.is_commutative(aoi, "A1", "A2"));
        assert!(!lib.is_commutative(aoi, "A1", "B"));
        assert!(!lib.is_commutative(aoi, "A1", "A1"));
        assert!(!lib.is_commutative(aoi, "A1", "Z"));
    }

    #[test]
    fn canonical_tables() {
        let and3 = TruthTable::canonical(FunctionalBucket::And, 3).unwrap();
        assert_eq!((0..8).filter(|r| and3.get(*r)).count(), 1);
        let xor2 = TruthTable::canonical(FunctionalBucket::Xor, 2).unwrap();
        assert_eq!(
            (0..4).map(|r| xor2.get(r)).collect::<Vec<_>>(),
            vec![false, true, true, false]
        );
        assert!(TruthTable::canonical(FunctionalBucket::Buffer, 1).is_none());
    }
}
