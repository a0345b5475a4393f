// SPDX-License-Identifier: Apache-2.0

//! Random edit sequences are undone exactly by rollback and by restoring
//! saved transactions.

mod common;

use pretty_assertions::assert_eq;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use xlsynth_sizer::design::Design;
use xlsynth_sizer::netlist::PinOwner;
use xlsynth_sizer::optimize::Move;
use xlsynth_sizer::timing::{MinMax, Sta};

/// Proposes one random edit; may be illegal, in which case applying it fails
/// and leaves whatever it already changed for the journal to undo.
fn random_move(design: &Design<Sta>, rng: &mut Pcg64Mcg) -> Option<Move> {
    let netlist = &design.netlist;
    let lib = &design.library;
    let insts: Vec<_> = netlist.instance_ids().collect();
    let inst = *insts.choose(rng)?;
    let cell = netlist.instance(inst).cell;
    match rng.gen_range(0..4) {
        0 => {
            let to = *lib.swappable_cells(cell).choose(rng)?;
            Some(Move::Downsize { inst, to })
        }
        1 => {
            let inputs: Vec<_> = netlist
                .inst_pins(inst)
                .iter()
                .copied()
                .filter(|p| netlist.pin(*p).is_load())
                .collect();
            let a = *inputs.choose(rng)?;
            let b = *inputs.choose(rng)?;
            (a != b).then_some(Move::PinSwap { inst, a, b })
        }
        2 => {
            let pins = netlist.inst_pins(inst);
            let out = *pins.iter().find(|p| netlist.pin(**p).is_driver())?;
            let net = netlist.pin_net(out)?;
            let loads = netlist.load_pins(net);
            let n = rng.gen_range(1..=loads.len().max(1));
            let picked: Vec<_> = loads
                .choose_multiple(rng, n)
                .copied()
                .filter(|p| matches!(netlist.pin(*p).owner, PinOwner::Instance { .. }))
                .collect();
            let buffer = lib.buffer_cells()[0];
            Some(Move::Rebuffer {
                net,
                buffer,
                loads: picked,
            })
        }
        _ => Some(Move::RemoveBuffer { inst }),
    }
}

fn apply_random_edits(design: &mut Design<Sta>, rng: &mut Pcg64Mcg, count: usize) -> usize {
    let mut applied = 0;
    for _ in 0..count {
        if let Some(mv) = random_move(design, rng) {
            if mv.apply(&mut design.netlist, &design.library).is_ok() {
                applied += 1;
            }
        }
    }
    applied
}

#[test]
fn rollback_restores_random_designs() {
    common::init_logger();
    let mut total_applied = 0;
    for seed in 0..24u64 {
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let mut design = common::random_description(&mut rng, 4, 24).build().unwrap();
        let before = design.describe();
        let wns = design.worst_slack(MinMax::Max);

        design.netlist.begin().unwrap();
        total_applied += apply_random_edits(&mut design, &mut rng, 12);
        design.netlist.rollback().unwrap();
        design.update_timing(true);

        assert_eq!(design.describe(), before, "seed {}", seed);
        assert_eq!(design.worst_slack(MinMax::Max), wns, "seed {}", seed);
    }
    assert!(total_applied > 0, "no random edit ever applied");
}

#[test]
fn saved_transactions_restore_newest_first() {
    let mut rng = Pcg64Mcg::seed_from_u64(7);
    let mut design = common::random_description(&mut rng, 3, 16).build().unwrap();
    let mut snapshots = vec![design.describe()];
    for _ in 0..5 {
        design.netlist.begin().unwrap();
        apply_random_edits(&mut design, &mut rng, 3);
        design.netlist.commit_saved().unwrap();
        snapshots.push(design.describe());
    }
    assert_eq!(design.netlist.saved_count(), 5);
    snapshots.pop();
    while let Some(expected) = snapshots.pop() {
        design.netlist.restore_saved().unwrap();
        assert_eq!(design.describe(), expected);
    }
    assert_eq!(design.netlist.saved_count(), 0);
    assert!(design.netlist.restore_saved().is_err());
}

#[test]
fn commit_forgets_saved_transactions() {
    let mut rng = Pcg64Mcg::seed_from_u64(11);
    let mut design = common::random_description(&mut rng, 3, 8).build().unwrap();
    design.netlist.begin().unwrap();
    apply_random_edits(&mut design, &mut rng, 2);
    design.netlist.commit_saved().unwrap();
    design.netlist.begin().unwrap();
    apply_random_edits(&mut design, &mut rng, 2);
    design.netlist.commit().unwrap();
    assert_eq!(design.netlist.saved_count(), 0);
    assert!(!design.netlist.in_transaction());
}
