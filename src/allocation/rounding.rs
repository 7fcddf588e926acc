//! Snap fractional solver output to whole minor units without breaking conservation.

use super::Flow;
use crate::model::Amount;

/// Fractional transfer as returned by a solver.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawFlow {
    pub vault: usize,
    pub atm: usize,
    pub amount: f64,
}

/// Round each flow to the nearest minor unit, then repair.
///
/// Overshoot against a vault balance or an ATM need is taken back from the largest edge
/// first. The per-ATM residue between the rounded edges and the rounded solver total is
/// then absorbed by that ATM's largest edge that still has vault cash behind it.
pub(crate) fn round_flows(raw: &[RawFlow], supply: &[Amount], need: &[Amount]) -> Vec<Flow> {
    let mut flows: Vec<Flow> = raw
        .iter()
        .map(|flow| Flow {
            vault: flow.vault,
            atm: flow.atm,
            amount: flow.amount.round().max(0.0) as Amount,
        })
        .collect();

    // Largest first, deterministic among equals.
    let mut by_size: Vec<usize> = (0..flows.len()).collect();
    by_size.sort_by(|&a, &b| {
        flows[b]
            .amount
            .cmp(&flows[a].amount)
            .then_with(|| flows[a].vault.cmp(&flows[b].vault))
            .then_with(|| flows[a].atm.cmp(&flows[b].atm))
    });

    let mut vault_used = vec![0; supply.len()];
    let mut atm_got = vec![0; need.len()];
    for flow in &flows {
        vault_used[flow.vault] += flow.amount;
        atm_got[flow.atm] += flow.amount;
    }

    for &i in &by_size {
        let Flow { vault, atm, amount } = flows[i];
        let excess = (vault_used[vault] - supply[vault])
            .max(atm_got[atm] - need[atm])
            .max(0)
            .min(amount);
        if excess > 0 {
            flows[i].amount -= excess;
            vault_used[vault] -= excess;
            atm_got[atm] -= excess;
        }
    }

    let mut raw_totals = vec![0.0; need.len()];
    for flow in raw {
        raw_totals[flow.atm] += flow.amount.max(0.0);
    }
    for (atm, raw_total) in raw_totals.iter().enumerate() {
        let target = (raw_total.round() as Amount).min(need[atm]);
        let mut residue = target - atm_got[atm];
        for &i in &by_size {
            if residue <= 0 {
                break;
            }
            if flows[i].atm != atm {
                continue;
            }
            let vault = flows[i].vault;
            let add = residue.min(supply[vault] - vault_used[vault]);
            if add > 0 {
                flows[i].amount += add;
                vault_used[vault] += add;
                atm_got[atm] += add;
                residue -= add;
            }
        }
    }

    flows.retain(|flow| flow.amount > 0);
    flows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(vault: usize, atm: usize, amount: f64) -> RawFlow {
        RawFlow { vault, atm, amount }
    }

    #[test]
    fn test_near_integers_snap() {
        let flows = round_flows(&[raw(0, 0, 39_999.999_999), raw(1, 0, 40_000.000_001)], &[50_000, 50_000], &[80_000]);
        let total: Amount = flows.iter().map(|f| f.amount).sum();
        assert_eq!(total, 80_000);
        assert!(flows.iter().all(|f| f.amount == 40_000));
    }

    #[test]
    fn test_half_units_keep_atm_total() {
        // Two halves round up to 2 units but the ATM only needs 1.
        let flows = round_flows(&[raw(0, 0, 0.5), raw(1, 0, 0.5)], &[10, 10], &[1]);
        let total: Amount = flows.iter().map(|f| f.amount).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_residue_goes_to_largest_edge() {
        let flows = round_flows(&[raw(0, 0, 10.4), raw(1, 0, 20.4)], &[100, 100], &[100]);
        assert_eq!(
            flows,
            vec![Flow { vault: 0, atm: 0, amount: 10 }, Flow { vault: 1, atm: 0, amount: 21 }]
        );
    }

    #[test]
    fn test_never_exceeds_vault_balance() {
        let flows = round_flows(&[raw(0, 0, 5.6), raw(0, 1, 5.6)], &[11], &[10, 10]);
        let out: Amount = flows.iter().map(|f| f.amount).sum();
        assert!(out <= 11);
    }
}
