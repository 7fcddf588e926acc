//! Capacity packing of one vault's deliveries into its available vehicles.

use std::collections::BTreeMap;

use crate::model::{Amount, Snapshot};

/// Cash to drop at one ATM (snapshot index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Delivery {
    pub atm: usize,
    pub amount: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Packing {
    /// Per vehicle of the fleet, in fleet order; one merged delivery per ATM.
    pub loads: Vec<Vec<Delivery>>,
    /// Per ATM, amounts no vehicle could take.
    pub deferred: Vec<Delivery>,
}

/// Pack deliveries largest first into the vehicle with the most remaining capacity.
///
/// `fleet` holds snapshot vehicle indices, already in tie-break order. A delivery that
/// fits the largest vehicle travels whole or is deferred whole. A larger one is cut to
/// the room left in each vehicle, roomiest first, and only the part no vehicle can take
/// is deferred.
pub(crate) fn pack(snapshot: &Snapshot, fleet: &[usize], deliveries: &[Delivery]) -> Packing {
    let largest = fleet
        .iter()
        .map(|&vehicle| snapshot.vehicles[vehicle].capacity)
        .max()
        .unwrap_or(0);

    let mut ordered = deliveries.to_vec();
    ordered.sort_by(|a, b| {
        b.amount
            .cmp(&a.amount)
            .then_with(|| snapshot.atms[a.atm].id.cmp(&snapshot.atms[b.atm].id))
    });

    let mut room: Vec<Amount> = fleet
        .iter()
        .map(|&vehicle| snapshot.vehicles[vehicle].capacity)
        .collect();
    let mut loads: Vec<BTreeMap<usize, Amount>> = vec![BTreeMap::new(); fleet.len()];
    let mut deferred: BTreeMap<usize, Amount> = BTreeMap::new();

    for delivery in ordered {
        if delivery.amount > largest {
            let left = spread(&mut room, &mut loads, delivery);
            if left > 0 {
                *deferred.entry(delivery.atm).or_insert(0) += left;
            }
            continue;
        }
        match roomiest(&room) {
            Some(slot) if room[slot] >= delivery.amount => {
                room[slot] -= delivery.amount;
                *loads[slot].entry(delivery.atm).or_insert(0) += delivery.amount;
            }
            _ => *deferred.entry(delivery.atm).or_insert(0) += delivery.amount,
        }
    }

    Packing {
        loads: loads.into_iter().map(into_deliveries).collect(),
        deferred: into_deliveries(deferred),
    }
}

/// Fill vehicles roomiest first with parts of one delivery; returns what is left over.
fn spread(room: &mut [Amount], loads: &mut [BTreeMap<usize, Amount>], delivery: Delivery) -> Amount {
    let mut left = delivery.amount;
    while left > 0 {
        let Some(slot) = roomiest(room).filter(|&slot| room[slot] > 0) else {
            break;
        };
        let part = left.min(room[slot]);
        room[slot] -= part;
        left -= part;
        *loads[slot].entry(delivery.atm).or_insert(0) += part;
    }
    left
}

/// Slot with the most room left; the earliest one among equals.
fn roomiest(room: &[Amount]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (slot, &left) in room.iter().enumerate() {
        if best.is_none_or(|current| left > room[current]) {
            best = Some(slot);
        }
    }
    best
}

fn into_deliveries(by_atm: BTreeMap<usize, Amount>) -> Vec<Delivery> {
    by_atm
        .into_iter()
        .map(|(atm, amount)| Delivery { atm, amount })
        .collect()
}
