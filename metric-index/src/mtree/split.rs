//! Splitting an overflowing node around two promoted objects.

use super::config::SplitStrategy;
use crate::tree::{IndexError, IndexResult, Node, ObjectId};

/// A routing object chosen for one half of a split, with the covering
/// radius of the entries assigned to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Promoted {
    pub object_id: ObjectId,
    pub covering_radius: f64,
}

/// Outcome of a split: the node keeps the entries of `first`, `sibling`
/// holds those of `second`. Neither node has been written yet.
#[derive(Debug)]
pub(crate) struct Split {
    pub sibling: Node,
    pub first: Promoted,
    pub second: Promoted,
}

/// Splits `node` into itself and a fresh sibling, each holding at least
/// `minimum` entries. Parent distances of all entries are rewritten relative
/// to their new routing object.
pub(crate) fn split_node<F>(
    node: &mut Node,
    strategy: SplitStrategy,
    minimum: usize,
    distance: &F,
) -> IndexResult<Split>
where
    F: Fn(ObjectId, ObjectId) -> IndexResult<f64>,
{
    let n = node.num_entries();
    if n < 2 || 2 * minimum > n {
        return Err(IndexError::InvalidArgument(format!(
            "cannot split {} entries into halves of at least {}",
            n, minimum
        )));
    }
    let ids = node
        .entries()
        .iter()
        .map(|e| e.object_id())
        .collect::<IndexResult<Vec<_>>>()?;

    // The entry closest to the current routing object stays promoted; at the
    // root all parent distances are 0 and the first entry is taken.
    let first = (0..n)
        .min_by(|&a, &b| {
            let pa = node.entries()[a].parent_distance();
            let pb = node.entries()[b].parent_distance();
            pa.total_cmp(&pb)
        })
        .unwrap_or(0);
    let d1 = ids
        .iter()
        .enumerate()
        .map(|(i, &id)| if i == first { Ok(0.0) } else { distance(ids[first], id) })
        .collect::<IndexResult<Vec<_>>>()?;

    let second = (0..n)
        .filter(|&i| i != first)
        .max_by(|&a, &b| d1[a].total_cmp(&d1[b]).then_with(|| b.cmp(&a)))
        .unwrap_or(usize::from(first == 0));
    let d2 = ids
        .iter()
        .enumerate()
        .map(|(i, &id)| if i == second { Ok(0.0) } else { distance(ids[second], id) })
        .collect::<IndexResult<Vec<_>>>()?;

    let to_second = match strategy {
        SplitStrategy::Hyperplane => hyperplane(&d1, &d2, first, second, minimum),
        SplitStrategy::BalancedCut => balanced_cut(&d1, &d2, first, second),
        SplitStrategy::Alternating => alternating(&d1, &d2, first, second),
    };

    let mut first_radius: f64 = 0.0;
    let mut second_radius: f64 = 0.0;
    for (i, &moves) in to_second.iter().enumerate() {
        let Some(entry) = node.entry_mut(i) else {
            continue;
        };
        let d = if moves { d2[i] } else { d1[i] };
        entry.set_parent_distance(d);
        let reach = d + entry.covering_radius();
        if moves {
            second_radius = second_radius.max(reach);
        } else {
            first_radius = first_radius.max(reach);
        }
    }

    let sibling = match strategy {
        SplitStrategy::Hyperplane => node.split_by_mask(&to_second)?,
        SplitStrategy::BalancedCut => {
            let mut sibling = node.empty_sibling();
            let order = cut_order(&d1, &d2, first, second);
            node.split_by_sorted(&mut sibling, &order, n / 2)?;
            sibling
        }
        SplitStrategy::Alternating => {
            let mut sibling = node.empty_sibling();
            let (stay, go): (Vec<usize>, Vec<usize>) = (0..n).partition(|&i| !to_second[i]);
            node.split_to(&mut sibling, &stay, &go)?;
            sibling
        }
    };

    log::debug!(
        "Split {} node {:?}: {} / {} entries around objects {} and {}",
        if node.is_leaf() { "leaf" } else { "directory" },
        node.page_id(),
        node.num_entries(),
        sibling.num_entries(),
        ids[first],
        ids[second]
    );

    Ok(Split {
        sibling,
        first: Promoted {
            object_id: ids[first],
            covering_radius: first_radius,
        },
        second: Promoted {
            object_id: ids[second],
            covering_radius: second_radius,
        },
    })
}

/// Nearer promoted object wins; ties go to the first. The smaller side then
/// takes the entries of the other side that are least out of place.
fn hyperplane(d1: &[f64], d2: &[f64], first: usize, second: usize, minimum: usize) -> Vec<bool> {
    let n = d1.len();
    let mut to_second: Vec<bool> = (0..n).map(|i| d2[i] < d1[i]).collect();
    to_second[first] = false;
    to_second[second] = true;

    let second_count = to_second.iter().filter(|&&m| m).count();
    let first_count = n - second_count;
    if first_count < minimum {
        let mut movable: Vec<usize> = (0..n).filter(|&i| to_second[i] && i != second).collect();
        movable.sort_by(|&a, &b| (d1[a] - d2[a]).total_cmp(&(d1[b] - d2[b])).then(a.cmp(&b)));
        for &i in movable.iter().take(minimum - first_count) {
            to_second[i] = false;
        }
    } else if second_count < minimum {
        let mut movable: Vec<usize> = (0..n).filter(|&i| !to_second[i] && i != first).collect();
        movable.sort_by(|&a, &b| (d2[a] - d1[a]).total_cmp(&(d2[b] - d1[b])).then(a.cmp(&b)));
        for &i in movable.iter().take(minimum - second_count) {
            to_second[i] = true;
        }
    }
    to_second
}

/// Promoted objects first and last, the rest by `d1 - d2`.
fn cut_order(d1: &[f64], d2: &[f64], first: usize, second: usize) -> Vec<usize> {
    let mut rest: Vec<usize> = (0..d1.len()).filter(|&i| i != first && i != second).collect();
    rest.sort_by(|&a, &b| (d1[a] - d2[a]).total_cmp(&(d1[b] - d2[b])).then(a.cmp(&b)));
    let mut order = Vec::with_capacity(d1.len());
    order.push(first);
    order.extend(rest);
    order.push(second);
    order
}

fn balanced_cut(d1: &[f64], d2: &[f64], first: usize, second: usize) -> Vec<bool> {
    let order = cut_order(d1, d2, first, second);
    let cut = order.len() / 2;
    let mut to_second = vec![false; order.len()];
    for &i in &order[cut..] {
        to_second[i] = true;
    }
    to_second
}

fn alternating(d1: &[f64], d2: &[f64], first: usize, second: usize) -> Vec<bool> {
    let n = d1.len();
    let mut by_first: Vec<usize> = (0..n).filter(|&i| i != first && i != second).collect();
    let mut by_second = by_first.clone();
    by_first.sort_by(|&a, &b| d1[a].total_cmp(&d1[b]).then(a.cmp(&b)));
    by_second.sort_by(|&a, &b| d2[a].total_cmp(&d2[b]).then(a.cmp(&b)));

    let mut assigned = vec![false; n];
    let mut to_second = vec![false; n];
    assigned[first] = true;
    assigned[second] = true;
    to_second[second] = true;

    let (mut i, mut j) = (0, 0);
    let mut turn_second = false;
    for _ in 0..n.saturating_sub(2) {
        let (list, cursor) = if turn_second {
            (&by_second, &mut j)
        } else {
            (&by_first, &mut i)
        };
        while assigned[list[*cursor]] {
            *cursor += 1;
        }
        let pick = list[*cursor];
        assigned[pick] = true;
        to_second[pick] = turn_second;
        turn_second = !turn_second;
    }
    to_second
}
