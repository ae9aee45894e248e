//! Quadratic node split.

use crate::hyperrectangle::Hyperrectangle;
use std::cmp::Ordering;

/// Picks the pair of boxes with the least wasted volume when covered
/// together. Needs at least two boxes.
pub(crate) fn pick_seeds(boxes: &[Hyperrectangle]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, f64)> = None;

    for first in 0..boxes.len() {
        for second in (first + 1)..boxes.len() {
            let a = &boxes[first];
            let b = &boxes[second];
            let waste = a.union(b).volume() - a.volume() - b.volume();

            let better = match best {
                Some((_, _, best_waste)) => waste.total_cmp(&best_waste) == Ordering::Less,
                None => true,
            };
            if better {
                best = Some((first, second, waste));
            }
        }
    }

    best.map(|(first, second, _)| (first, second))
}

/// Distributes `boxes` over two groups, returned as index lists.
///
/// Each group starts with one seed. A group is filled up to
/// `max_node_size / 2` when the remaining items are needed for that;
/// otherwise an item joins the group that grows least, ties go to the
/// smaller group and then to the second group.
pub(crate) fn quadratic_split(boxes: &[Hyperrectangle], max_node_size: usize) -> (Vec<usize>, Vec<usize>) {
    let Some((seed1, seed2)) = pick_seeds(boxes) else {
        return ((0..boxes.len()).collect(), Vec::new());
    };

    let mut first = vec![seed1];
    let mut second = vec![seed2];
    let mut first_box = boxes[seed1].clone();
    let mut second_box = boxes[seed2].clone();

    let remaining: Vec<usize> = (0..boxes.len())
        .filter(|i| *i != seed1 && *i != seed2)
        .collect();
    let min_fill = max_node_size / 2;

    for (position, &item) in remaining.iter().enumerate() {
        let left = remaining.len() - position;

        let to_first = if first.len() + left <= min_fill {
            true
        } else if second.len() + left <= min_fill {
            false
        } else {
            let first_cost = first_box.enlargement(&boxes[item]);
            let second_cost = second_box.enlargement(&boxes[item]);
            match first_cost.total_cmp(&second_cost) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => first.len() < second.len(),
            }
        };

        if to_first {
            first.push(item);
            first_box = first_box.union(&boxes[item]);
        } else {
            second.push(item);
            second_box = second_box.union(&boxes[item]);
        }
    }

    (first, second)
}
