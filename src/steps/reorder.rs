//! Pure index arithmetic for moving a page within a gameplan.

/// Move the item at `from` to position `to`.
///
/// Out-of-range or equal indices return an unchanged copy.
pub fn move_item<T: Clone>(items: &[T], from: usize, to: usize) -> Vec<T> {
    let mut next = items.to_vec();
    if from >= next.len() || to >= next.len() || from == to {
        return next;
    }
    let moved = next.remove(from);
    next.insert(to, moved);
    next
}

/// Where the current step lands after the item at `from` moves to `to`.
///
/// The current page keeps its identity: if it is the moved item it follows
/// the move, otherwise it shifts by one when the move crosses it.
pub fn remap_index(current: usize, from: usize, to: usize) -> usize {
    if from == to {
        return current;
    }
    if current == from {
        return to;
    }
    if from < to {
        if current > from && current <= to {
            return current - 1;
        }
        return current;
    }
    if current >= to && current < from {
        return current + 1;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_moved_item_follows() {
        assert_eq!(remap_index(2, 2, 0), 0);
    }

    #[test]
    fn test_remap_forward_move_shifts_down() {
        assert_eq!(remap_index(2, 0, 2), 1);
    }

    #[test]
    fn test_remap_backward_move_shifts_up() {
        assert_eq!(remap_index(1, 3, 0), 2);
    }

    #[test]
    fn test_remap_outside_range_unchanged() {
        assert_eq!(remap_index(4, 0, 2), 4);
        assert_eq!(remap_index(0, 3, 1), 0);
        assert_eq!(remap_index(3, 3, 3), 3);
    }

    #[test]
    fn test_remap_keeps_current_page_identity() {
        let pages = ["a", "b", "c", "d", "e"];
        for from in 0..pages.len() {
            for to in 0..pages.len() {
                for current in 0..pages.len() {
                    let next = move_item(&pages, from, to);
                    let mapped = remap_index(current, from, to);
                    assert_eq!(next[mapped], pages[current], "from={from} to={to}");
                }
            }
        }
    }

    #[test]
    fn test_move_item() {
        assert_eq!(move_item(&[1, 2, 3, 4], 0, 2), vec![2, 3, 1, 4]);
        assert_eq!(move_item(&[1, 2, 3, 4], 3, 0), vec![4, 1, 2, 3]);
        assert_eq!(move_item(&[1, 2, 3], 5, 0), vec![1, 2, 3]);
    }
}
