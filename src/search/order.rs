//! Post-query ordering and pagination / 结果排序与分页

use super::schema::Order;

/// Natural, case-insensitive title order; stable so SQL tie-breaks survive / 自然排序
pub fn sort_titles_naturally(rows: &mut [(i64, String)], order: Order) {
    rows.sort_by(|(_, a), (_, b)| {
        let ordering = natord::compare_ignore_case(a, b);
        match order {
            Order::Asc => ordering,
            Order::Desc => ordering.reverse(),
        }
    });
}

/// Deterministic sin-based sequence, same seed gives the same permutation / 种子随机序列
struct SeededSequence {
    state: f64,
}

impl SeededSequence {
    fn new(seed: &str) -> Self {
        // sum of UTF-16 code units
        let state = seed.encode_utf16().map(f64::from).sum();
        Self { state }
    }

    fn next(&mut self) -> f64 {
        let x = self.state.sin() * 10000.0;
        self.state += 1.0;
        x - x.floor()
    }
}

/// Fisher-Yates shuffle driven by the seeded sequence / 按种子洗牌
pub fn seeded_shuffle<T>(items: &mut [T], seed: &str) {
    let mut sequence = SeededSequence::new(seed);
    let mut current = items.len();
    while current != 0 {
        let picked = ((sequence.next() * current as f64).floor() as usize).min(current - 1);
        current -= 1;
        items.swap(current, picked);
    }
}

/// One page of an ordered id list; `limit == 0` returns everything / 分页
pub fn paginate(ids: &[i64], page: usize, limit: usize) -> Vec<i64> {
    if limit == 0 {
        return ids.to_vec();
    }
    let start = page.max(1).saturating_sub(1).saturating_mul(limit);
    ids.iter().skip(start).take(limit).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titled(titles: &[&str]) -> Vec<(i64, String)> {
        titles
            .iter()
            .enumerate()
            .map(|(i, t)| (i as i64 + 1, t.to_string()))
            .collect()
    }

    fn titles(rows: &[(i64, String)]) -> Vec<&str> {
        rows.iter().map(|(_, t)| t.as_str()).collect()
    }

    #[test]
    fn test_natural_title_order() {
        let mut rows = titled(&["Vol 10", "vol 2", "Vol 1"]);
        sort_titles_naturally(&mut rows, Order::Asc);
        assert_eq!(titles(&rows), vec!["Vol 1", "vol 2", "Vol 10"]);

        sort_titles_naturally(&mut rows, Order::Desc);
        assert_eq!(titles(&rows), vec!["Vol 10", "vol 2", "Vol 1"]);
    }

    #[test]
    fn test_equal_titles_keep_incoming_order() {
        let mut rows = titled(&["same", "Same", "SAME"]);
        sort_titles_naturally(&mut rows, Order::Desc);
        let ids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_seeded_shuffle_is_deterministic_permutation() {
        let original: Vec<i64> = (1..=20).collect();

        let mut a = original.clone();
        let mut b = original.clone();
        seeded_shuffle(&mut a, "abc");
        seeded_shuffle(&mut b, "abc");
        assert_eq!(a, b);
        assert_ne!(a, original);

        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, original);

        let mut c = original.clone();
        seeded_shuffle(&mut c, "xyz");
        assert_ne!(a, c);
    }

    #[test]
    fn test_shuffle_handles_tiny_inputs() {
        let mut empty: Vec<i64> = vec![];
        seeded_shuffle(&mut empty, "seed");
        assert!(empty.is_empty());

        let mut one = vec![7];
        seeded_shuffle(&mut one, "seed");
        assert_eq!(one, vec![7]);
    }

    #[test]
    fn test_paginate() {
        let ids: Vec<i64> = (1..=5).collect();
        assert_eq!(paginate(&ids, 1, 2), vec![1, 2]);
        assert_eq!(paginate(&ids, 3, 2), vec![5]);
        assert_eq!(paginate(&ids, 4, 2), Vec::<i64>::new());
        assert_eq!(paginate(&ids, 0, 2), vec![1, 2]);
        assert_eq!(paginate(&ids, 9, 0), ids);
    }
}
