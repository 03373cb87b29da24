//! Padding-based collation utilities.

/// Pad every row to the length of the longest one, filling with `pad`.
pub fn pad_to_longest<T: Copy>(rows: &[Vec<T>], pad: T) -> Vec<Vec<T>> {
    let max_len = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    rows.iter()
        .map(|row| {
            let mut padded = vec![pad; max_len];
            padded[..row.len()].copy_from_slice(row);
            padded
        })
        .collect()
}
