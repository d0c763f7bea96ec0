//! Stable, first-occurrence deduplication

/// Remove repeated values, keeping the first occurrence of each in order
///
/// Unlike sort + dedup, the relative order of survivors is untouched, and
/// repeats are dropped whether or not they are adjacent. Works for types
/// that are only `PartialEq` (angles are `f64`).
///
/// ```
/// use deliverydata::maintain_order_unique;
///
/// assert_eq!(maintain_order_unique(&[90.0, 90.0, 0.0, 90.0, 270.0]), vec![90.0, 0.0, 270.0]);
/// ```
#[must_use]
pub fn maintain_order_unique<T: PartialEq + Clone>(values: &[T]) -> Vec<T> {
    let mut unique: Vec<T> = Vec::with_capacity(values.len());
    for value in values {
        if !unique.contains(value) {
            unique.push(value.clone());
        }
    }
    unique
}
