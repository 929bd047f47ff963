//! Designation of ImageNet labels that count as evidence of prepared food.
//!
//! The food gate sums softmax probability mass over this subset. The range
//! covers the ImageNet dish/produce block (guacamole through eggnog) and
//! excludes labels that are visually adjacent to food but not evidence of a
//! prepared dish: 923 "plate" sits below the range, and "hay" and "cup" are
//! carved out of it.

use std::ops::RangeInclusive;

/// ImageNet label ids forming the food block.
pub const FOOD_LABEL_RANGE: RangeInclusive<usize> = 924..=969;

/// Label ids inside [`FOOD_LABEL_RANGE`] that are not food: "hay" and "cup".
pub const NON_FOOD_EXCEPTIONS: [usize; 2] = [958, 968];

/// Whether a label id belongs to the designated food subset.
pub fn is_food_label(label_id: usize) -> bool {
    FOOD_LABEL_RANGE.contains(&label_id) && !NON_FOOD_EXCEPTIONS.contains(&label_id)
}
