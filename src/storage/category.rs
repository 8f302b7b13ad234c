use std::fmt;

use serde::{Deserialize, Serialize};

/// Node table a concrete node lives in, and by extension the table of its arnode.
///
/// A cemented category combines the sign of the node's outgoing weights with
/// its monotonicity: whether raising the node's value raises (`Increasing`)
/// or lowers (`Decreasing`) the network output.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Positive outgoing weights, increasing.
    PositiveIncreasing,
    /// Positive outgoing weights, decreasing.
    PositiveDecreasing,
    /// Negative outgoing weights, increasing.
    NegativeIncreasing,
    /// Negative outgoing weights, decreasing.
    NegativeDecreasing,
    /// Not classified yet; the only table whose nodes may move.
    Unprocessed,
}

/// Number of concrete-node tables in a layer.
pub const NODE_TABLES: usize = 5;
/// Number of arnode tables in a layer.
pub const ARNODE_TABLES: usize = 4;

impl Category {
    /// The four classified categories in table order.
    pub const CEMENTED: [Category; ARNODE_TABLES] = [
        Category::PositiveIncreasing,
        Category::PositiveDecreasing,
        Category::NegativeIncreasing,
        Category::NegativeDecreasing,
    ];

    /// Table index of this category.
    pub const fn index(self) -> usize {
        match self {
            Category::PositiveIncreasing => 0,
            Category::PositiveDecreasing => 1,
            Category::NegativeIncreasing => 2,
            Category::NegativeDecreasing => 3,
            Category::Unprocessed => 4,
        }
    }

    /// Inverse of [`Category::index`].
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Category::PositiveIncreasing),
            1 => Some(Category::PositiveDecreasing),
            2 => Some(Category::NegativeIncreasing),
            3 => Some(Category::NegativeDecreasing),
            4 => Some(Category::Unprocessed),
            _ => None,
        }
    }

    /// Whether nodes of this category have a fixed location.
    pub fn is_cemented(self) -> bool {
        self != Category::Unprocessed
    }

    /// Monotonicity of the category, `None` while unprocessed.
    pub fn is_increasing(self) -> Option<bool> {
        match self {
            Category::PositiveIncreasing | Category::NegativeIncreasing => Some(true),
            Category::PositiveDecreasing | Category::NegativeDecreasing => Some(false),
            Category::Unprocessed => None,
        }
    }

    /// Category of a node whose outgoing edge of `weight` enters a node of
    /// category `dst`. Zero weights count as positive.
    ///
    /// Returns `None` when `dst` is still unprocessed.
    pub fn classify(weight: f64, dst: Category) -> Option<Category> {
        let dst_increasing = dst.is_increasing()?;
        let positive = weight >= 0.0;
        let increasing = positive == dst_increasing;
        Some(match (positive, increasing) {
            (true, true) => Category::PositiveIncreasing,
            (true, false) => Category::PositiveDecreasing,
            (false, true) => Category::NegativeIncreasing,
            (false, false) => Category::NegativeDecreasing,
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::PositiveIncreasing => "pos_inc",
            Category::PositiveDecreasing => "pos_dec",
            Category::NegativeIncreasing => "neg_inc",
            Category::NegativeDecreasing => "neg_dec",
            Category::Unprocessed => "unprocessed",
        };
        f.write_str(name)
    }
}
