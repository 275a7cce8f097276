/// Output classes of the square classifier. The order matches the model's
/// output layer and is part of the HTTP contract.
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "black_bishop",
    "black_king",
    "black_knight",
    "black_pawn",
    "black_queen",
    "black_rook",
    "empty",
    "half_empty_square",
    "white_bishop",
    "white_king",
    "white_knight",
    "white_pawn",
    "white_queen",
    "white_rook",
];

pub const NUM_CLASSES: usize = 14;

pub fn class_name(index: usize) -> Option<&'static str> {
    CLASS_NAMES.get(index).copied()
}
