#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartSearch { genres: Vec<String> },
    CancelSearch,
}
