pub mod matching;
pub mod proposals;
